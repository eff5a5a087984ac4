//! Token budgets and chunk planning.
//!
//! The budget answers one question: with this query and this answer
//! reserve, how many context tokens fit in the model window? The
//! planner then carves an oversized context into contiguous chunks of
//! exactly that size, so each chunk plus the query forms a prompt the
//! model will accept.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::llm::tokenizer::{TextTokenizer, TokenId, TokenSequence};

/// Tokens held back for the special-token wrapper the model adds
/// around a prompt.
pub const PROMPT_OVERHEAD: usize = 2;

#[derive(Debug, Error)]
pub enum BudgetError {
    #[error(
        "token budget exceeded: query ({query_tokens}) and reserve ({generation_reserve}) \
         leave no context room in a {model_limit}-token window"
    )]
    Exceeded {
        query_tokens: usize,
        generation_reserve: usize,
        model_limit: usize,
    },

    #[error("generation reserve {generation_reserve} does not fit a {model_limit}-token window")]
    InvalidReserve {
        generation_reserve: usize,
        model_limit: usize,
    },

    #[error("tokenizer mismatch: sequence uses '{got}', planner uses '{expected}'")]
    TokenizerMismatch { expected: String, got: String },
}

/// Budget split of a model window.
#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    pub model_limit: usize,
    pub generation_reserve: usize,
    pub overhead: usize,
}

impl TokenBudget {
    pub fn new(model_limit: usize, generation_reserve: usize) -> Self {
        Self {
            model_limit,
            generation_reserve,
            overhead: PROMPT_OVERHEAD,
        }
    }

    /// Context tokens available once the query, the answer reserve and
    /// the wrapper overhead are held back. Zero available room is an
    /// error: such a prompt could carry no source material at all.
    pub fn available_for_context(&self, query_tokens: usize) -> Result<usize, BudgetError> {
        if self.generation_reserve + self.overhead >= self.model_limit {
            return Err(BudgetError::InvalidReserve {
                generation_reserve: self.generation_reserve,
                model_limit: self.model_limit,
            });
        }
        let used = query_tokens + self.generation_reserve + self.overhead;
        if used >= self.model_limit {
            return Err(BudgetError::Exceeded {
                query_tokens,
                generation_reserve: self.generation_reserve,
                model_limit: self.model_limit,
            });
        }
        Ok(self.model_limit - used)
    }
}

/// One contiguous piece of the source token sequence, with its decoded
/// text. `start..end` indexes the original sequence.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub ids: Vec<TokenId>,
    pub text: String,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Output of [`ChunkPlanner::plan`].
#[derive(Debug)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    /// Context tokens available per chunk.
    pub window: usize,
    pub query_tokens: usize,
    pub context_tokens: usize,
}

/// Splits token sequences into budget-sized chunks.
pub struct ChunkPlanner {
    tokenizer: Arc<dyn TextTokenizer>,
    budget: TokenBudget,
}

impl ChunkPlanner {
    pub fn new(tokenizer: Arc<dyn TextTokenizer>, budget: TokenBudget) -> Self {
        Self { tokenizer, budget }
    }

    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    /// Plan chunks for a tokenized context and query.
    ///
    /// Chunks are returned in source order and cover the whole context
    /// without gaps or overlaps. An empty context yields a single empty
    /// chunk so that downstream code still produces an answer for it.
    pub fn plan(
        &self,
        context: &TokenSequence,
        query: &TokenSequence,
    ) -> Result<ChunkPlan, BudgetError> {
        self.check_encoding(context)?;
        self.check_encoding(query)?;

        let window = self.budget.available_for_context(query.len())?;

        if context.is_empty() {
            return Ok(ChunkPlan {
                chunks: vec![Chunk {
                    index: 0,
                    start: 0,
                    end: 0,
                    ids: Vec::new(),
                    text: String::new(),
                }],
                window,
                query_tokens: query.len(),
                context_tokens: 0,
            });
        }

        let ids = context.ids();
        let mut chunks = Vec::with_capacity(ids.len().div_ceil(window));
        let mut cursor = 0;
        while cursor < ids.len() {
            let (end, text) = self.carve_chunk(ids, cursor, window);
            chunks.push(Chunk {
                index: chunks.len(),
                start: cursor,
                end,
                ids: ids[cursor..end].to_vec(),
                text,
            });
            cursor = end;
        }

        debug!(
            context_tokens = context.len(),
            query_tokens = query.len(),
            window,
            chunks = chunks.len(),
            "planned context chunks"
        );

        Ok(ChunkPlan {
            chunks,
            window,
            query_tokens: query.len(),
            context_tokens: context.len(),
        })
    }

    /// Encode raw text and plan it.
    pub fn plan_text(&self, context: &str, query: &str) -> Result<ChunkPlan, BudgetError> {
        let context = TokenSequence::from_text(self.tokenizer.as_ref(), context);
        let query = TokenSequence::from_text(self.tokenizer.as_ref(), query);
        self.plan(&context, &query)
    }

    fn check_encoding(&self, sequence: &TokenSequence) -> Result<(), BudgetError> {
        if sequence.encoding() != self.tokenizer.name() {
            return Err(BudgetError::TokenizerMismatch {
                expected: self.tokenizer.name().to_string(),
                got: sequence.encoding().to_string(),
            });
        }
        Ok(())
    }

    /// Carve one chunk starting at `start`, returning its end index and
    /// decoded text.
    ///
    /// Two boundary adjustments happen here. The end is nudged forward
    /// when it would split a multi-byte character across chunks, and
    /// the chunk is re-trimmed when its decoded text re-encodes over
    /// the window (BPE merges are not stable across slice boundaries);
    /// one token of slack is tolerated.
    fn carve_chunk(&self, ids: &[TokenId], start: usize, window: usize) -> (usize, String) {
        let total = ids.len();
        let mut end = (start + window).min(total);

        // A UTF-8 sequence is at most four bytes, so a few extra tokens
        // always complete a split character.
        let mut forward_probes = 0;
        let mut text = loop {
            match self.tokenizer.decode(&ids[start..end]) {
                Ok(text) => break text,
                Err(_) if end < total && forward_probes < 4 => {
                    end += 1;
                    forward_probes += 1;
                }
                Err(_) if end - start > 1 => end -= 1,
                Err(_) => return (end, String::new()),
            }
        };

        loop {
            let reencoded = self.tokenizer.count(&text);
            if reencoded <= window + 1 || end - start <= 1 {
                return (end, text);
            }
            let over = reencoded - window;
            end = start + (end - start - over.min(end - start - 1));
            text = match self.tokenizer.decode(&ids[start..end]) {
                Ok(text) => text,
                Err(_) => {
                    if end - start <= 1 {
                        return (end, String::new());
                    }
                    end -= 1;
                    match self.tokenizer.decode(&ids[start..end]) {
                        Ok(text) => text,
                        Err(_) => return (end, String::new()),
                    }
                }
            };
        }
    }
}

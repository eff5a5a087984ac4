//! Tokenizer seam over tiktoken

use std::sync::Arc;

use thiserror::Error;
use tiktoken_rs::{cl100k_base, p50k_base, r50k_base, CoreBPE};

/// Token id as produced by the underlying BPE vocabulary.
pub type TokenId = usize;

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("failed to initialize tokenizer: {0}")]
    Initialization(String),

    #[error("unknown encoding '{0}'")]
    UnknownEncoding(String),

    #[error("failed to decode token ids: {0}")]
    Decode(String),
}

/// Exact tokenization for a concrete model vocabulary.
///
/// Budget arithmetic in the engine is only meaningful when counting,
/// slicing and prompt assembly all go through the same vocabulary, so
/// every token sequence carries the `name()` of the tokenizer that
/// produced it.
pub trait TextTokenizer: Send + Sync {
    /// Encoding name, e.g. "r50k_base".
    fn name(&self) -> &str;

    /// Encode text into token ids. Ordinary encoding, no special-token
    /// wrappers; the empty string encodes to zero tokens.
    fn encode(&self, text: &str) -> Vec<TokenId>;

    /// Decode a token id slice back into text.
    fn decode(&self, ids: &[TokenId]) -> Result<String, TokenizerError>;

    /// Count the tokens in `text`.
    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// Tiktoken-backed tokenizer for one of the bundled BPE encodings.
#[derive(Debug, Clone)]
pub struct TiktokenTokenizer {
    name: String,
    bpe: Arc<CoreBPE>,
}

impl TiktokenTokenizer {
    /// Create a tokenizer for a named encoding. Supported encodings are
    /// "cl100k_base", "p50k_base" and "r50k_base".
    pub fn from_encoding(name: &str) -> Result<Self, TokenizerError> {
        let bpe = match name {
            "cl100k_base" => cl100k_base(),
            "p50k_base" => p50k_base(),
            "r50k_base" => r50k_base(),
            other => return Err(TokenizerError::UnknownEncoding(other.to_string())),
        }
        .map_err(|e| TokenizerError::Initialization(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            bpe: Arc::new(bpe),
        })
    }
}

impl TextTokenizer for TiktokenTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, text: &str) -> Vec<TokenId> {
        self.bpe.encode_ordinary(text)
    }

    fn decode(&self, ids: &[TokenId]) -> Result<String, TokenizerError> {
        self.bpe
            .decode(ids.to_vec())
            .map_err(|e| TokenizerError::Decode(e.to_string()))
    }
}

/// A token id sequence tagged with the encoding that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSequence {
    ids: Vec<TokenId>,
    encoding: String,
}

impl TokenSequence {
    pub fn new(ids: Vec<TokenId>, encoding: impl Into<String>) -> Self {
        Self {
            ids,
            encoding: encoding.into(),
        }
    }

    /// Encode `text` with `tokenizer`, tagging the result.
    pub fn from_text(tokenizer: &dyn TextTokenizer, text: &str) -> Self {
        Self::new(tokenizer.encode(text), tokenizer.name())
    }

    pub fn ids(&self) -> &[TokenId] {
        &self.ids
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let tokenizer = TiktokenTokenizer::from_encoding("r50k_base").unwrap();
        let text = "The mitochondria is the powerhouse of the cell.";
        let ids = tokenizer.encode(text);
        assert!(!ids.is_empty());
        let decoded = tokenizer.decode(&ids).unwrap();
        assert_eq!(decoded, text);
    }

    #[test]
    fn empty_string_counts_zero() {
        let tokenizer = TiktokenTokenizer::from_encoding("cl100k_base").unwrap();
        assert_eq!(tokenizer.count(""), 0);
    }

    #[test]
    fn counting_is_deterministic() {
        let tokenizer = TiktokenTokenizer::from_encoding("p50k_base").unwrap();
        let text = "Photosynthesis converts light energy into chemical energy.";
        assert_eq!(tokenizer.count(text), tokenizer.count(text));
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let err = TiktokenTokenizer::from_encoding("o9000_base").unwrap_err();
        assert!(matches!(err, TokenizerError::UnknownEncoding(_)));
    }

    #[test]
    fn sequence_carries_encoding_tag() {
        let tokenizer = TiktokenTokenizer::from_encoding("r50k_base").unwrap();
        let seq = TokenSequence::from_text(&tokenizer, "flash cards");
        assert_eq!(seq.encoding(), "r50k_base");
        assert_eq!(seq.len(), tokenizer.count("flash cards"));
    }
}

//! Plain-text to PDF rendering via lopdf.
//!
//! Generated answers and summaries ship as simple A4 documents: one
//! built-in Helvetica font, word-wrapped lines, page breaks on
//! overflow. Text is narrowed to WinAnsi; anything outside the
//! encoding is replaced rather than rejected.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use tracing::debug;

use crate::render::RenderError;

/// Layout settings for rendered documents.
pub struct PdfWriter {
    font_size: i64,
    leading: i64,
    margin: i64,
    page_width: i64,
    page_height: i64,
    /// Wrap width in characters.
    wrap_columns: usize,
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self {
            font_size: 12,
            leading: 14,
            margin: 50,
            page_width: 595,  // A4 portrait in points
            page_height: 842,
            wrap_columns: 90,
        }
    }
}

impl PdfWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lines_per_page(&self) -> usize {
        (((self.page_height - 2 * self.margin) / self.leading).max(1)) as usize
    }

    /// Render `text` into a complete PDF document.
    pub fn write_pdf(&self, text: &str) -> Result<Vec<u8>, RenderError> {
        let lines = self.layout(text);

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for page_lines in lines.chunks(self.lines_per_page()) {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), self.font_size.into()]),
                Operation::new("TL", vec![self.leading.into()]),
                Operation::new(
                    "Td",
                    vec![
                        self.margin.into(),
                        (self.page_height - self.margin - self.leading).into(),
                    ],
                ),
            ];
            for (i, line) in page_lines.iter().enumerate() {
                if i > 0 {
                    operations.push(Operation::new("T*", vec![]));
                }
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::String(
                        winansi_bytes(line),
                        StringFormat::Literal,
                    )],
                ));
            }
            operations.push(Operation::new("ET", vec![]));

            let content = Content { operations };
            let encoded = content
                .encode()
                .map_err(|e| RenderError::Pdf(e.to_string()))?;
            let stream_id = doc.add_object(Stream::new(dictionary! {}, encoded));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => stream_id,
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    self.page_width.into(),
                    self.page_height.into(),
                ],
                "Resources" => resources_id,
            });
            kids.push(page_id.into());
        }

        let page_count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;

        debug!(pages = page_count, bytes = out.len(), "rendered PDF");
        Ok(out)
    }

    /// Sanitize and word-wrap the input into printable lines. Always
    /// yields at least one line so even empty input renders a page.
    fn layout(&self, text: &str) -> Vec<String> {
        let mut lines: Vec<String> = Vec::new();
        for raw_line in text.lines() {
            let clean = sanitize(raw_line);
            if clean.trim().is_empty() {
                lines.push(String::new());
                continue;
            }
            lines.extend(wrap_line(&clean, self.wrap_columns));
        }
        if lines.is_empty() {
            lines.push(String::new());
        }
        lines
    }
}

/// Replace tabs and drop control characters; anything beyond Latin-1
/// becomes '?'.
fn sanitize(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '\t' => out.push_str("    "),
            c if c.is_control() => {}
            c if (c as u32) <= 0xFF => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

/// Word wrap at `columns` characters, hard-splitting words longer than
/// a full line.
fn wrap_line(line: &str, columns: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in line.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > columns {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if word_len > columns {
            // The overflow check above already flushed any pending text.
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(columns) {
                current = piece.iter().collect();
                current_len = current.chars().count();
                if current_len == columns {
                    out.push(std::mem::take(&mut current));
                    current_len = 0;
                }
            }
            continue;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        out.push(current);
    }
    if out.is_empty() {
        out.push(String::new());
    }
    out
}

/// Encode to WinAnsi (Latin-1) bytes, replacing anything unmappable.
fn winansi_bytes(line: &str) -> Vec<u8> {
    line.chars()
        .map(|c| {
            let code = c as u32;
            if code <= 0xFF {
                code as u8
            } else {
                b'?'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::PdfTextExtractor;
    use lopdf::Document;

    #[test]
    fn renders_a_readable_document() {
        let writer = PdfWriter::default();
        let bytes = writer
            .write_pdf("Photosynthesis converts light into chemical energy.")
            .unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let text = PdfTextExtractor.extract_bytes(&bytes).unwrap();
        assert!(text.contains("Photosynthesis"));
    }

    #[test]
    fn long_text_spans_multiple_pages() {
        let writer = PdfWriter::default();
        let text = "A line of study notes.\n".repeat(200);
        let bytes = writer.write_pdf(&text).unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 1);
    }

    #[test]
    fn empty_text_still_renders_one_page() {
        let writer = PdfWriter::default();
        let bytes = writer.write_pdf("").unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn wraps_and_splits_long_words() {
        let wrapped = wrap_line("short words only here", 10);
        assert_eq!(wrapped, vec!["short", "words only", "here"]);

        let split = wrap_line(&"x".repeat(25), 10);
        assert_eq!(split, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);

        let after_pending = wrap_line(&format!("hey {}", "x".repeat(25)), 10);
        assert_eq!(
            after_pending,
            vec!["hey".to_string(), "x".repeat(10), "x".repeat(10), "x".repeat(5)]
        );

        let tail_merges = wrap_line(&format!("{} tail", "x".repeat(12)), 10);
        assert_eq!(tail_merges, vec!["x".repeat(10), "xx tail".to_string()]);
    }

    #[test]
    fn sanitize_replaces_unencodable_characters() {
        assert_eq!(sanitize("caf\u{e9} \u{1F600} ok"), "caf\u{e9} ? ok");
        assert_eq!(sanitize("tab\there"), "tab    here");
        assert_eq!(winansi_bytes("\u{e9}"), vec![0xE9]);
        assert_eq!(winansi_bytes("\u{1F600}"), vec![b'?']);
    }
}

//! Recursive, boundary-aware text splitting.
//!
//! Text is cut at the coarsest boundary that yields pieces no longer than the
//! chunk size: paragraphs, then lines, then sentences, then words. Only when
//! none of those fit does the splitter fall back to single characters, which
//! amounts to a hard cut at the size limit. Sizes are measured in characters.

use std::collections::VecDeque;

use crate::core::errors::ApiError;

const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ApiError> {
        if chunk_size == 0 {
            return Err(ApiError::BadRequest("chunk size must be positive".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(ApiError::BadRequest(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Splits `text` into trimmed, non-empty chunks paired with their byte
    /// offset in `text`.
    pub fn split_with_offsets(&self, text: &str) -> Vec<(usize, String)> {
        let mut cursor = 0;
        let mut out = Vec::new();

        for chunk in self.split(text) {
            let start = text[cursor..]
                .find(&chunk)
                .map(|pos| cursor + pos)
                .unwrap_or(cursor);
            // Overlapping chunks may start before the end of the previous one.
            cursor = next_char_boundary(text, start);
            out.push((start, chunk));
        }

        out
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(idx, ch)| &text[idx..idx + ch.len_utf8()])
                .collect()
        } else {
            text.split_inclusive(separator).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            chunks.extend(self.split_recursive(piece, finer));
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }

        chunks
    }

    /// Greedily packs consecutive pieces into chunks of at most `chunk_size`
    /// characters, carrying up to `chunk_overlap` characters of trailing
    /// pieces into the next chunk.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                push_chunk(&mut chunks, &window);

                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some(first) => total -= char_len(first),
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += len;
        }

        push_chunk(&mut chunks, &window);
        chunks
    }
}

fn push_chunk(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn next_char_boundary(text: &str, from: usize) -> usize {
    let mut idx = from + 1;
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx.min(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(word: &str, chars: usize) -> String {
        let mut text = String::new();
        while text.len() + word.len() + 1 <= chars {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(word);
        }
        while text.len() < chars {
            text.push('x');
        }
        text
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(TextSplitter::new(100, 100).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
    }

    #[test]
    fn paragraphs_are_kept_whole_when_they_fit() {
        let text = format!(
            "{}\n\n{}\n\n{}",
            paragraph("alpha", 198),
            paragraph("beta", 198),
            paragraph("gamma", 100)
        );
        assert_eq!(text.chars().count(), 500);

        let chunks = TextSplitter::new(200, 0).unwrap().split(&text);

        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].starts_with("alpha"));
        assert!(chunks[1].starts_with("beta"));
        assert!(chunks[2].starts_with("gamma"));
        assert!(chunks.iter().all(|c| c.chars().count() <= 200));
    }

    #[test]
    fn falls_back_to_words_then_hard_cuts() {
        let words = "lorem ipsum dolor sit amet ".repeat(10);
        let chunks = TextSplitter::new(30, 0).unwrap().split(&words);
        assert!(chunks.iter().all(|c| c.chars().count() <= 30));
        assert!(chunks.iter().all(|c| !c.starts_with(' ') && !c.ends_with(' ')));

        let unbroken = "z".repeat(95);
        let chunks = TextSplitter::new(40, 0).unwrap().split(&unbroken);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![40, 40, 15]);
    }

    #[test]
    fn sentences_keep_their_full_stop() {
        let text = "First sentence here. Second sentence here. Third one.";
        let chunks = TextSplitter::new(25, 0).unwrap().split(text);
        assert_eq!(
            chunks,
            vec!["First sentence here.", "Second sentence here.", "Third one."]
        );
    }

    #[test]
    fn overlap_repeats_trailing_words() {
        let text = "one two three four five six seven eight";
        let chunks = TextSplitter::new(14, 6).unwrap().split(text);

        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(pair[1].starts_with(last_word));
        }
    }

    #[test]
    fn offsets_point_at_chunk_text() {
        let text = "para one\n\npara two\n\npara three";
        let splitter = TextSplitter::new(12, 0).unwrap();
        for (offset, chunk) in splitter.split_with_offsets(text) {
            assert_eq!(&text[offset..offset + chunk.len()], chunk);
        }
    }

    #[test]
    fn multibyte_text_is_measured_in_characters() {
        let text = "日本語のテキスト".repeat(10);
        let chunks = TextSplitter::new(16, 0).unwrap().split(&text);
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.chars().count() == 16));
    }
}

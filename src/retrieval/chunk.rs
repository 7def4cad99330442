use anyhow::{ensure, Result};
use std::collections::VecDeque;

/// Splits text on a separator and merges the pieces into chunks of at most
/// `chunk_size` characters, repeating up to `chunk_overlap` characters of
/// trailing pieces at the start of the next chunk.
///
/// Pieces longer than `chunk_size` are broken at whitespace first, and cut
/// hard only when a single word is too long.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separator: String,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        ensure!(chunk_size > 0, "chunk_size must be positive");
        ensure!(
            chunk_overlap < chunk_size,
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        );
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separator: "\n\n".to_string(),
        })
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        for piece in text.split(self.separator.as_str()) {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            if char_len(piece) <= self.chunk_size {
                pieces.push(piece.to_string());
            } else {
                pieces.extend(split_words(piece, self.chunk_size));
            }
        }
        self.merge(&pieces)
    }

    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let sep_len = char_len(&self.separator);
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joined_sep = if current.is_empty() { 0 } else { sep_len };

            if total + len + joined_sep > self.chunk_size && !current.is_empty() {
                self.push_chunk(&mut chunks, &current);

                // Keep a tail no longer than the overlap that still leaves room for `piece`.
                while total > self.chunk_overlap
                    || (total > 0 && total + len + sep_len > self.chunk_size)
                {
                    let Some(front) = current.pop_front() else { break };
                    total -= char_len(front);
                    if !current.is_empty() {
                        total -= sep_len;
                    }
                }
            }

            if !current.is_empty() {
                total += sep_len;
            }
            total += len;
            current.push_back(piece);
        }

        self.push_chunk(&mut chunks, &current);
        chunks
    }

    fn push_chunk(&self, chunks: &mut Vec<String>, current: &VecDeque<&str>) {
        if current.is_empty() {
            return;
        }
        let joined = current
            .iter()
            .copied()
            .collect::<Vec<_>>()
            .join(&self.separator);
        let trimmed = joined.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Break `text` into windows of at most `max` characters at whitespace.
fn split_words(text: &str, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = char_len(word);
        if word_len > max {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            out.extend(chars.chunks(max).map(|c| c.iter().collect::<String>()));
            continue;
        }
        let needed = if current.is_empty() { word_len } else { word_len + 1 };
        if current_len + needed > max {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

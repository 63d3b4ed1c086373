//! Splits raw text into bounded, overlapping chunks.
//!
//! Lengths are counted in characters. Every chunk after the first repeats
//! exactly `overlap` characters of its predecessor, so dropping those
//! characters and concatenating restores the input.
//!
//! Cut points are chosen inside the window
//! `[start + max(overlap + 1, max_len / 2), start + max_len]`, preferring the
//! furthest position that ends a paragraph, then a line, then a sentence, then
//! a word. With no boundary in the window the cut is hard at `max_len`.

use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::types::Chunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Word,
}

const PREFERENCE: [Boundary; 4] = [Boundary::Paragraph, Boundary::Line, Boundary::Sentence, Boundary::Word];

impl Boundary {
    /// Whether cutting right before `chars[pos]` ends this kind of unit.
    fn ends_at(self, chars: &[char], pos: usize) -> bool {
        if pos == 0 {
            return false;
        }
        let prev = chars[pos - 1];
        match self {
            Self::Paragraph => prev == '\n' && pos >= 2 && chars[pos - 2] == '\n',
            Self::Line => prev == '\n',
            Self::Sentence => prev.is_whitespace() && pos >= 2 && matches!(chars[pos - 2], '.' | '!' | '?'),
            Self::Word => prev.is_whitespace(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn split(&self, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let ChunkingConfig { max_len, overlap } = self.config;
        let mut chunks = Vec::new();
        let mut start = 0usize;
        while start < chars.len() {
            let end = if chars.len() - start <= max_len {
                chars.len()
            } else {
                self.find_cut(&chars, start)
            };
            chunks.push(Chunk { index: chunks.len(), start, text: chars[start..end].iter().collect() });
            if end == chars.len() {
                break;
            }
            start = end - overlap;
        }
        chunks
    }

    fn find_cut(&self, chars: &[char], start: usize) -> usize {
        let ChunkingConfig { max_len, overlap } = self.config;
        let hard = start + max_len;
        let earliest = start + (overlap + 1).max(max_len / 2);
        for boundary in PREFERENCE {
            if let Some(pos) = (earliest..=hard).rev().find(|&p| boundary.ends_at(chars, p)) {
                return pos;
            }
        }
        hard
    }
}

/// Inverse of [`Chunker::split`]: drops each chunk's leading overlap and
/// concatenates what remains.
pub fn merge_chunks(chunks: &[Chunk], overlap: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push_str(&chunk.text);
        } else {
            out.extend(chunk.text.chars().skip(overlap));
        }
    }
    out
}

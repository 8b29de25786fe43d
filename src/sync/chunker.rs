//! Splitting document text into overlapping chunks.

use std::collections::VecDeque;

/// Separators tried in order, coarsest first. The empty separator splits
/// into single characters.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splitter configuration. Sizes are in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterConfig {
    /// Maximum chunk length.
    pub chunk_size: usize,
    /// Characters carried over from the end of one chunk to the next.
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Recursive character splitter.
///
/// Text is cut at the coarsest separator present (paragraphs, then lines,
/// then words, then characters) and the pieces are merged back up to
/// `chunk_size`, keeping up to `chunk_overlap` characters of context
/// between neighbouring chunks. Chunks are trimmed and empty ones dropped.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl TextSplitter {
    /// Create a splitter. Overlap is clamped below the chunk size.
    #[must_use]
    pub fn new(config: SplitterConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: config.chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Maximum chunk length in characters.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `text` into chunks.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = "";
        let mut finer: &[&str] = &[];
        for (i, &sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                finer = &[];
                break;
            }
            if text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|p| !p.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut small: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }

            if !small.is_empty() {
                chunks.extend(self.merge(&small, separator));
                small.clear();
            }
            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }
        if !small.is_empty() {
            chunks.extend(self.merge(&small, separator));
        }

        chunks
    }

    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len + gap(&current, sep_len) > self.chunk_size {
                if total > self.chunk_size {
                    tracing::trace!(size = total, limit = self.chunk_size, "Oversized chunk");
                }
                if !current.is_empty() {
                    push_trimmed(&mut chunks, &current, separator);

                    while total > self.chunk_overlap
                        || (total > 0 && total + len + gap(&current, sep_len) > self.chunk_size)
                    {
                        let Some((_, first_len)) = current.pop_front() else {
                            break;
                        };
                        total -= first_len + gap(&current, sep_len);
                    }
                }
            }

            total += len + gap(&current, sep_len);
            current.push_back((piece, len));
        }

        push_trimmed(&mut chunks, &current, separator);
        chunks
    }
}

/// Separator length to add when appending to `current`.
fn gap(current: &VecDeque<(&str, usize)>, sep_len: usize) -> usize {
    if current.is_empty() {
        0
    } else {
        sep_len
    }
}

fn push_trimmed(chunks: &mut Vec<String>, current: &VecDeque<(&str, usize)>, separator: &str) {
    let text = current
        .iter()
        .map(|(piece, _)| *piece)
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(SplitterConfig::default())
    }
}

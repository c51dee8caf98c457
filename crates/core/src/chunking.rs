use crate::error::IngestError;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub separator: char,
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            separator: '\n',
            max_chars: 1_000,
            overlap_chars: 200,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// Byte range of a chunk inside the text it was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

/// Splits text on a separator and greedily packs the pieces into overlapping
/// windows. Lengths are counted in chars.
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    config: ChunkingConfig,
}

impl TextSplitter {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_spans(text)
            .into_iter()
            .map(|span| text[span.start..span.end].to_string())
            .collect()
    }

    pub fn split_spans(&self, text: &str) -> Vec<ChunkSpan> {
        let max_chars = self.config.max_chars;
        let overlap_chars = self.config.overlap_chars;

        let mut spans = Vec::new();
        let mut window: VecDeque<Piece> = VecDeque::new();
        let mut total = 0usize;

        for piece in self.pieces(text) {
            if total + piece.chars > max_chars && !window.is_empty() {
                spans.push(span_of(&window));

                // Keep at most `overlap_chars` of tail, and make room for the next piece.
                while total > overlap_chars || (total > 0 && total + piece.chars > max_chars) {
                    match window.pop_front() {
                        Some(dropped) => total -= dropped.chars,
                        None => break,
                    }
                }
            }

            total += piece.chars;
            window.push_back(piece);
        }

        if !window.is_empty() {
            spans.push(span_of(&window));
        }

        spans
    }

    /// Separator-terminated segments, with oversized segments cut into
    /// fragments so that no piece exceeds `max_chars`.
    fn pieces(&self, text: &str) -> Vec<Piece> {
        let max_chars = self.config.max_chars;
        let fragment_chars = if self.config.overlap_chars > 0 {
            self.config.overlap_chars
        } else {
            max_chars
        };

        let mut pieces = Vec::new();
        let mut offset = 0usize;

        for segment in text.split_inclusive(self.config.separator) {
            let start = offset;
            offset += segment.len();
            let chars = segment.chars().count();

            if chars <= max_chars {
                pieces.push(Piece {
                    start,
                    end: offset,
                    chars,
                });
                continue;
            }

            let mut fragment_start = start;
            let mut count = 0usize;
            for (index, _) in segment.char_indices() {
                if count == fragment_chars {
                    pieces.push(Piece {
                        start: fragment_start,
                        end: start + index,
                        chars: count,
                    });
                    fragment_start = start + index;
                    count = 0;
                }
                count += 1;
            }
            if count > 0 {
                pieces.push(Piece {
                    start: fragment_start,
                    end: offset,
                    chars: count,
                });
            }
        }

        pieces
    }
}

fn span_of(window: &VecDeque<Piece>) -> ChunkSpan {
    let start = window.front().map(|piece| piece.start).unwrap_or_default();
    let end = window.back().map(|piece| piece.end).unwrap_or(start);
    ChunkSpan { start, end }
}

/// Splits with the given configuration.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    Ok(TextSplitter::new(config)?.split_text(text))
}

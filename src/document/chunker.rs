//! Splitting page text into retrieval chunks.
//!
//! [`SemanticChunker`] places boundaries where the meaning of neighbouring
//! sentences drifts apart, measured with the embedding model.
//! [`RecursiveSplitter`] is the size-bounded splitter used when no
//! embeddings are available.

use crate::database::similarity::cosine_similarity;
use crate::document::loader::Page;
use crate::providers::traits::EmbeddingProvider;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

/// A contiguous slice of page text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub page: u32,
    /// Byte offset of the chunk within its page text.
    pub start_index: usize,
    pub chunk_index: usize,
    pub source: String,
}

#[async_trait]
pub trait Chunker: Send + Sync {
    async fn split_pages(&self, pages: &[Page], source: &str) -> Result<Vec<Chunk>>;

    fn name(&self) -> &'static str;
}

/// Byte ranges of the sentences in `text`. A sentence ends after `.`, `?`
/// or `!` followed by whitespace; the whitespace is not part of it.
pub fn sentence_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start: Option<usize> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if start.is_none() {
            if c.is_whitespace() {
                continue;
            }
            start = Some(i);
        }
        let terminal = matches!(c, '.' | '?' | '!' | '。' | '？' | '！');
        let next_is_space = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
        if terminal && next_is_space {
            if let Some(s) = start.take() {
                ranges.push(s..i + c.len_utf8());
            }
        }
    }
    if let Some(s) = start {
        let end = text.trim_end().len();
        if end > s {
            ranges.push(s..end);
        }
    }
    ranges
}

/// Linear-interpolated percentile of `values` (0..=100).
pub fn percentile(values: &[f32], pct: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

fn joined(text: &str, ranges: &[Range<usize>]) -> String {
    ranges
        .iter()
        .map(|r| &text[r.clone()])
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct SemanticChunker {
    embeddings: Arc<dyn EmbeddingProvider>,
    buffer_size: usize,
    breakpoint_percentile: f32,
    min_chunk_size: usize,
}

impl SemanticChunker {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        breakpoint_percentile: u8,
        min_chunk_size: usize,
    ) -> Self {
        Self {
            embeddings,
            buffer_size: 1,
            breakpoint_percentile: breakpoint_percentile as f32,
            min_chunk_size,
        }
    }

    /// Each sentence together with `buffer_size` neighbours on both sides.
    fn windows(&self, text: &str, sentences: &[Range<usize>]) -> Vec<String> {
        (0..sentences.len())
            .map(|i| {
                let from = i.saturating_sub(self.buffer_size);
                let to = (i + self.buffer_size + 1).min(sentences.len());
                joined(text, &sentences[from..to])
            })
            .collect()
    }

    /// Groups sentences given the embeddings of their windows.
    fn group(&self, text: &str, sentences: &[Range<usize>], embeddings: &[Vec<f32>]) -> Vec<(usize, String)> {
        if sentences.len() <= 1 {
            return sentences
                .first()
                .map(|r| vec![(r.start, text[r.clone()].to_string())])
                .unwrap_or_default();
        }

        let distances: Vec<f32> = embeddings
            .windows(2)
            .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]))
            .collect();
        let threshold = percentile(&distances, self.breakpoint_percentile);

        let mut groups = Vec::new();
        let mut start = 0;
        for (index, distance) in distances.iter().enumerate() {
            if *distance <= threshold {
                continue;
            }
            let combined = joined(text, &sentences[start..=index]);
            if combined.chars().count() < self.min_chunk_size {
                continue;
            }
            groups.push((sentences[start].start, combined));
            start = index + 1;
        }
        if start < sentences.len() {
            groups.push((sentences[start].start, joined(text, &sentences[start..])));
        }
        groups
    }
}

#[async_trait]
impl Chunker for SemanticChunker {
    async fn split_pages(&self, pages: &[Page], source: &str) -> Result<Vec<Chunk>> {
        let sentences: Vec<Vec<Range<usize>>> =
            pages.iter().map(|page| sentence_ranges(&page.text)).collect();

        // one embeddings call for the whole document
        let windows: Vec<String> = pages
            .iter()
            .zip(&sentences)
            .flat_map(|(page, ranges)| self.windows(&page.text, ranges))
            .collect();
        let embeddings = if windows.is_empty() {
            Vec::new()
        } else {
            self.embeddings.embed_documents(&windows).await?
        };
        if embeddings.len() != windows.len() {
            return Err(anyhow!(
                "expected {} sentence embeddings, got {}",
                windows.len(),
                embeddings.len()
            ));
        }

        let mut chunks = Vec::new();
        let mut offset = 0;
        for (page, ranges) in pages.iter().zip(&sentences) {
            let page_embeddings = &embeddings[offset..offset + ranges.len()];
            offset += ranges.len();

            for (start_index, text) in self.group(&page.text, ranges, page_embeddings) {
                chunks.push(Chunk {
                    text,
                    page: page.number,
                    start_index,
                    chunk_index: chunks.len(),
                    source: source.to_string(),
                });
            }
        }
        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "semantic"
    }
}

const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Size-bounded splitter: tries paragraph, line, sentence and word
/// boundaries in turn, then merges the pieces into windows of at most
/// `chunk_size` characters overlapping by up to `chunk_overlap`.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

fn char_len(text: &str, range: &Range<usize>) -> usize {
    text[range.clone()].chars().count()
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Contiguous pieces covering `range`, each at most `chunk_size` chars.
    fn pieces(&self, text: &str, range: Range<usize>, level: usize) -> Vec<Range<usize>> {
        if char_len(text, &range) <= self.chunk_size {
            return vec![range];
        }

        let Some(separator) = SEPARATORS.get(level) else {
            return self.hard_cut(text, range);
        };

        let slice = &text[range.clone()];
        let mut parts = Vec::new();
        let mut last = 0;
        for (i, _) in slice.match_indices(separator) {
            let end = i + separator.len();
            parts.push(range.start + last..range.start + end);
            last = end;
        }
        if last < slice.len() {
            parts.push(range.start + last..range.end);
        }

        parts
            .into_iter()
            .flat_map(|part| self.pieces(text, part, level + 1))
            .collect()
    }

    fn hard_cut(&self, text: &str, range: Range<usize>) -> Vec<Range<usize>> {
        let slice = &text[range.clone()];
        let mut cuts: Vec<usize> = slice
            .char_indices()
            .map(|(i, _)| i)
            .step_by(self.chunk_size)
            .collect();
        cuts.push(slice.len());
        cuts.windows(2)
            .map(|w| range.start + w[0]..range.start + w[1])
            .collect()
    }

    /// (start offset, trimmed text) of each chunk of `text`.
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        let pieces = self.pieces(text, 0..text.len(), 0);

        let mut chunks = Vec::new();
        let mut window: Vec<Range<usize>> = Vec::new();
        let mut window_len = 0;

        let mut emit = |window: &[Range<usize>]| {
            if let (Some(first), Some(last)) = (window.first(), window.last()) {
                let raw = &text[first.start..last.end];
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    let lead = raw.len() - raw.trim_start().len();
                    chunks.push((first.start + lead, trimmed.to_string()));
                }
            }
        };

        for piece in pieces {
            let piece_len = char_len(text, &piece);
            if window_len + piece_len > self.chunk_size && !window.is_empty() {
                emit(&window);
                while window_len > self.chunk_overlap
                    || (window_len + piece_len > self.chunk_size && window_len > 0)
                {
                    let removed = window.remove(0);
                    window_len -= char_len(text, &removed);
                }
            }
            window_len += piece_len;
            window.push(piece);
        }
        emit(&window);

        chunks
    }
}

#[async_trait]
impl Chunker for RecursiveSplitter {
    async fn split_pages(&self, pages: &[Page], source: &str) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        for page in pages {
            for (start_index, text) in self.split_text(&page.text) {
                chunks.push(Chunk {
                    text,
                    page: page.number,
                    start_index,
                    chunk_index: chunks.len(),
                    source: source.to_string(),
                });
            }
        }
        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "recursive"
    }
}

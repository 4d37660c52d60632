//! Token-counting text splitter with overlap.
//!
//! Token spans are widened so each token owns the text up to the next token:
//! leading text belongs to the first token and trailing text to the last.
//! Chunks are therefore exact slices of the source, and consecutive chunks
//! share exactly `chunk_overlap` tokens.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::error::IndexError;
use crate::models::IndexingConfig;

/// Produces token byte spans over a text, in order.
pub trait Tokenize: Send + Sync {
    fn spans(&self, text: &str) -> Result<Vec<(usize, usize)>, IndexError>;
}

static RE_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+|[^\w\s]").unwrap());

/// Words, numbers and single punctuation marks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexTokenizer;

impl Tokenize for RegexTokenizer {
    fn spans(&self, text: &str) -> Result<Vec<(usize, usize)>, IndexError> {
        Ok(RE_TOKEN
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .collect())
    }
}

/// HuggingFace tokenizer loaded from a `tokenizer.json`.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self, IndexError> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| IndexError::Tokenizer(format!("{}: {}", path.display(), e)))?;
        Ok(Self { inner })
    }
}

impl Tokenize for HfTokenizer {
    fn spans(&self, text: &str) -> Result<Vec<(usize, usize)>, IndexError> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| IndexError::Tokenizer(e.to_string()))?;
        let mut spans: Vec<(usize, usize)> = encoding
            .get_offsets()
            .iter()
            .copied()
            .filter(|(start, end)| end > start)
            .collect();
        spans.sort_by_key(|(start, _)| *start);
        Ok(spans)
    }
}

/// A contiguous slice of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub chunk_id: usize,
    pub content: String,
    /// Byte range in the source text.
    pub start: usize,
    pub end: usize,
    pub token_count: usize,
}

#[derive(Clone)]
pub struct TokenTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    tokenizer: Arc<dyn Tokenize>,
}

impl std::fmt::Debug for TokenTextSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenTextSplitter")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish_non_exhaustive()
    }
}

impl TokenTextSplitter {
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        tokenizer: Arc<dyn Tokenize>,
    ) -> Result<Self, IndexError> {
        if chunk_size == 0 {
            return Err(IndexError::InvalidChunkConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(IndexError::InvalidChunkConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            tokenizer,
        })
    }

    /// Splitter from config, using the HuggingFace tokenizer when a path is set.
    pub fn from_config(config: &IndexingConfig) -> Result<Self, IndexError> {
        let tokenizer: Arc<dyn Tokenize> = match &config.tokenizer_path {
            Some(path) => Arc::new(HfTokenizer::from_file(path)?),
            None => Arc::new(RegexTokenizer),
        };
        Self::new(config.chunk_size, config.chunk_overlap, tokenizer)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks. Text without tokens yields no chunks.
    pub fn split(&self, text: &str) -> Result<Vec<TextChunk>, IndexError> {
        let spans = self.tokenizer.spans(text)?;
        let n = spans.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        // boundaries[i] is where token i starts after widening; boundaries[n] is the end.
        let mut boundaries: Vec<usize> = Vec::with_capacity(n + 1);
        boundaries.push(0);
        boundaries.extend(spans.iter().skip(1).map(|(start, _)| *start));
        boundaries.push(text.len());

        let mut chunks = Vec::new();
        let mut first = 0;
        loop {
            let last = (first + self.chunk_size).min(n);
            let (start, end) = (boundaries[first], boundaries[last]);
            chunks.push(TextChunk {
                chunk_id: chunks.len(),
                content: text[start..end].to_string(),
                start,
                end,
                token_count: last - first,
            });
            if last == n {
                break;
            }
            first = last - self.chunk_overlap;
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(size: usize, overlap: usize) -> TokenTextSplitter {
        TokenTextSplitter::new(size, overlap, Arc::new(RegexTokenizer)).unwrap()
    }

    fn token_texts(text: &str) -> Vec<String> {
        RegexTokenizer
            .spans(text)
            .unwrap()
            .into_iter()
            .map(|(s, e)| text[s..e].to_string())
            .collect()
    }

    const TEXT: &str = "  The quick brown fox jumps over the lazy dog. \
        Pack my box with five dozen liquor jugs! How vexingly quick daft zebras jump.\n";

    #[test]
    fn test_invalid_configs() {
        let tok: Arc<dyn Tokenize> = Arc::new(RegexTokenizer);
        assert!(TokenTextSplitter::new(0, 0, Arc::clone(&tok)).is_err());
        assert!(TokenTextSplitter::new(4, 4, Arc::clone(&tok)).is_err());
        assert!(TokenTextSplitter::new(4, 3, tok).is_ok());
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(splitter(10, 2).split("").unwrap().is_empty());
        assert!(splitter(10, 2).split("   \n ").unwrap().is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = splitter(100, 10).split(TEXT).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, TEXT);
        assert_eq!(chunks[0].chunk_id, 0);
    }

    #[test]
    fn test_chunks_respect_size_and_reconstruct_source() {
        for (size, overlap) in [(5, 0), (5, 2), (7, 3), (4, 1)] {
            let chunks = splitter(size, overlap).split(TEXT).unwrap();
            assert!(chunks.len() > 1);

            let mut rebuilt = String::new();
            let mut covered = 0;
            for chunk in &chunks {
                assert!(chunk.token_count <= size);
                assert!(token_texts(&chunk.content).len() <= size);
                rebuilt.push_str(&TEXT[covered.max(chunk.start)..chunk.end]);
                covered = chunk.end;
            }
            assert_eq!(rebuilt, TEXT, "size={} overlap={}", size, overlap);
            assert_eq!(chunks.first().unwrap().start, 0);
            assert_eq!(chunks.last().unwrap().end, TEXT.len());
        }
    }

    #[test]
    fn test_consecutive_chunks_share_overlap_tokens() {
        let overlap = 2;
        let chunks = splitter(6, overlap).split(TEXT).unwrap();
        for pair in chunks.windows(2) {
            let prev = token_texts(&pair[0].content);
            let next = token_texts(&pair[1].content);
            assert_eq!(prev[prev.len() - overlap..], next[..overlap]);
        }
    }

    #[test]
    fn test_chunk_ids_are_sequential() {
        let chunks = splitter(3, 1).split(TEXT).unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_id, i);
        }
    }

    #[test]
    fn test_from_config_defaults_to_regex_tokenizer() {
        let splitter = TokenTextSplitter::from_config(&IndexingConfig::default()).unwrap();
        assert_eq!(splitter.chunk_size(), 2000);
        assert_eq!(splitter.chunk_overlap(), 400);
    }
}

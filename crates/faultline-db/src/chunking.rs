//! Passage chunking for ingestion.
//!
//! Splits normalized source text into passages bounded by a target
//! word-count window, preferring structural boundaries (headings, table
//! blocks, paragraphs) over mid-paragraph cuts.

use std::collections::HashMap;

use regex::Regex;

use faultline_core::defaults;

/// Configuration for the chunker's word-count window.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Target maximum words per chunk.
    pub max_words: usize,
    /// Target minimum words per chunk (smaller tails are merged backward).
    pub min_words: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_words: defaults::CHUNK_MAX_WORDS,
            min_words: defaults::CHUNK_MIN_WORDS,
        }
    }
}

/// A text passage with position information and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// Starting byte offset in the normalized document.
    pub start_offset: usize,
    /// Ending byte offset in the normalized document.
    pub end_offset: usize,
    /// Additional metadata (e.g. the heading the chunk falls under).
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Word count of the chunk.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Check if the chunk is empty.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A structural block of the source document.
#[derive(Debug)]
struct Block {
    text: String,
    start: usize,
    end: usize,
    heading: Option<String>,
}

/// Chunker that prefers structural boundaries within a word window.
#[derive(Debug, Clone)]
pub struct StructuralChunker {
    config: ChunkerConfig,
}

impl StructuralChunker {
    /// Create a new StructuralChunker with the given configuration.
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Get the configuration used by this chunker.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split text into passages.
    ///
    /// Blocks (heading sections, tables, paragraphs) are accumulated until
    /// the window's max is reached; blocks larger than the window are split
    /// at sentence boundaries as a last resort.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return vec![];
        }

        let blocks = self.split_blocks(text);
        let mut chunks: Vec<Chunk> = Vec::new();

        let mut current_text = String::new();
        let mut current_start = 0usize;
        let mut current_end = 0usize;
        let mut current_words = 0usize;
        let mut current_heading: Option<String> = None;

        let flush = |chunks: &mut Vec<Chunk>,
                     text: &mut String,
                     start: usize,
                     end: usize,
                     heading: &Option<String>| {
            if !text.trim().is_empty() {
                let mut metadata = HashMap::new();
                if let Some(h) = heading {
                    metadata.insert("heading".to_string(), h.clone());
                }
                chunks.push(Chunk {
                    text: std::mem::take(text).trim().to_string(),
                    start_offset: start,
                    end_offset: end,
                    metadata,
                });
            } else {
                text.clear();
            }
        };

        for block in blocks {
            let block_words = block.text.split_whitespace().count();

            // A heading change is a preferred boundary once the minimum is met.
            let heading_changed =
                block.heading != current_heading && current_words >= self.config.min_words;

            if current_words > 0
                && (current_words + block_words > self.config.max_words || heading_changed)
            {
                flush(
                    &mut chunks,
                    &mut current_text,
                    current_start,
                    current_end,
                    &current_heading,
                );
                current_words = 0;
            }

            if block_words > self.config.max_words {
                // Oversized block: split at sentence boundaries.
                flush(
                    &mut chunks,
                    &mut current_text,
                    current_start,
                    current_end,
                    &current_heading,
                );
                current_words = 0;
                for piece in self.split_oversized(&block) {
                    chunks.push(piece);
                }
                current_heading = block.heading.clone();
                continue;
            }

            if current_words == 0 {
                current_start = block.start;
                current_heading = block.heading.clone();
            }
            if !current_text.is_empty() {
                current_text.push_str("\n\n");
            }
            current_text.push_str(&block.text);
            current_end = block.end;
            current_words += block_words;
        }

        flush(
            &mut chunks,
            &mut current_text,
            current_start,
            current_end,
            &current_heading,
        );

        // Merge an undersized tail backward rather than emitting a fragment.
        if chunks.len() >= 2 {
            let tail_words = chunks[chunks.len() - 1].word_count();
            if tail_words < self.config.min_words / 4 {
                let tail = chunks.pop().expect("len checked");
                let prev = chunks.last_mut().expect("len checked");
                prev.text.push_str("\n\n");
                prev.text.push_str(&tail.text);
                prev.end_offset = tail.end_offset;
            }
        }

        chunks
    }

    /// Split the document into structural blocks, tracking the heading each
    /// block falls under. Table blocks (consecutive `|` rows) stay whole.
    fn split_blocks(&self, text: &str) -> Vec<Block> {
        let heading_re = Regex::new(r"^#{1,6}\s+(.+)$").expect("static regex");
        let mut blocks = Vec::new();
        let mut heading: Option<String> = None;

        let mut para = String::new();
        let mut para_start = 0usize;
        let mut offset = 0usize;
        let mut in_table = false;

        let flush_para =
            |para: &mut String, start: usize, end: usize, heading: &Option<String>, blocks: &mut Vec<Block>| {
                if !para.trim().is_empty() {
                    blocks.push(Block {
                        text: std::mem::take(para).trim().to_string(),
                        start,
                        end,
                        heading: heading.clone(),
                    });
                } else {
                    para.clear();
                }
            };

        for line in text.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();
            let trimmed = line.trim_end_matches('\n').trim();

            if let Some(caps) = heading_re.captures(trimmed) {
                flush_para(&mut para, para_start, line_start, &heading, &mut blocks);
                heading = Some(caps[1].trim().to_string());
                blocks.push(Block {
                    text: trimmed.to_string(),
                    start: line_start,
                    end: offset,
                    heading: heading.clone(),
                });
                in_table = false;
                para_start = offset;
                continue;
            }

            let is_table_row = trimmed.starts_with('|');
            if trimmed.is_empty() || (in_table != is_table_row && !para.trim().is_empty()) {
                flush_para(&mut para, para_start, line_start, &heading, &mut blocks);
                para_start = line_start;
            }
            in_table = is_table_row;

            if !trimmed.is_empty() {
                if para.trim().is_empty() {
                    para_start = line_start;
                }
                para.push_str(line);
            }
        }
        flush_para(&mut para, para_start, offset, &heading, &mut blocks);

        blocks
    }

    /// Split one oversized block at sentence boundaries.
    fn split_oversized(&self, block: &Block) -> Vec<Chunk> {
        let sentence_re = Regex::new(r"[.!?]+(?:\s+|$)").expect("static regex");
        let mut pieces = Vec::new();

        let mut piece = String::new();
        let mut piece_words = 0usize;
        let mut piece_start = block.start;
        let mut last_end = 0usize;

        let mut cuts: Vec<usize> = sentence_re.find_iter(&block.text).map(|m| m.end()).collect();
        if cuts.last() != Some(&block.text.len()) {
            cuts.push(block.text.len());
        }

        for cut in cuts {
            let sentence = &block.text[last_end..cut];
            let words = sentence.split_whitespace().count();
            if piece_words > 0 && piece_words + words > self.config.max_words {
                pieces.push(self.piece_chunk(&mut piece, piece_start, block, last_end));
                piece_start = block.start + last_end;
                piece_words = 0;
            }
            piece.push_str(sentence);
            piece_words += words;
            last_end = cut;
        }
        if !piece.trim().is_empty() {
            pieces.push(self.piece_chunk(&mut piece, piece_start, block, last_end));
        }

        pieces
    }

    fn piece_chunk(
        &self,
        piece: &mut String,
        start: usize,
        block: &Block,
        rel_end: usize,
    ) -> Chunk {
        let mut metadata = HashMap::new();
        if let Some(h) = &block.heading {
            metadata.insert("heading".to_string(), h.clone());
        }
        metadata.insert("split".to_string(), "sentence".to_string());
        Chunk {
            text: std::mem::take(piece).trim().to_string(),
            start_offset: start,
            end_offset: block.start + rel_end,
            metadata,
        }
    }
}

impl Default for StructuralChunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

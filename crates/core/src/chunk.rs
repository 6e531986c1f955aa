use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::{PsycheError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words shared by consecutive chunks.
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 900,
            overlap: 200,
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(PsycheError::InvalidChunking {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    /// Stops at the first window that reaches the last word, so no trailing
    /// chunk made only of overlap words is emitted.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        let words: Vec<&str> = document.text.split_whitespace().collect();
        let chunk_size = self.config.chunk_size;
        let stride = self.config.stride();
        let mut start = 0usize;
        let mut sequence = 0usize;
        let mut chunks = Vec::new();
        while start < words.len() {
            let end = (start + chunk_size).min(words.len());
            chunks.push(Chunk {
                id: chunk_id(&document.source, sequence),
                source: document.source.clone(),
                text: words[start..end].join(" "),
            });
            sequence += 1;
            if end == words.len() {
                break;
            }
            start += stride;
        }
        chunks
    }

    pub fn chunk_documents<'a, I>(&self, documents: I) -> Vec<Chunk>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        documents
            .into_iter()
            .flat_map(|doc| self.chunk_document(doc))
            .collect()
    }
}

fn chunk_id(source: &str, sequence: usize) -> String {
    format!("{source}#chunk{sequence:04}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(count: usize) -> String {
        (0..count)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let err = Chunker::new(ChunkConfig {
            chunk_size: 5,
            overlap: 5,
        })
        .unwrap_err();
        assert!(matches!(
            err,
            PsycheError::InvalidChunking {
                chunk_size: 5,
                overlap: 5
            }
        ));
        assert!(Chunker::new(ChunkConfig {
            chunk_size: 0,
            overlap: 0
        })
        .is_err());
    }

    #[test]
    fn windows_advance_by_stride() {
        let chunker = Chunker::new(ChunkConfig {
            chunk_size: 5,
            overlap: 2,
        })
        .unwrap();
        let doc = Document::new("book.txt", numbered_words(10));
        let chunks = chunker.chunk_document(&doc);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["w0 w1 w2 w3 w4", "w3 w4 w5 w6 w7", "w6 w7 w8 w9"]
        );
        assert_eq!(chunks[0].id, "book.txt#chunk0000");
        assert_eq!(chunks[2].id, "book.txt#chunk0002");
        assert!(chunks.iter().all(|c| c.source == "book.txt"));
    }

    #[test]
    fn short_document_is_one_chunk() {
        let chunker = Chunker::new(ChunkConfig::default()).unwrap();
        let doc = Document::new("pasted_text", "  just   a few\nwords ");
        let chunks = chunker.chunk_document(&doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "just a few words");
    }

    #[test]
    fn blank_document_has_no_chunks() {
        let chunker = Chunker::new(ChunkConfig::default()).unwrap();
        assert!(chunker
            .chunk_document(&Document::new("empty.md", " \n\t"))
            .is_empty());
    }

    #[test]
    fn chunk_documents_keeps_per_source_sequences() {
        let chunker = Chunker::new(ChunkConfig {
            chunk_size: 3,
            overlap: 1,
        })
        .unwrap();
        let docs = vec![
            Document::new("a.md", numbered_words(4)),
            Document::new("b.md", numbered_words(2)),
        ];
        let ids: Vec<String> = chunker
            .chunk_documents(&docs)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["a.md#chunk0000", "a.md#chunk0001", "b.md#chunk0000"]);
    }
}

//! Input chunks and their ordering key

use serde::{Deserialize, Serialize};

/// Position of a chunk in the input: book number, then index within the book.
///
/// Ordering is lexicographic on `(book, index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId {
    pub book: u32,
    pub index: u32,
}

impl ChunkId {
    pub fn new(book: u32, index: u32) -> Self {
        Self { book, index }
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "book {} chunk {}", self.book, self.index)
    }
}

/// A bounded piece of source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub book: u32,
    pub index: u32,
    pub text: String,
}

impl Chunk {
    pub fn new(book: u32, index: u32, text: impl Into<String>) -> Self {
        Self {
            book,
            index,
            text: text.into(),
        }
    }

    pub fn id(&self) -> ChunkId {
        ChunkId::new(self.book, self.index)
    }
}

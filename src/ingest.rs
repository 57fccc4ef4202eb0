//! Turning a directory of books into ordered chunks
//!
//! Every `.txt` file is one book. Its number comes from the leading digits
//! of the file name (`01-black-emperor.txt` is book 1); files without
//! leading digits follow the highest explicit number, in file name order.
//! Each book is cut into chunks of roughly `chunk_words` words, breaking
//! between paragraphs.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::processor::Chunk;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("no .txt books in {0}")]
    NoBooks(PathBuf),

    #[error("book number {number} used by both {first} and {second}")]
    DuplicateBook {
        number: u32,
        first: PathBuf,
        second: PathBuf,
    },
}

/// One input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub number: u32,
    pub path: PathBuf,
}

fn leading_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let digits: String = stem.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Find the books in `dir`, ordered by book number.
pub fn discover_books(dir: &Path) -> Result<Vec<Book>, IngestError> {
    let io = |source| IngestError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io)? {
        let path = entry.map_err(io)?.path();
        if path.is_file() && path.extension().is_some_and(|e| e.eq_ignore_ascii_case("txt")) {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        return Err(IngestError::NoBooks(dir.to_path_buf()));
    }
    paths.sort();

    let numbers: Vec<Option<u32>> = paths.iter().map(|p| leading_number(p)).collect();
    let mut next = numbers.iter().flatten().max().copied().unwrap_or(0);
    let mut books: Vec<Book> = paths
        .into_iter()
        .zip(numbers)
        .map(|(path, number)| {
            let number = number.unwrap_or_else(|| {
                next = next.saturating_add(1);
                next
            });
            Book { number, path }
        })
        .collect();
    books.sort_by_key(|b| b.number);

    for pair in books.windows(2) {
        if pair[0].number == pair[1].number {
            return Err(IngestError::DuplicateBook {
                number: pair[0].number,
                first: pair[0].path.clone(),
                second: pair[1].path.clone(),
            });
        }
    }
    Ok(books)
}

/// Split text into chunks of about `chunk_words` words.
///
/// Paragraphs (separated by blank lines) are kept whole unless a single
/// paragraph exceeds the limit, in which case it is split by words.
pub fn split_text(text: &str, chunk_words: usize) -> Vec<String> {
    let limit = chunk_words.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_words = 0;

    let paragraphs = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty());

    for paragraph in paragraphs {
        let words: Vec<&str> = paragraph.split_whitespace().collect();

        if words.len() > limit {
            if !current.is_empty() {
                chunks.push(current.join("\n\n"));
                current.clear();
                current_words = 0;
            }
            for piece in words.chunks(limit) {
                chunks.push(piece.join(" "));
            }
            continue;
        }

        if current_words + words.len() > limit && !current.is_empty() {
            chunks.push(current.join("\n\n"));
            current.clear();
            current_words = 0;
        }
        current_words += words.len();
        current.push(paragraph.to_string());
    }

    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
    }
    chunks
}

/// Read one book and cut it into chunks, indexed from zero.
pub fn chunk_book(book: &Book, chunk_words: usize) -> Result<Vec<Chunk>, IngestError> {
    let text = std::fs::read_to_string(&book.path).map_err(|source| IngestError::Io {
        path: book.path.clone(),
        source,
    })?;
    // Normalize line endings so paragraph breaks are found.
    let text = text.replace("\r\n", "\n");
    let chunks: Vec<Chunk> = split_text(&text, chunk_words)
        .into_iter()
        .enumerate()
        .map(|(i, t)| Chunk::new(book.number, i as u32, t))
        .collect();
    debug!(book = book.number, path = %book.path.display(), chunks = chunks.len(), "chunked book");
    Ok(chunks)
}

/// All chunks of all books in `dir`, in `(book, index)` order.
pub fn load_chunks(dir: &Path, chunk_words: usize) -> Result<Vec<Chunk>, IngestError> {
    let mut chunks = Vec::new();
    for book in discover_books(dir)? {
        chunks.extend(chunk_book(&book, chunk_words)?);
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_stay_whole() {
        let text = "one two three\n\nfour five\n\nsix seven eight nine";
        let chunks = split_text(text, 5);
        assert_eq!(chunks, vec!["one two three\n\nfour five", "six seven eight nine"]);
    }

    #[test]
    fn oversized_paragraph_is_split_by_words() {
        let chunks = split_text("a b c d e f g", 3);
        assert_eq!(chunks, vec!["a b c", "d e f", "g"]);
    }

    #[test]
    fn blank_text_gives_no_chunks() {
        assert!(split_text("\n\n   \n\n", 10).is_empty());
    }

    #[test]
    fn books_are_numbered_from_file_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("10-later.txt"), "Later book.").unwrap();
        let earlier = "Earlier book.\n\nSecond paragraph.";
        std::fs::write(dir.path().join("2-earlier.txt"), earlier).unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let chunks = load_chunks(dir.path(), 2).unwrap();
        let ids: Vec<(u32, u32)> = chunks.iter().map(|c| (c.book, c.index)).collect();
        assert_eq!(ids, vec![(2, 0), (2, 1), (10, 0)]);
        assert_eq!(chunks[1].text, "Second paragraph.");
    }

    #[test]
    fn unnumbered_books_follow_numbered_ones() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("2-foo.txt"), "foo").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "notes").unwrap();
        std::fs::write(dir.path().join("appendix.txt"), "appendix").unwrap();

        let books = discover_books(dir.path()).unwrap();
        let numbered: Vec<(u32, &str)> = books
            .iter()
            .map(|b| (b.number, b.path.file_name().unwrap().to_str().unwrap()))
            .collect();
        assert_eq!(numbered, vec![(2, "2-foo.txt"), (3, "appendix.txt"), (4, "notes.txt")]);
    }

    #[test]
    fn duplicate_book_numbers_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1-a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("01-b.txt"), "b").unwrap();

        assert!(matches!(
            discover_books(dir.path()),
            Err(IngestError::DuplicateBook { number: 1, .. })
        ));
    }

    #[test]
    fn empty_directory_has_no_books() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(discover_books(dir.path()), Err(IngestError::NoBooks(_))));
    }
}

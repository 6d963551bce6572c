use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::Chunk;

pub const ALLOWED_EXTS: [&str; 2] = ["md", "txt"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chars: 1200, overlap: 200 }
    }
}

#[derive(Debug, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self { Self { config } }

    pub fn config(&self) -> &ChunkingConfig { &self.config }

    /// Walk `root` and chunk every eligible document.
    ///
    /// Unreadable files are logged and skipped. A missing or unreadable root
    /// yields no chunks rather than an error.
    pub fn build_chunks(&self, root: &Path) -> Vec<Chunk> {
        if !root.is_dir() {
            warn!(root = %root.display(), "notes folder is not a readable directory");
            return vec![];
        }
        let files = list_text_files(root);
        if files.is_empty() {
            info!(root = %root.display(), "no .md/.txt files found");
            return vec![];
        }
        let mut all_chunks = Vec::new();
        for (file_index, file_path) in files.iter().enumerate() {
            debug!("processing file {}/{}: {}", file_index + 1, files.len(), file_path.display());
            match read_document(file_path) {
                Ok(text) => all_chunks.extend(self.chunk_document(file_path, &text)),
                Err(e) => warn!("{e}"),
            }
        }
        info!(files = files.len(), chunks = all_chunks.len(), "chunked notes folder");
        all_chunks
    }

    pub fn chunk_document(&self, path: &Path, text: &str) -> Vec<Chunk> {
        let source = path.to_string_lossy();
        split_to_chunks(text, self.config.max_chars, self.config.overlap)
            .into_iter()
            .enumerate()
            .map(|(i, body)| Chunk::new(&source, i, body))
            .collect()
    }
}

/// Paragraph-granular splitting with a character-based overlap window.
///
/// Paragraphs are greedily packed while `buffer + paragraph + 2` stays below
/// `max_chars`. A paragraph that alone exceeds the budget becomes its own
/// chunk. Every chunk after the first is prefixed with the last `overlap`
/// characters of the previous chunk as it was before any overlap was added.
pub fn split_to_chunks(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut buf_len = 0usize;
    for para in paragraphs(text) {
        let para_len = para.chars().count();
        if buf_len + para_len + 2 < max_chars {
            if !buf.is_empty() {
                buf.push_str("\n\n");
                buf_len += 2;
            }
            buf.push_str(para);
            buf_len += para_len;
        } else {
            if !buf.is_empty() { chunks.push(std::mem::take(&mut buf)); }
            buf.push_str(para);
            buf_len = para_len;
        }
    }
    if !buf.is_empty() { chunks.push(buf); }

    if overlap == 0 || chunks.len() < 2 { return chunks; }
    let mut merged = Vec::with_capacity(chunks.len());
    merged.push(chunks[0].clone());
    for pair in chunks.windows(2) {
        let joined = format!("{}\n{}", tail_chars(&pair[0], overlap), pair[1]);
        merged.push(joined.trim().to_string());
    }
    merged
}

/// Splits on runs of blank (whitespace-only) lines; each paragraph is trimmed
/// and empty paragraphs are dropped.
fn paragraphs(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0usize;
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if line.trim().is_empty() {
            if let Some(s) = start.take() { out.push(text[s..end].trim()); }
        } else {
            if start.is_none() { start = Some(line_start); }
            end = offset;
        }
    }
    if let Some(s) = start { out.push(text[s..end].trim()); }
    out
}

fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n { return s; }
    match s.char_indices().nth(count - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// Reads a document as UTF-8, replacing invalid byte sequences.
pub fn read_document(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| Error::PartialInput { path: path.to_path_buf(), reason: e.to_string() })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn is_allowed(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ALLOWED_EXTS.iter().any(|a| ext.eq_ignore_ascii_case(a)))
}

/// Regular `.md`/`.txt` files under `root`, in a stable (name-sorted) order.
pub fn list_text_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => { warn!("skipping unreadable entry: {e}"); continue; }
        };
        if entry.file_type().is_file() && is_allowed(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_to_chunks("", 1200, 200).is_empty());
        assert!(split_to_chunks("  \n\n \n", 1200, 200).is_empty());
    }

    #[test]
    fn single_short_paragraph_is_one_chunk() {
        let chunks = split_to_chunks("Short text\n", 1200, 200);
        assert_eq!(chunks, vec!["Short text".to_string()]);
    }

    #[test]
    fn small_paragraphs_pack_into_one_chunk() {
        let text = "alpha one\n\nbravo two\n\n\n\ncharlie three";
        let chunks = split_to_chunks(text, 1200, 200);
        assert_eq!(chunks, vec!["alpha one\n\nbravo two\n\ncharlie three".to_string()]);
    }

    #[test]
    fn overlap_prefixes_tail_of_previous_chunk() {
        let text = "para one text\n\npara two text here";
        let chunks = split_to_chunks(text, 20, 5);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "para one text");
        // " text" is the 5-char tail; the leading space is trimmed away.
        assert_eq!(chunks[1], "text\npara two text here");
    }

    #[test]
    fn overlap_uses_pre_overlap_neighbor() {
        let a = "a".repeat(30);
        let b = "b".repeat(30);
        let c = "c".repeat(30);
        let text = format!("{a}\n\n{b}\n\n{c}");
        let chunks = split_to_chunks(&text, 40, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], format!("aaaa\n{b}"));
        // Third chunk overlaps with the pre-overlap second chunk, not with "aaaa\nbbb...".
        assert_eq!(chunks[2], format!("bbbb\n{c}"));
    }

    #[test]
    fn oversized_paragraph_is_kept_whole() {
        let long = "x".repeat(50);
        let text = format!("short\n\n{long}\n\nend");
        let chunks = split_to_chunks(&text, 20, 0);
        assert_eq!(chunks, vec!["short".to_string(), long, "end".to_string()]);
    }

    #[test]
    fn zero_overlap_leaves_chunks_untouched() {
        let chunks = split_to_chunks("para one text\n\npara two text here", 20, 0);
        assert_eq!(chunks, vec!["para one text".to_string(), "para two text here".to_string()]);
    }

    #[test]
    fn whitespace_only_lines_separate_paragraphs() {
        assert_eq!(paragraphs("a\n \t \nb\r\n\r\nc"), vec!["a", "b", "c"]);
        assert_eq!(paragraphs("line one\nline two\n\nnext"), vec!["line one\nline two", "next"]);
    }

    #[test]
    fn tail_is_counted_in_characters() {
        assert_eq!(tail_chars("héllo wörld", 5), "wörld");
        assert_eq!(tail_chars("ab", 5), "ab");
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert!(is_allowed(Path::new("a/B.MD")));
        assert!(is_allowed(Path::new("notes.Txt")));
        assert!(!is_allowed(Path::new("image.png")));
        assert!(!is_allowed(Path::new("README")));
    }

    #[test]
    fn chunk_ids_are_local_to_each_file() {
        let chunker = Chunker::new(ChunkingConfig { max_chars: 20, overlap: 0 });
        let chunks = chunker.chunk_document(Path::new("n/a.md"), "para one text\n\npara two text here");
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["n/a.md#chunk0", "n/a.md#chunk1"]);
        assert!(chunks.iter().all(|c| c.source == "n/a.md"));
    }
}

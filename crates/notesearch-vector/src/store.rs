//! On-disk pair: `vectors.bin` holds the raw rows, `meta.json` the positionally
//! aligned chunk records plus a BLAKE3 digest of `vectors.bin`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use notesearch_core::types::ChunkMeta;
use notesearch_core::{Error, Result};

use crate::flat::FlatIndex;

pub const VECTORS_FILE: &str = "vectors.bin";
pub const META_FILE: &str = "meta.json";
pub const FORMAT_VERSION: u32 = 1;

const MAGIC: &[u8; 4] = b"NSVI";
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Serialize, Deserialize)]
struct MetaFile {
    version: u32,
    dim: usize,
    count: usize,
    vectors_blake3: String,
    entries: Vec<ChunkMeta>,
}

/// Writes both files, vectors first. Each file is staged in `dir` and renamed
/// into place, so a reader sees either the old or the new file.
pub fn save(dir: &Path, index: &FlatIndex) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| Error::storage(dir, e))?;

    let vectors = encode_vectors(index);
    let meta = MetaFile {
        version: FORMAT_VERSION,
        dim: index.dim(),
        count: index.len(),
        vectors_blake3: blake3::hash(&vectors).to_hex().to_string(),
        entries: index.entries().to_vec(),
    };
    let meta_bytes = serde_json::to_vec(&meta)
        .map_err(|e| Error::storage(dir.join(META_FILE), io::Error::new(io::ErrorKind::InvalidData, e)))?;

    write_atomic(dir, VECTORS_FILE, &vectors)?;
    write_atomic(dir, META_FILE, &meta_bytes)?;
    info!(dir = %dir.display(), count = index.len(), dim = index.dim(), "persisted index");
    Ok(())
}

/// Reads the pair back. `Ok(None)` means there is no usable index: a file is
/// missing or the two files disagree.
pub fn load(dir: &Path) -> Result<Option<FlatIndex>> {
    let Some(vectors) = read_optional(&dir.join(VECTORS_FILE))? else { return Ok(None) };
    let Some(meta_bytes) = read_optional(&dir.join(META_FILE))? else {
        warn!(dir = %dir.display(), "{VECTORS_FILE} present without {META_FILE}; ignoring");
        return Ok(None);
    };
    let meta: MetaFile = match serde_json::from_slice(&meta_bytes) {
        Ok(m) => m,
        Err(e) => { warn!(dir = %dir.display(), "unreadable {META_FILE}: {e}"); return Ok(None); }
    };
    match decode_pair(&vectors, meta) {
        Ok(index) => {
            info!(dir = %dir.display(), count = index.len(), dim = index.dim(), "loaded index");
            Ok(Some(index))
        }
        Err(reason) => { warn!(dir = %dir.display(), "persisted index unusable: {reason}"); Ok(None) }
    }
}

fn encode_vectors(index: &FlatIndex) -> Vec<u8> {
    let data = index.data();
    let mut out = Vec::with_capacity(HEADER_LEN + data.len() * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(index.dim() as u32).to_le_bytes());
    out.extend_from_slice(&(index.len() as u64).to_le_bytes());
    out.extend(data.iter().flat_map(|x| x.to_le_bytes()));
    out
}

fn decode_pair(bytes: &[u8], meta: MetaFile) -> std::result::Result<FlatIndex, String> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err(format!("{VECTORS_FILE} has no valid header"));
    }
    let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    let version = word(4);
    let dim = word(8) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..HEADER_LEN]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    if version != FORMAT_VERSION || meta.version != FORMAT_VERSION {
        return Err(format!("unsupported format version {version}/{}", meta.version));
    }
    if dim != meta.dim || count != meta.count || count != meta.entries.len() {
        return Err(format!(
            "header says {count}x{dim}, metadata says {}x{} with {} entries",
            meta.count, meta.dim, meta.entries.len()
        ));
    }
    let body = &bytes[HEADER_LEN..];
    if Some(body.len()) != count.checked_mul(dim).and_then(|n| n.checked_mul(4)) {
        return Err(format!("{VECTORS_FILE} body is {} bytes, expected {count}x{dim} floats", body.len()));
    }
    if blake3::hash(bytes).to_hex().as_str() != meta.vectors_blake3 {
        return Err(format!("{VECTORS_FILE} digest does not match {META_FILE}"));
    }
    let data: Vec<f32> = body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    FlatIndex::from_parts(dim, data, meta.entries).map_err(|e| e.to_string())
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::storage(path, e)),
    }
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let target = dir.join(name);
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::storage(dir, e))?;
    tmp.write_all(bytes).map_err(|e| Error::storage(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| Error::storage(tmp.path(), e))?;
    tmp.persist(&target).map_err(|e| Error::storage(&target, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesearch_core::types::Chunk;
    use tempfile::TempDir;

    fn sample() -> FlatIndex {
        FlatIndex::build(
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 0.6, 0.8]],
            vec![Chunk::new("a.md", 0, "alpha".into()), Chunk::new("a.md", 1, "beta".into())],
        ).unwrap()
    }

    #[test]
    fn save_then_load_is_identical() {
        let tmp = TempDir::new().unwrap();
        let idx = sample();
        save(tmp.path(), &idx).unwrap();
        assert_eq!(load(tmp.path()).unwrap(), Some(idx));
    }

    #[test]
    fn missing_pair_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(load(tmp.path()).unwrap(), None);
        assert_eq!(load(&tmp.path().join("never-created")).unwrap(), None);
    }

    #[test]
    fn vectors_without_meta_is_unusable() {
        let tmp = TempDir::new().unwrap();
        save(tmp.path(), &sample()).unwrap();
        fs::remove_file(tmp.path().join(META_FILE)).unwrap();
        assert_eq!(load(tmp.path()).unwrap(), None);
    }

    #[test]
    fn truncated_vectors_are_unusable() {
        let tmp = TempDir::new().unwrap();
        save(tmp.path(), &sample()).unwrap();
        let path = tmp.path().join(VECTORS_FILE);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        assert_eq!(load(tmp.path()).unwrap(), None);
    }

    #[test]
    fn vectors_from_another_build_are_unusable() {
        let tmp = TempDir::new().unwrap();
        save(tmp.path(), &sample()).unwrap();
        let stale_meta = fs::read(tmp.path().join(META_FILE)).unwrap();
        let other = FlatIndex::build(
            vec![vec![0.0, 0.0, 1.0], vec![1.0, 0.0, 0.0]],
            sample().entries().to_vec(),
        ).unwrap();
        save(tmp.path(), &other).unwrap();
        fs::write(tmp.path().join(META_FILE), stale_meta).unwrap();
        assert_eq!(load(tmp.path()).unwrap(), None);
    }

    #[test]
    fn garbage_meta_is_unusable() {
        let tmp = TempDir::new().unwrap();
        save(tmp.path(), &sample()).unwrap();
        fs::write(tmp.path().join(META_FILE), b"{not json").unwrap();
        assert_eq!(load(tmp.path()).unwrap(), None);
    }

    #[test]
    fn header_layout() {
        let bytes = encode_vectors(&sample());
        assert_eq!(&bytes[..4], b"NSVI");
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 3);
        assert_eq!(u64::from_le_bytes(bytes[12..20].try_into().unwrap()), 2);
        assert_eq!(bytes.len(), HEADER_LEN + 6 * 4);
    }

    #[test]
    fn save_into_a_file_path_is_a_storage_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        assert!(matches!(save(&blocker.join("idx"), &sample()), Err(Error::Storage { .. })));
    }
}

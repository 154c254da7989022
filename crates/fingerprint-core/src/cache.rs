//! Extended-attribute hash cache: a file's digest is stashed inside a
//! fixed 32-byte `FileInfoCore` record under a `public.fingerprint.*`
//! xattr, keyed by `{inode, size, mtime_ns}`, so a later run can skip
//! re-hashing unchanged content. A read-only filesystem or one without
//! xattr support degrades silently to "just hash it every time" rather
//! than failing the run.

use std::path::Path;

use crate::error::{FingerprintError, Result};
use crate::fileinfo::FileInfoCore;
use crate::hash::{self, HashAlgorithm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XattrMode {
    /// Read a matching cached hash if present; otherwise compute and write.
    On,
    /// Never read or write the cache.
    Off,
    /// Always recompute, overwriting any existing cached record.
    Refresh,
    /// Compute the hash normally, but delete any existing cached record
    /// instead of writing a new one.
    Clear,
}

pub fn hash_file_cached(path: &Path, algo: HashAlgorithm, mode: XattrMode) -> Result<Vec<u8>> {
    let meta = std::fs::metadata(path).map_err(|e| io_err(path, e))?;

    if mode == XattrMode::On {
        if let Some(cached) = read_cache(path, algo, &meta) {
            return Ok(cached);
        }
    }

    let digest = hash::hash_file(path, algo)?;

    match mode {
        XattrMode::On | XattrMode::Refresh => write_cache(path, algo, &meta, &digest),
        XattrMode::Clear => clear_cache(path, algo),
        XattrMode::Off => {}
    }

    Ok(digest)
}

fn read_cache(path: &Path, algo: HashAlgorithm, meta: &std::fs::Metadata) -> Option<Vec<u8>> {
    let raw = xattr::get(path, algo.xattr_name()).ok().flatten()?;
    let stored = FileInfoCore::decode(&raw)?;
    if !stored.matches_metadata(meta) {
        return None;
    }
    Some(stored.hash[..algo.digest_len()].to_vec())
}

fn write_cache(path: &Path, algo: HashAlgorithm, meta: &std::fs::Metadata, digest: &[u8]) {
    let record = FileInfoCore::from_metadata_and_digest(meta, digest);
    let _ = xattr::set(path, algo.xattr_name(), &record.encode());
}

fn clear_cache(path: &Path, algo: HashAlgorithm) {
    let _ = xattr::remove(path, algo.xattr_name());
}

fn io_err(path: &Path, source: std::io::Error) -> FingerprintError {
    FingerprintError::Io { path: path.to_path_buf(), source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn off_mode_never_touches_xattr() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        let digest = hash_file_cached(file.path(), HashAlgorithm::Crc32c, XattrMode::Off).unwrap();
        assert!(xattr::get(file.path(), HashAlgorithm::Crc32c.xattr_name()).unwrap_or(None).is_none());
        assert_eq!(digest, hash::hash_file(file.path(), HashAlgorithm::Crc32c).unwrap());
    }

    #[test]
    fn clear_mode_removes_existing_record_without_writing_a_new_one() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        let _ = hash_file_cached(file.path(), HashAlgorithm::Crc32c, XattrMode::On);
        if xattr::get(file.path(), HashAlgorithm::Crc32c.xattr_name()).unwrap_or(None).is_none() {
            // xattrs unsupported on this filesystem (e.g. tmpfs in CI); nothing to assert.
            return;
        }
        let _ = hash_file_cached(file.path(), HashAlgorithm::Crc32c, XattrMode::Clear);
        assert!(xattr::get(file.path(), HashAlgorithm::Crc32c.xattr_name()).unwrap_or(None).is_none());
    }
}

//! Content hashing: CRC32C for a fast, non-cryptographic checksum, or
//! BLAKE3 for a collision-resistant digest. Files at or above the mmap
//! threshold are hashed from a memory map; smaller files are read into a
//! buffer, since the mmap setup/teardown cost dominates for small inputs.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::{FingerprintError, Result};

pub const MMAP_THRESHOLD: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    Crc32c,
    Blake3,
}

impl HashAlgorithm {
    pub fn xattr_name(self) -> &'static str {
        match self {
            HashAlgorithm::Crc32c => "user.public.fingerprint.crc32c",
            HashAlgorithm::Blake3 => "user.public.fingerprint.blake3",
        }
    }

    /// CRC32C is naturally 4 bytes; BLAKE3 is truncated to its low 64 bits
    /// so both algorithms' digests fit the same 8-byte slot in a cache
    /// record or a folded fingerprint.
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Crc32c => 4,
            HashAlgorithm::Blake3 => 8,
        }
    }
}

pub fn hash_bytes(data: &[u8], algo: HashAlgorithm) -> Vec<u8> {
    match algo {
        HashAlgorithm::Crc32c => {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(data);
            hasher.finalize().to_le_bytes().to_vec()
        }
        HashAlgorithm::Blake3 => blake3::hash(data).as_bytes()[..8].to_vec(),
    }
}

/// Hash a regular file's content.
pub fn hash_file(path: &Path, algo: HashAlgorithm) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let len = file.metadata().map_err(|e| io_err(path, e))?.len();

    if len == 0 {
        return Ok(hash_bytes(&[], algo));
    }

    if len >= MMAP_THRESHOLD {
        let mmap = unsafe { Mmap::map(&file).map_err(|e| io_err(path, e))? };
        Ok(hash_bytes(&mmap, algo))
    } else {
        let mut buf = Vec::with_capacity(len as usize);
        let mut file = file;
        file.read_to_end(&mut buf).map_err(|e| io_err(path, e))?;
        Ok(hash_bytes(&buf, algo))
    }
}

/// Hash a symlink by its target string, not by following it — an
/// unresolvable ("broken") symlink still fingerprints deterministically
/// this way.
pub fn hash_symlink_target(target: &Path, algo: HashAlgorithm) -> Vec<u8> {
    hash_bytes(target.to_string_lossy().as_bytes(), algo)
}

fn io_err(path: &Path, source: std::io::Error) -> FingerprintError {
    FingerprintError::Io { path: path.to_path_buf(), source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32c_and_blake3_differ_and_are_deterministic() {
        let data = b"the quick brown fox";
        let a1 = hash_bytes(data, HashAlgorithm::Crc32c);
        let a2 = hash_bytes(data, HashAlgorithm::Crc32c);
        let b1 = hash_bytes(data, HashAlgorithm::Blake3);
        assert_eq!(a1, a2);
        assert_eq!(a1.len(), 4);
        assert_eq!(b1.len(), 8);
        assert_ne!(a1, b1[..4]);
    }

    #[test]
    fn symlink_target_hash_depends_only_on_target_text() {
        let a = hash_symlink_target(Path::new("../a"), HashAlgorithm::Blake3);
        let b = hash_symlink_target(Path::new("../a"), HashAlgorithm::Blake3);
        let c = hash_symlink_target(Path::new("../b"), HashAlgorithm::Blake3);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

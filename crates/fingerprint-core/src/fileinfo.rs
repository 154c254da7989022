//! `FileInfoCore`: the fixed 32-byte record persisted verbatim into the
//! `public.fingerprint.*` extended attribute — inode, size, and mtime (all
//! in nanoseconds, combined into one field) decide whether a cached hash is
//! still valid; the low 8 bytes carry the hash itself (CRC32C in the low 4
//! bytes with the top 4 reserved/zeroed, or the low 64 bits of a BLAKE3
//! digest). Any attribute value that isn't exactly 32 bytes is a cache miss.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfoCore {
    pub inode: u64,
    pub size: u64,
    pub mtime_ns: u64,
    pub hash: [u8; 8],
}

impl FileInfoCore {
    pub const ENCODED_LEN: usize = 32;

    /// The stat-derived identity half of the record — used to decide
    /// whether a cached hash still applies, ignoring the hash bytes.
    pub fn matches_metadata(&self, meta: &Metadata) -> bool {
        self.inode == meta.ino() && self.size == meta.size() && self.mtime_ns == mtime_ns(meta)
    }

    pub fn from_metadata_and_digest(meta: &Metadata, digest: &[u8]) -> Self {
        let mut hash = [0u8; 8];
        let n = digest.len().min(8);
        hash[..n].copy_from_slice(&digest[..n]);
        FileInfoCore { inode: meta.ino(), size: meta.size(), mtime_ns: mtime_ns(meta), hash }
    }

    /// A broken symlink has no target metadata to stat; it's recorded with
    /// the non-existent sentinel identity and an all-ones sentinel hash.
    pub fn broken_symlink_sentinel() -> Self {
        FileInfoCore { inode: 0, size: 0, mtime_ns: 0, hash: [0xFF; 8] }
    }

    pub fn is_broken_symlink_sentinel(&self) -> bool {
        self.hash == [0xFF; 8] && self.inode == 0 && self.size == 0 && self.mtime_ns == 0
    }

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0..8].copy_from_slice(&self.inode.to_le_bytes());
        buf[8..16].copy_from_slice(&self.size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.mtime_ns.to_le_bytes());
        buf[24..32].copy_from_slice(&self.hash);
        buf
    }

    /// Any size other than exactly 32 bytes is a cache miss (spec §6).
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::ENCODED_LEN {
            return None;
        }
        let mut hash = [0u8; 8];
        hash.copy_from_slice(&buf[24..32]);
        Some(FileInfoCore {
            inode: u64::from_le_bytes(buf[0..8].try_into().ok()?),
            size: u64::from_le_bytes(buf[8..16].try_into().ok()?),
            mtime_ns: u64::from_le_bytes(buf[16..24].try_into().ok()?),
            hash,
        })
    }
}

pub(crate) fn mtime_ns(meta: &Metadata) -> u64 {
    (meta.mtime().max(0) as u64)
        .saturating_mul(1_000_000_000)
        .saturating_add(meta.mtime_nsec().max(0) as u64)
}

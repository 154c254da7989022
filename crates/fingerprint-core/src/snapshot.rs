//! Snapshot I/O: a fingerprint run's per-file digests and the parameters
//! that produced them, persisted to disk so a later run can diff against
//! it. Three on-disk formats are supported — JSON and plist for
//! structured consumption, TSV for a quick `diff`-able text file — chosen
//! by file extension or an explicit flag at the CLI layer. TSV carries
//! only the per-file rows; `fingerprint_params` is JSON/plist-only, since
//! there's no natural tabular slot for a list of glob/regex patterns.

use std::collections::HashMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{FingerprintError, Result};
use crate::fold::FingerprintMode;
use crate::hash::HashAlgorithm;
use crate::pipeline::Fingerprint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintParams {
    pub input_paths: Vec<String>,
    pub glob_patterns: Vec<String>,
    pub regex_patterns: Vec<String>,
    pub hash_algorithm: HashAlgorithm,
    pub fingerprint_mode: FingerprintMode,
    pub fingerprint: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub path: String,
    pub hash: String,
    pub size: u64,
    pub inode: u64,
    pub mtime_ns: u64,
    pub mode: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub fingerprint_params: FingerprintParams,
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    Tsv,
    Plist,
}

impl SnapshotFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(SnapshotFormat::Json),
            "tsv" => Some(SnapshotFormat::Tsv),
            "plist" => Some(SnapshotFormat::Plist),
            _ => None,
        }
    }
}

impl Snapshot {
    pub fn from_fingerprint(
        fingerprint: &Fingerprint,
        input_paths: Vec<String>,
        glob_patterns: Vec<String>,
        regex_patterns: Vec<String>,
        fingerprint_mode: FingerprintMode,
        generated_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let mut entries: Vec<SnapshotEntry> = fingerprint
            .files
            .iter()
            .map(|f| SnapshotEntry {
                path: f.relative_path.to_string_lossy().into_owned(),
                hash: hex::encode(&f.digest),
                size: f.size,
                inode: f.inode,
                mtime_ns: f.mtime_ns,
                mode: f.mode,
            })
            .collect();
        entries.sort_by(|a, b| b.path.cmp(&a.path));

        Snapshot {
            fingerprint_params: FingerprintParams {
                input_paths,
                glob_patterns,
                regex_patterns,
                hash_algorithm: fingerprint.algorithm,
                fingerprint_mode,
                fingerprint: fingerprint.to_hex(),
                timestamp: generated_at.to_rfc3339(),
            },
            entries,
        }
    }

    pub fn write_to<W: Write>(&self, writer: W, format: SnapshotFormat) -> Result<()> {
        match format {
            SnapshotFormat::Json => Ok(serde_json::to_writer_pretty(writer, self)?),
            SnapshotFormat::Plist => Ok(plist::to_writer_xml(writer, self)?),
            SnapshotFormat::Tsv => write_tsv(writer, self),
        }
    }

    pub fn read_from<R: Read>(reader: R, format: SnapshotFormat) -> Result<Self> {
        match format {
            SnapshotFormat::Json => Ok(serde_json::from_reader(reader)?),
            SnapshotFormat::Plist => Ok(plist::from_reader(reader)?),
            SnapshotFormat::Tsv => read_tsv(reader),
        }
    }
}

fn write_tsv<W: Write>(mut writer: W, snapshot: &Snapshot) -> Result<()> {
    let io_err = |e: std::io::Error| FingerprintError::Io { path: "<tsv output>".into(), source: e };
    let algo_col = match snapshot.fingerprint_params.hash_algorithm {
        HashAlgorithm::Crc32c => "crc32c",
        HashAlgorithm::Blake3 => "blake3",
    };
    writeln!(writer, "path\t{algo_col}\tsize\tinode\tmtime_ns\tmode").map_err(io_err)?;
    for entry in &snapshot.entries {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}",
            entry.path, entry.hash, entry.size, entry.inode, entry.mtime_ns, entry.mode
        )
        .map_err(io_err)?;
    }
    Ok(())
}

fn read_tsv<R: Read>(reader: R) -> Result<Snapshot> {
    let mut text = String::new();
    std::io::BufReader::new(reader)
        .read_to_string(&mut text)
        .map_err(|e| FingerprintError::Io { path: "<tsv input>".into(), source: e })?;

    let mut lines = text.lines();
    let header = lines.next().unwrap_or("");
    let hash_algorithm = match header.split('\t').nth(1) {
        Some("crc32c") => HashAlgorithm::Crc32c,
        _ => HashAlgorithm::Blake3,
    };

    let mut entries = Vec::new();
    for line in lines {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() != 6 {
            continue;
        }
        entries.push(SnapshotEntry {
            path: cols[0].to_string(),
            hash: cols[1].to_string(),
            size: cols[2].parse().unwrap_or(0),
            inode: cols[3].parse().unwrap_or(0),
            mtime_ns: cols[4].parse().unwrap_or(0),
            mode: cols[5].parse().unwrap_or(0),
        });
    }

    Ok(Snapshot {
        fingerprint_params: FingerprintParams {
            input_paths: Vec::new(),
            glob_patterns: Vec::new(),
            regex_patterns: Vec::new(),
            hash_algorithm,
            fingerprint_mode: FingerprintMode::Relative,
            fingerprint: String::new(),
            timestamp: String::new(),
        },
        entries,
    })
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    /// Set when the two snapshots were produced with different hash
    /// algorithms — hash differences are meaningless in that case and are
    /// suppressed from `changed`, reported here once instead.
    pub algorithm_mismatch: bool,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

pub fn diff(old: &Snapshot, new: &Snapshot) -> SnapshotDiff {
    let algorithm_mismatch = old.fingerprint_params.hash_algorithm != new.fingerprint_params.hash_algorithm;

    let old_map: HashMap<&str, &SnapshotEntry> = old.entries.iter().map(|e| (e.path.as_str(), e)).collect();
    let new_map: HashMap<&str, &SnapshotEntry> = new.entries.iter().map(|e| (e.path.as_str(), e)).collect();

    let mut result = SnapshotDiff { algorithm_mismatch, ..SnapshotDiff::default() };
    for (path, entry) in &new_map {
        match old_map.get(path) {
            None => result.added.push((*path).to_string()),
            Some(old_entry) => {
                let hash_changed = !algorithm_mismatch && old_entry.hash != entry.hash;
                let metadata_changed =
                    old_entry.size != entry.size || old_entry.mtime_ns != entry.mtime_ns || old_entry.mode != entry.mode;
                if hash_changed || metadata_changed {
                    result.changed.push((*path).to_string());
                }
            }
        }
    }
    for path in old_map.keys() {
        if !new_map.contains_key(path) {
            result.removed.push((*path).to_string());
        }
    }
    result.added.sort();
    result.removed.sort();
    result.changed.sort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fold::FileDigest;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn sample_fingerprint() -> Fingerprint {
        Fingerprint {
            algorithm: HashAlgorithm::Blake3,
            digest: 0x0102030405060708,
            files: vec![
                FileDigest {
                    relative_path: PathBuf::from("b.txt"),
                    absolute_path: PathBuf::from("/root/b.txt"),
                    digest: vec![1, 2],
                    broken_symlink: false,
                    size: 2,
                    inode: 10,
                    mtime_ns: 1_700_000_000_000_000_000,
                    mode: 0o644,
                },
                FileDigest {
                    relative_path: PathBuf::from("a.txt"),
                    absolute_path: PathBuf::from("/root/a.txt"),
                    digest: vec![3, 4],
                    broken_symlink: false,
                    size: 2,
                    inode: 11,
                    mtime_ns: 1_700_000_000_000_000_000,
                    mode: 0o644,
                },
            ],
        }
    }

    fn snapshot() -> Snapshot {
        let ts = chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        Snapshot::from_fingerprint(&sample_fingerprint(), vec!["/root".into()], vec![], vec![], FingerprintMode::Relative, ts)
    }

    #[test]
    fn json_round_trips() {
        let snap = snapshot();
        let mut buf = Vec::new();
        snap.write_to(&mut buf, SnapshotFormat::Json).unwrap();
        let read_back = Snapshot::read_from(&buf[..], SnapshotFormat::Json).unwrap();
        assert_eq!(read_back.fingerprint_params.fingerprint, snap.fingerprint_params.fingerprint);
        assert_eq!(read_back.entries.len(), 2);
    }

    #[test]
    fn tsv_round_trips_entries_but_not_params() {
        let snap = snapshot();
        let mut buf = Vec::new();
        snap.write_to(&mut buf, SnapshotFormat::Tsv).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("path\tblake3\tsize\tinode\tmtime_ns\tmode\n"));
        let read_back = Snapshot::read_from(&buf[..], SnapshotFormat::Tsv).unwrap();
        assert_eq!(read_back.entries.len(), 2);
        assert_eq!(read_back.entries[0].size, snap.entries[0].size);
    }

    #[test]
    fn diff_reports_added_removed_and_changed() {
        let mut old = snapshot();
        old.entries.push(SnapshotEntry { path: "gone.txt".into(), hash: "00".into(), size: 0, inode: 0, mtime_ns: 0, mode: 0 });
        let new = snapshot();

        let mut changed = new.clone();
        changed.entries[0].hash = "ff".into();

        let result = diff(&old, &changed);
        assert_eq!(result.removed, vec!["gone.txt".to_string()]);
        assert!(!result.changed.is_empty());
        assert!(!result.algorithm_mismatch);
    }

    #[test]
    fn diff_detects_metadata_only_change_even_with_same_hash() {
        let old = snapshot();
        let mut new = snapshot();
        new.entries[0].mtime_ns += 1;
        let result = diff(&old, &new);
        assert!(!result.changed.is_empty());
    }

    #[test]
    fn diff_suppresses_hash_diffs_when_algorithms_mismatch() {
        let mut old = snapshot();
        old.fingerprint_params.hash_algorithm = HashAlgorithm::Crc32c;
        let mut new = snapshot();
        new.entries[0].hash = "totally-different".into();

        let result = diff(&old, &new);
        assert!(result.algorithm_mismatch);
        assert!(result.changed.is_empty());
    }
}

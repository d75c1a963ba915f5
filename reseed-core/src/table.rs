use std::path::{Path, PathBuf};

/// Size-indexed multimap of on-disk candidate files.
///
/// Backed by an insertion-ordered record list; `for_each` is the traversal
/// primitive and size probes are O(n). The table is bounded by the number of
/// files in the scanned trees, so linear probes stay cheap next to the
/// hashing their results feed.
#[derive(Clone, Debug, Default)]
pub struct FileTable {
    records: Vec<FileRecord>,
}

#[derive(Clone, Debug)]
struct FileRecord {
    size: u64,
    path: PathBuf,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry. Callers must not insert the same (size, path) pair
    /// twice within one traversal.
    pub fn put(&mut self, size: u64, path: impl Into<PathBuf>) {
        self.records.push(FileRecord { size, path: path.into() });
    }

    /// True iff at least one entry has this size.
    pub fn contains(&self, size: u64) -> bool {
        self.records.iter().any(|r| r.size == size)
    }

    /// All paths recorded with `size`, in insertion order.
    pub fn get(&self, size: u64) -> Vec<&Path> {
        self.records.iter().filter(|r| r.size == size).map(|r| r.path.as_path()).collect()
    }

    /// Union `other` into `self`; on a path collision the receiver's entry
    /// wins (paths are treated as stable identity keys, sizes are not
    /// re-verified).
    pub fn merge(&mut self, other: FileTable) {
        for rec in other.records {
            if !self.has_path(&rec.path) {
                self.records.push(rec);
            }
        }
    }

    /// Delete the entry with `path`, if present; no-op otherwise.
    pub fn remove(&mut self, path: &Path) {
        if let Some(i) = self.records.iter().position(|r| r.path == path) {
            self.records.remove(i);
        }
    }

    /// New table holding only the entries accepted by `keep`.
    pub fn filter(&self, mut keep: impl FnMut(u64, &Path) -> bool) -> FileTable {
        FileTable {
            records: self.records.iter().filter(|r| keep(r.size, &r.path)).cloned().collect(),
        }
    }

    /// Full traversal in insertion order.
    pub fn for_each(&self, mut f: impl FnMut(u64, &Path)) {
        for r in &self.records {
            f(r.size, &r.path);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn has_path(&self, path: &Path) -> bool {
        self.records.iter().any(|r| r.path == path)
    }
}

/// Union independently built tables (typically one per scanned root) into
/// one, dropping entries whose path already appeared in an earlier table.
pub fn union(tables: impl IntoIterator<Item = FileTable>) -> FileTable {
    let mut out = FileTable::new();
    for t in tables {
        out.merge(t);
    }
    out
}

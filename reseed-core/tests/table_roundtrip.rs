use reseed_core::persist::{load_table, save_table, LoadSource, SaveTarget};
use reseed_core::table::{self, FileTable};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

fn sample() -> FileTable {
    let mut t = FileTable::new();
    t.put(200, "/data/a.bin");
    t.put(5, "/data/b.bin");
    t.put(5, "/data/sub/c.bin");
    t.put(1000, "/data/d with spaces.bin");
    t
}

fn entries(t: &FileTable) -> BTreeSet<(u64, PathBuf)> {
    let mut out = BTreeSet::new();
    t.for_each(|size, path| {
        out.insert((size, path.to_path_buf()));
    });
    out
}

#[test]
fn probes_and_ordering() {
    let t = sample();
    assert!(t.contains(5));
    assert!(!t.contains(6));
    assert_eq!(t.get(5), vec![Path::new("/data/b.bin"), Path::new("/data/sub/c.bin")]);
    assert!(t.get(7).is_empty());
    assert_eq!(t.len(), 4);
}

#[test]
fn merge_keeps_existing_on_path_collision() {
    let mut a = sample();
    let mut b = FileTable::new();
    b.put(999, "/data/b.bin"); // same path, different recorded size
    b.put(30, "/data/e.bin");
    a.merge(b);
    assert_eq!(a.len(), 5);
    assert_eq!(a.get(5).len(), 2); // /data/b.bin still listed under its old size
    assert!(!a.contains(999));
    assert!(a.contains(30));
}

#[test]
fn remove_and_filter() {
    let mut t = sample();
    t.remove(Path::new("/data/b.bin"));
    assert_eq!(t.get(5), vec![Path::new("/data/sub/c.bin")]);
    t.remove(Path::new("/data/nope"));
    assert_eq!(t.len(), 3);
    let small = t.filter(|size, _| size < 100);
    assert_eq!(small.len(), 1);
    assert_eq!(t.len(), 3); // receiver untouched
}

#[test]
fn union_drops_duplicate_paths() {
    let mut a = FileTable::new();
    a.put(1, "/x/a");
    let mut b = FileTable::new();
    b.put(1, "/x/a");
    b.put(2, "/x/b");
    let u = table::union([a, b]);
    assert_eq!(u.len(), 2);
}

#[test]
fn save_load_roundtrip_preserves_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.csv");
    let t = sample();
    save_table(&t, SaveTarget::from(path.as_path())).unwrap();
    let back = load_table(LoadSource::from(path.as_path())).unwrap();
    assert_eq!(entries(&t), entries(&back));
}

#[test]
fn roundtrip_through_arbitrary_streams() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream.csv");
    let t = sample();
    let f = std::fs::File::create(&path).unwrap();
    save_table(&t, SaveTarget::Writer(Box::new(f))).unwrap();
    let f = std::fs::File::open(&path).unwrap();
    let back = load_table(LoadSource::Reader(Box::new(f))).unwrap();
    assert_eq!(entries(&t), entries(&back));
}

#[test]
fn malformed_line_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.csv");
    std::fs::write(&path, "12,\"/ok\"\nnot a line\n").unwrap();
    assert!(load_table(LoadSource::from(path.as_path())).is_err());
    std::fs::write(&path, "12,/unquoted\n").unwrap();
    assert!(load_table(LoadSource::from(path.as_path())).is_err());
    std::fs::write(&path, "x,\"/p\"\n").unwrap();
    assert!(load_table(LoadSource::from(path.as_path())).is_err());
}

#[test]
fn load_from_missing_path_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_table(LoadSource::from(dir.path().join("absent.csv"))).is_err());
}

use reseed_core::index::FileIndex;
use reseed_core::scan::ScanOptions;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn load_failure_tears_down_queue() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.csv");

    let idx = FileIndex::index::<PathBuf>(&[], ScanOptions::default());
    let errors = Arc::new(AtomicUsize::new(0));
    idx.on_error({
        let e = Arc::clone(&errors);
        move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        }
    });

    let load = idx.load_from(missing.as_path());
    let save = idx.save(dir.path().join("out.csv"));
    assert!(load.wait().is_err());
    // The save queued behind the failed load is cancelled with a hard error,
    // not silently dropped.
    assert!(save.wait().is_err());
    assert!(errors.load(Ordering::SeqCst) >= 1);
    assert!(!dir.path().join("out.csv").exists());

    // The queue stays dead for later submissions.
    assert!(idx.save(dir.path().join("out2.csv")).wait().is_err());
    assert!(idx.add(&[dir.path().to_path_buf()], ScanOptions::default()).wait().is_err());
}

#[test]
fn load_constructor_surfaces_error_on_following_task() {
    let dir = tempfile::tempdir().unwrap();
    let idx = FileIndex::load(dir.path().join("absent.csv"));
    assert!(idx.save(dir.path().join("out.csv")).wait().is_err());
}

#[test]
fn update_signal_fires_after_each_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("f1"), b"hello").unwrap();

    let idx = FileIndex::index::<PathBuf>(&[], ScanOptions::default());
    let updates = Arc::new(AtomicUsize::new(0));
    idx.on_update({
        let u = Arc::clone(&updates);
        move || {
            u.fetch_add(1, Ordering::SeqCst);
        }
    });
    // Flush the constructor's add so the counter baseline is stable.
    idx.save(dir.path().join("sync.csv")).wait().unwrap();
    let before = updates.load(Ordering::SeqCst);

    idx.add(&[data.clone()], ScanOptions::default()).wait().unwrap();
    idx.remove(&[data.clone()]).wait().unwrap();
    assert_eq!(updates.load(Ordering::SeqCst), before + 2);
}

#[test]
fn save_then_load_roundtrip_through_index() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("a"), vec![1u8; 10]).unwrap();
    fs::write(data.join("b"), vec![2u8; 20]).unwrap();

    let csv1 = dir.path().join("one.csv");
    let csv2 = dir.path().join("two.csv");
    let idx = FileIndex::index(&[data], ScanOptions::default());
    idx.save(csv1.as_path()).wait().unwrap();

    let idx2 = FileIndex::load(csv1.as_path());
    idx2.save(csv2.as_path()).wait().unwrap();

    let mut lines1: Vec<String> =
        fs::read_to_string(&csv1).unwrap().lines().map(String::from).collect();
    let mut lines2: Vec<String> =
        fs::read_to_string(&csv2).unwrap().lines().map(String::from).collect();
    lines1.sort();
    lines2.sort();
    assert_eq!(lines1, lines2);
    assert_eq!(lines1.len(), 2);
}

#[test]
fn malformed_manifest_fails_only_that_search() {
    let dir = tempfile::tempdir().unwrap();
    let idx = FileIndex::index::<PathBuf>(&[], ScanOptions::default());
    assert!(idx.search(b"not a torrent".to_vec()).wait().is_err());
    // The index stays usable for later tasks.
    idx.save(dir.path().join("out.csv")).wait().unwrap();
}

#[test]
fn indexing_a_missing_root_reports_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let idx = FileIndex::index::<PathBuf>(&[], ScanOptions::default());
    let add = idx.add(&[dir.path().join("deleted")], ScanOptions::default());
    assert!(add.wait().is_err());
    // A failed add is not fatal to the queue.
    idx.save(dir.path().join("out.csv")).wait().unwrap();
}

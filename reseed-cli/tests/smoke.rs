use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use sha1::{Digest, Sha1};
use std::process::Command;

fn single_file_torrent(name: &str, piece_length: u64, content: &[u8]) -> Vec<u8> {
    let mut pieces = Vec::new();
    for chunk in content.chunks(piece_length as usize) {
        let d: [u8; 20] = Sha1::digest(chunk).into();
        pieces.extend_from_slice(&d);
    }
    let mut out = Vec::new();
    out.extend_from_slice(b"d4:infod");
    out.extend_from_slice(format!("6:lengthi{}e", content.len()).as_bytes());
    out.extend_from_slice(format!("4:name{}:{}", name.len(), name).as_bytes());
    out.extend_from_slice(format!("12:piece lengthi{piece_length}e").as_bytes());
    out.extend_from_slice(format!("6:pieces{}:", pieces.len()).as_bytes());
    out.extend_from_slice(&pieces);
    out.extend_from_slice(b"ee");
    out
}

fn demo_content() -> Vec<u8> {
    (0..100u8).map(|i| i.wrapping_mul(37).wrapping_add(11)).collect()
}

#[test]
fn scan_then_search_reports_outcomes() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("data");
    data.create_dir_all().unwrap();
    let content = demo_content();
    data.child("renamed.bin").write_binary(&content).unwrap();
    data.child("other.bin").write_binary(&[0u8; 60]).unwrap();
    td.child("demo.torrent")
        .write_binary(&single_file_torrent("movie.mkv", 32, &content))
        .unwrap();

    let csv = td.child("index.csv");
    Command::cargo_bin("reseed")
        .unwrap()
        .arg("scan")
        .arg("--out")
        .arg(csv.path())
        .arg(data.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexed 2 files"));
    csv.assert(predicate::path::exists());

    Command::cargo_bin("reseed")
        .unwrap()
        .arg("search")
        .arg("--index")
        .arg(csv.path())
        .arg(td.child("demo.torrent").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Located movie.mkv"))
        .stdout(predicate::str::contains("Files located: 1 / 1"));
}

#[test]
fn search_move_to_relocates_the_match() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("data");
    data.create_dir_all().unwrap();
    let content = demo_content();
    data.child("renamed.bin").write_binary(&content).unwrap();
    td.child("demo.torrent")
        .write_binary(&single_file_torrent("movie.mkv", 32, &content))
        .unwrap();

    let csv = td.child("index.csv");
    Command::cargo_bin("reseed")
        .unwrap()
        .arg("scan")
        .arg("--out")
        .arg(csv.path())
        .arg(data.path())
        .assert()
        .success();

    let dest = td.child("seeding");
    Command::cargo_bin("reseed")
        .unwrap()
        .arg("search")
        .arg("--index")
        .arg(csv.path())
        .arg("--move-to")
        .arg(dest.path())
        .arg(td.child("demo.torrent").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Files located: 1 / 1"));

    let moved = dest.child("movie.mkv/movie.mkv");
    moved.assert(predicate::path::exists());
    assert_eq!(std::fs::read(moved.path()).unwrap(), content);
    data.child("renamed.bin").assert(predicate::path::missing());
}

#[test]
fn unmatched_torrent_reports_not_found() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("data");
    data.create_dir_all().unwrap();
    data.child("other.bin").write_binary(&[9u8; 40]).unwrap();
    td.child("demo.torrent")
        .write_binary(&single_file_torrent("movie.mkv", 32, &demo_content()))
        .unwrap();

    let csv = td.child("index.csv");
    Command::cargo_bin("reseed")
        .unwrap()
        .arg("scan")
        .arg("--out")
        .arg(csv.path())
        .arg(data.path())
        .assert()
        .success();

    Command::cargo_bin("reseed")
        .unwrap()
        .arg("search")
        .arg("--index")
        .arg(csv.path())
        .arg(td.child("demo.torrent").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No match for movie.mkv"))
        .stdout(predicate::str::contains("Files located: 0 / 1"));
}

#[test]
fn json_output_lists_locations() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("data");
    data.create_dir_all().unwrap();
    let content = demo_content();
    data.child("renamed.bin").write_binary(&content).unwrap();
    td.child("demo.torrent")
        .write_binary(&single_file_torrent("movie.mkv", 32, &content))
        .unwrap();

    let csv = td.child("index.csv");
    Command::cargo_bin("reseed")
        .unwrap()
        .arg("scan")
        .arg("--out")
        .arg(csv.path())
        .arg(data.path())
        .assert()
        .success();

    Command::cargo_bin("reseed")
        .unwrap()
        .arg("search")
        .arg("--json")
        .arg("--index")
        .arg(csv.path())
        .arg(td.child("demo.torrent").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"location\""))
        .stdout(predicate::str::contains("renamed.bin"));
}

#[test]
fn missing_torrent_fails() {
    let td = assert_fs::TempDir::new().unwrap();
    let csv = td.child("index.csv");
    csv.write_str("").unwrap();
    Command::cargo_bin("reseed")
        .unwrap()
        .arg("search")
        .arg("--index")
        .arg(csv.path())
        .arg(td.child("no.torrent").path())
        .assert()
        .failure();
}

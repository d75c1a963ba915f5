//! Decoding of bencoded `.torrent` metainfo into a [`Manifest`].
//!
//! Only the fields the matching engine consumes are extracted: piece length,
//! the piece digest list, and the ordered file list. Anything malformed fails
//! the decode; nothing is guessed.

use crate::manifest::{Manifest, ManifestFile, PieceHash};
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;

enum Value {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Result<u8> {
        match self.buf.get(self.pos) {
            Some(b) => Ok(*b),
            None => bail!("truncated at byte {}", self.pos),
        }
    }

    fn bump(&mut self) -> Result<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    fn expect(&mut self, want: u8) -> Result<()> {
        let got = self.bump()?;
        if got != want {
            bail!("expected {:?} at byte {}, found {:?}", want as char, self.pos - 1, got as char);
        }
        Ok(())
    }

    fn value(&mut self) -> Result<Value> {
        match self.peek()? {
            b'i' => self.int(),
            b'l' => self.list(),
            b'd' => self.dict(),
            b'0'..=b'9' => Ok(Value::Bytes(self.bytes()?)),
            other => bail!("invalid token {:?} at byte {}", other as char, self.pos),
        }
    }

    // i<digits>e, optionally negative
    fn int(&mut self) -> Result<Value> {
        self.expect(b'i')?;
        let start = self.pos;
        if self.peek()? == b'-' {
            self.pos += 1;
        }
        while self.peek()? != b'e' {
            let b = self.bump()?;
            if !b.is_ascii_digit() {
                bail!("invalid integer digit at byte {}", self.pos - 1);
            }
        }
        let text = std::str::from_utf8(&self.buf[start..self.pos]).expect("ascii digits");
        let n: i64 = text.parse().with_context(|| format!("integer at byte {start}"))?;
        self.expect(b'e')?;
        Ok(Value::Int(n))
    }

    // <len>:<bytes>
    fn bytes(&mut self) -> Result<Vec<u8>> {
        let start = self.pos;
        let mut len: usize = 0;
        while self.peek()? != b':' {
            let b = self.bump()?;
            if !b.is_ascii_digit() {
                bail!("invalid string length at byte {}", self.pos - 1);
            }
            len = len
                .checked_mul(10)
                .and_then(|n| n.checked_add((b - b'0') as usize))
                .with_context(|| format!("string length overflow at byte {start}"))?;
        }
        self.expect(b':')?;
        if self.pos + len > self.buf.len() {
            bail!("string of {} bytes truncated at byte {}", len, self.pos);
        }
        let out = self.buf[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(out)
    }

    fn list(&mut self) -> Result<Value> {
        self.expect(b'l')?;
        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.value()?);
        }
        self.expect(b'e')?;
        Ok(Value::List(items))
    }

    fn dict(&mut self) -> Result<Value> {
        self.expect(b'd')?;
        let mut map = BTreeMap::new();
        while self.peek()? != b'e' {
            let key = self.bytes()?;
            let val = self.value()?;
            map.insert(key, val);
        }
        self.expect(b'e')?;
        Ok(Value::Dict(map))
    }
}

fn take_int(dict: &mut BTreeMap<Vec<u8>, Value>, key: &str) -> Result<i64> {
    match dict.remove(key.as_bytes()) {
        Some(Value::Int(n)) => Ok(n),
        Some(_) => bail!("{key} is not an integer"),
        None => bail!("missing {key}"),
    }
}

fn take_bytes(dict: &mut BTreeMap<Vec<u8>, Value>, key: &str) -> Result<Vec<u8>> {
    match dict.remove(key.as_bytes()) {
        Some(Value::Bytes(b)) => Ok(b),
        Some(_) => bail!("{key} is not a string"),
        None => bail!("missing {key}"),
    }
}

fn nonneg(n: i64, what: &str) -> Result<u64> {
    if n < 0 {
        bail!("{what} is negative: {n}");
    }
    Ok(n as u64)
}

/// Decode raw `.torrent` bytes into the manifest the matching engine
/// consumes. Single-file and multi-file layouts are both accepted.
pub fn decode(bytes: &[u8]) -> Result<Manifest> {
    let mut cur = Cursor { buf: bytes, pos: 0 };
    let root = cur.value().context("parse torrent metainfo")?;
    let Value::Dict(mut root) = root else {
        bail!("torrent metainfo is not a dictionary");
    };
    let Some(Value::Dict(mut info)) = root.remove(b"info".as_slice()) else {
        bail!("torrent metainfo has no info dictionary");
    };

    let name = String::from_utf8_lossy(&take_bytes(&mut info, "name")?).into_owned();
    let piece_length = nonneg(take_int(&mut info, "piece length")?, "piece length")?;
    if piece_length == 0 {
        bail!("piece length must be positive");
    }
    let raw_pieces = take_bytes(&mut info, "pieces")?;
    if raw_pieces.len() % 20 != 0 {
        bail!("piece digest blob of {} bytes is not a multiple of 20", raw_pieces.len());
    }
    let pieces: Vec<PieceHash> = raw_pieces
        .chunks_exact(20)
        .map(|c| {
            let mut h = [0u8; 20];
            h.copy_from_slice(c);
            h
        })
        .collect();

    let mut files = Vec::new();
    let mut offset = 0u64;
    match info.remove(b"files".as_slice()) {
        // Multi-file layout: info.files is a list of { length, path } dicts.
        Some(Value::List(items)) => {
            for (i, item) in items.into_iter().enumerate() {
                let Value::Dict(mut fd) = item else {
                    bail!("file entry {i} is not a dictionary");
                };
                let length = nonneg(take_int(&mut fd, "length")?, "file length")?;
                let Some(Value::List(parts)) = fd.remove(b"path".as_slice()) else {
                    bail!("file entry {i} has no path list");
                };
                let mut segs = Vec::with_capacity(parts.len());
                for p in parts {
                    let Value::Bytes(seg) = p else {
                        bail!("file entry {i} has a non-string path segment");
                    };
                    segs.push(String::from_utf8_lossy(&seg).into_owned());
                }
                let file_name = match segs.last() {
                    Some(last) => last.clone(),
                    None => bail!("file entry {i} has an empty path"),
                };
                files.push(ManifestFile {
                    offset,
                    length,
                    path: segs.join("/"),
                    name: file_name,
                    location: None,
                });
                offset += length;
            }
        }
        Some(_) => bail!("info.files is not a list"),
        // Single-file layout: the info name doubles as the file name.
        None => {
            let length = nonneg(take_int(&mut info, "length")?, "file length")?;
            files.push(ManifestFile {
                offset: 0,
                length,
                path: name.clone(),
                name: name.clone(),
                location: None,
            });
            offset = length;
        }
    }

    let total_length = offset;
    if pieces.len() as u64 != total_length.div_ceil(piece_length) {
        bail!("{} piece digests cannot cover {} bytes", pieces.len(), total_length);
    }
    let last_piece_length = if total_length == 0 {
        0
    } else {
        total_length - (pieces.len() as u64 - 1) * piece_length
    };

    Ok(Manifest { name, piece_length, last_piece_length, total_length, files, pieces })
}

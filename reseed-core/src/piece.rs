//! Piece-boundary arithmetic and chunk resolution.

use crate::manifest::{Manifest, PieceHash};
use crate::table::FileTable;
use std::path::PathBuf;

/// One piece of the virtual stream, used to fingerprint the files whose
/// bytes fall inside its span.
#[derive(Clone, Debug)]
pub struct Piece {
    pub offset: u64,
    /// Piece length; the final index uses the manifest's last-piece length.
    pub length: u64,
    pub index: usize,
    pub hash: PieceHash,
    /// The immediately preceding piece, tried when this piece also covers a
    /// neighboring file and its own verification fails. Never present on
    /// piece 0 and never nested.
    pub fallback: Option<Box<Piece>>,
}

/// The sub-range of one manifest file that falls inside one piece.
#[derive(Clone, Debug)]
pub struct Chunk {
    /// Index of the owning file in the manifest's file list.
    pub file_index: usize,
    /// Byte offset of the chunk within its file.
    pub position: u64,
    /// Byte offset of the chunk within the piece.
    pub offset: u64,
    pub length: u64,
}

/// One on-disk path whose size matches a chunk's owning file, plus the
/// chunk's bytes once the read stage has run.
#[derive(Clone, Debug)]
pub struct CandidateMatch {
    pub chunk_index: usize,
    pub path: PathBuf,
    pub buffer: Vec<u8>,
}

/// A piece expanded against the file table: the chunks overlapping its span
/// and every size-matching candidate per chunk.
#[derive(Debug, Default)]
pub struct ChunkSet {
    pub chunks: Vec<Chunk>,
    pub candidates: Vec<CandidateMatch>,
    /// False when some file overlapping the piece had no size candidate at
    /// all; the piece can then never be assembled in full, so enumeration is
    /// skipped before any read happens.
    pub complete: bool,
}

/// The piece-aligned block by which `files[file_index]` can be identified.
///
/// Picks the first piece boundary at or after the file's offset; if that
/// block starts at or past the file's end the file sits entirely inside the
/// preceding piece, which is used instead. When the chosen piece runs past
/// the file's end it shares bytes with a neighbor, so the preceding piece is
/// kept as a fallback identification attempt.
pub fn first_piece(manifest: &Manifest, file_index: usize) -> Piece {
    let file = &manifest.files[file_index];
    let plen = manifest.piece_length;
    let rem = file.offset % plen;
    let mut offset = if rem != 0 { file.offset - rem + plen } else { file.offset };
    let mut fallback = None;
    if offset >= file.offset + file.length && offset >= plen {
        offset -= plen;
    } else if offset + plen > file.offset + file.length && offset >= plen {
        let idx = (offset / plen) as usize - 1;
        fallback = Some(Box::new(Piece {
            offset: offset - plen,
            length: plen,
            index: idx,
            hash: manifest.pieces[idx],
            fallback: None,
        }));
    }
    let index = (offset / plen) as usize;
    let length =
        if index == manifest.pieces.len() - 1 { manifest.last_piece_length } else { plen };
    Piece { offset, length, index, hash: manifest.pieces[index], fallback }
}

/// Expand `piece` into the chunks of the manifest files overlapping its span
/// and gather one candidate per size-matching table entry. `file_index` is
/// the file that triggered the evaluation; the file list is ordered by
/// offset, so the overlapping range is found by scanning outward from it.
pub fn resolve_chunks(
    piece: &Piece,
    manifest: &Manifest,
    file_index: usize,
    table: &FileTable,
) -> ChunkSet {
    let files = &manifest.files;
    let mut first = file_index;
    while first > 0 && files[first].offset > piece.offset {
        first -= 1;
    }
    let mut last = file_index;
    while last < files.len() - 1 {
        if files[last].offset + files[last].length >= piece.offset + piece.length {
            break;
        }
        last += 1;
    }

    let mut set = ChunkSet { chunks: Vec::new(), candidates: Vec::new(), complete: true };
    for i in first..=last {
        let file = &files[i];
        let before = set.candidates.len();
        let chunk_index = set.chunks.len();
        table.for_each(|size, path| {
            if size == file.length {
                set.candidates.push(CandidateMatch {
                    chunk_index,
                    path: path.to_path_buf(),
                    buffer: Vec::new(),
                });
            }
        });
        if set.candidates.len() == before {
            // No evidence can come from this file.
            set.complete = false;
            continue;
        }
        let position = piece.offset.saturating_sub(file.offset);
        let offset = file.offset.saturating_sub(piece.offset);
        let length =
            (file.length.saturating_sub(position)).min(piece.length.saturating_sub(offset));
        set.chunks.push(Chunk { file_index: i, position, offset, length });
    }
    set
}

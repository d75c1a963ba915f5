//! The search loop: piece-by-piece combinatorial verification of manifest
//! files against the file table.

use crate::cartesian::Cartesian;
use crate::manifest::{Manifest, ManifestFile, PieceHash};
use crate::piece::{self, CandidateMatch, ChunkSet, Piece};
use crate::table::FileTable;
use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

/// Called once per newly located file, after its `location` is assigned.
pub type OnLocated<'a> = &'a mut dyn FnMut(&ManifestFile) -> Result<()>;

/// Resolve every manifest file against `table`, filling in `location` where
/// a covering piece hash-verifies. Files are processed sequentially in
/// manifest order so that previous-piece deduplication stays well-defined
/// and callers observe outcomes in manifest order.
pub fn locate_files(
    table: &FileTable,
    manifest: &mut Manifest,
    on_located: OnLocated<'_>,
) -> Result<()> {
    if manifest.pieces.is_empty() {
        return Ok(());
    }
    let mut prev_hash: Option<PieceHash> = None;
    for i in 0..manifest.files.len() {
        if !table.contains(manifest.files[i].length) {
            continue;
        }
        let mut piece = piece::first_piece(manifest, i);
        // The previous file's piece already covered (or will cover) this
        // file; re-evaluating it would be redundant.
        if prev_hash == Some(piece.hash) {
            continue;
        }
        let chunks = piece::resolve_chunks(&piece, manifest, i, table);
        let fallback = match piece.fallback.take() {
            Some(fb) if prev_hash == Some(fb.hash) => None,
            Some(fb) => {
                let fb_chunks = piece::resolve_chunks(&fb, manifest, i, table);
                Some((*fb, fb_chunks))
            }
            None => None,
        };
        prev_hash = Some(piece.hash);
        let located = check_piece(&piece, &chunks, fallback.as_ref().map(|(p, c)| (p, c)), manifest)?;
        for fi in located {
            on_located(&manifest.files[fi])?;
        }
    }
    Ok(())
}

/// Verify one piece, falling back to the preceding piece when the primary
/// does not match. Returns the indices of files newly assigned a location.
fn check_piece(
    piece: &Piece,
    set: &ChunkSet,
    fallback: Option<(&Piece, &ChunkSet)>,
    manifest: &mut Manifest,
) -> Result<Vec<usize>> {
    if set.complete && !set.chunks.is_empty() {
        if let Some(chosen) = find_match(piece, set)? {
            return assign_locations(set, &chosen, manifest);
        }
    }
    if let Some((fb, fb_set)) = fallback {
        if fb_set.complete && !fb_set.chunks.is_empty() {
            if let Some(chosen) = find_match(fb, fb_set)? {
                return assign_locations(fb_set, &chosen, manifest);
            }
        }
    }
    Ok(Vec::new())
}

/// Read every candidate's chunk bytes, then enumerate combinations until one
/// assembles to the piece's recorded digest. Returns the chosen candidate
/// index per chunk, or None when nothing matches.
fn find_match(piece: &Piece, set: &ChunkSet) -> Result<Option<Vec<usize>>> {
    // Reads for distinct candidates proceed concurrently; any failure aborts
    // this piece's evaluation.
    let candidates: Vec<CandidateMatch> = set
        .candidates
        .par_iter()
        .map(|cand| {
            let chunk = &set.chunks[cand.chunk_index];
            let mut f = File::open(&cand.path)
                .with_context(|| format!("open candidate {}", cand.path.display()))?;
            let mut buffer = vec![0u8; chunk.length as usize];
            f.seek(SeekFrom::Start(chunk.position))?;
            f.read_exact(&mut buffer)
                .with_context(|| format!("read candidate {}", cand.path.display()))?;
            Ok(CandidateMatch { chunk_index: cand.chunk_index, path: cand.path.clone(), buffer })
        })
        .collect::<Result<Vec<_>>>()?;

    // Candidate indices grouped per chunk, in discovery order.
    let mut axes: Vec<Vec<usize>> = vec![Vec::new(); set.chunks.len()];
    for (ci, cand) in candidates.iter().enumerate() {
        axes[cand.chunk_index].push(ci);
    }

    let mut assembled = vec![0u8; piece.length as usize];
    for combo in Cartesian::new(axes.iter().map(Vec::len).collect()) {
        for (chunk_i, &pos) in combo.iter().enumerate() {
            let cand = &candidates[axes[chunk_i][pos]];
            let chunk = &set.chunks[chunk_i];
            let start = chunk.offset as usize;
            assembled[start..start + chunk.length as usize].copy_from_slice(&cand.buffer);
        }
        let digest: [u8; 20] = Sha1::digest(&assembled).into();
        if digest == piece.hash {
            let chosen =
                combo.iter().enumerate().map(|(chunk_i, &pos)| axes[chunk_i][pos]).collect();
            return Ok(Some(chosen));
        }
    }
    Ok(None)
}

/// Record the accepted combination's paths on the owning manifest files. A
/// file already located by an earlier piece must agree; disagreement means
/// two verified pieces identify the same file differently, which no caller
/// can recover from.
fn assign_locations(set: &ChunkSet, chosen: &[usize], manifest: &mut Manifest) -> Result<Vec<usize>> {
    let mut located = Vec::new();
    for (chunk_i, chunk) in set.chunks.iter().enumerate() {
        let path = &set.candidates[chosen[chunk_i]].path;
        let file = &mut manifest.files[chunk.file_index];
        match &file.location {
            None => {
                file.location = Some(path.clone());
                located.push(chunk.file_index);
            }
            Some(existing) if existing != path => bail!(
                "conflicting locations for {}: {} vs {}",
                file.path,
                existing.display(),
                path.display()
            ),
            Some(_) => {}
        }
    }
    Ok(located)
}

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// SHA-1 digest of one piece, as recorded by the manifest.
pub type PieceHash = [u8; 20];

/// Parsed content manifest: an ordered file list concatenated into one
/// virtual byte stream, split into fixed-length pieces with one recorded
/// digest per piece.
#[derive(Clone, Debug)]
pub struct Manifest {
    pub name: String,
    pub piece_length: u64,
    /// Length of the final piece; equal to `piece_length` unless the stream
    /// ends mid-piece.
    pub last_piece_length: u64,
    pub total_length: u64,
    pub files: Vec<ManifestFile>,
    pub pieces: Vec<PieceHash>,
}

/// One entry of the manifest's file list.
#[derive(Clone, Debug, Serialize)]
pub struct ManifestFile {
    /// Byte offset within the virtual stream.
    pub offset: u64,
    pub length: u64,
    /// Path inside the manifest, `/`-joined.
    pub path: String,
    /// Display name (final path component).
    pub name: String,
    /// Where the file's content was proven to live on disk. The only field
    /// mutated after construction.
    pub location: Option<PathBuf>,
}

impl Manifest {
    /// Check the structural invariants the matching arithmetic relies on:
    /// contiguous files, a piece list covering the stream exactly, and a
    /// consistent final-piece length.
    pub fn validate(&self) -> Result<()> {
        if self.piece_length == 0 {
            bail!("piece length must be positive");
        }
        let mut offset = 0u64;
        for f in &self.files {
            if f.offset != offset {
                bail!("file {} starts at {} but previous file ends at {}", f.path, f.offset, offset);
            }
            offset += f.length;
        }
        if offset != self.total_length {
            bail!("total length {} does not match file list ({} bytes)", self.total_length, offset);
        }
        let expect = self.total_length.div_ceil(self.piece_length);
        if self.pieces.len() as u64 != expect {
            bail!("{} piece hashes cannot cover {} bytes", self.pieces.len(), self.total_length);
        }
        if self.total_length > 0 {
            let tail = self.total_length - (self.pieces.len() as u64 - 1) * self.piece_length;
            if self.last_piece_length != tail {
                bail!("last piece length {} does not match stream tail {}", self.last_piece_length, tail);
            }
        }
        Ok(())
    }
}

/// Accepted forms of manifest input. Bytes and paths are handed to the
/// metainfo decoder at submission time; a decode failure fails that search
/// only.
pub enum ManifestSource {
    Parsed(Box<Manifest>),
    Bytes(Vec<u8>),
    Path(PathBuf),
}

impl ManifestSource {
    pub fn resolve(self) -> Result<Manifest> {
        let manifest = match self {
            ManifestSource::Parsed(m) => *m,
            ManifestSource::Bytes(b) => crate::metainfo::decode(&b)?,
            ManifestSource::Path(p) => {
                let bytes =
                    std::fs::read(&p).with_context(|| format!("read torrent {}", p.display()))?;
                crate::metainfo::decode(&bytes)?
            }
        };
        manifest.validate()?;
        Ok(manifest)
    }
}

impl From<Manifest> for ManifestSource {
    fn from(m: Manifest) -> Self {
        ManifestSource::Parsed(Box::new(m))
    }
}

impl From<Vec<u8>> for ManifestSource {
    fn from(b: Vec<u8>) -> Self {
        ManifestSource::Bytes(b)
    }
}

impl From<&Path> for ManifestSource {
    fn from(p: &Path) -> Self {
        ManifestSource::Path(p.to_path_buf())
    }
}

impl From<PathBuf> for ManifestSource {
    fn from(p: PathBuf) -> Self {
        ManifestSource::Path(p)
    }
}

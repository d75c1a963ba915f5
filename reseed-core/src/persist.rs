//! CSV persistence of file tables: one `<size>,"<absolute-path>"` line per
//! entry, terminated by the platform's line ending. Paths are written and
//! read back verbatim; a line that does not match the pattern fails the
//! whole load.

use crate::table::FileTable;
use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

#[cfg(windows)]
const EOL: &str = "\r\n";
#[cfg(not(windows))]
const EOL: &str = "\n";

/// Destination of a `save`: a filesystem path or an arbitrary writer.
pub enum SaveTarget {
    Path(PathBuf),
    Writer(Box<dyn Write + Send>),
}

impl From<&Path> for SaveTarget {
    fn from(p: &Path) -> Self {
        SaveTarget::Path(p.to_path_buf())
    }
}

impl From<PathBuf> for SaveTarget {
    fn from(p: PathBuf) -> Self {
        SaveTarget::Path(p)
    }
}

impl From<Box<dyn Write + Send>> for SaveTarget {
    fn from(w: Box<dyn Write + Send>) -> Self {
        SaveTarget::Writer(w)
    }
}

/// Source of a `load`: a filesystem path or an arbitrary reader.
pub enum LoadSource {
    Path(PathBuf),
    Reader(Box<dyn Read + Send>),
}

impl From<&Path> for LoadSource {
    fn from(p: &Path) -> Self {
        LoadSource::Path(p.to_path_buf())
    }
}

impl From<PathBuf> for LoadSource {
    fn from(p: PathBuf) -> Self {
        LoadSource::Path(p)
    }
}

impl From<Box<dyn Read + Send>> for LoadSource {
    fn from(r: Box<dyn Read + Send>) -> Self {
        LoadSource::Reader(r)
    }
}

pub fn save_table(table: &FileTable, target: SaveTarget) -> Result<()> {
    let mut w: Box<dyn Write> = match target {
        SaveTarget::Path(p) => Box::new(BufWriter::new(
            File::create(&p).with_context(|| format!("create {}", p.display()))?,
        )),
        SaveTarget::Writer(w) => w,
    };
    let mut io_err = None;
    table.for_each(|size, path| {
        if io_err.is_some() {
            return;
        }
        if let Err(e) = write!(w, "{},\"{}\"{}", size, path.display(), EOL) {
            io_err = Some(e);
        }
    });
    if let Some(e) = io_err {
        return Err(e).context("write file table");
    }
    w.flush().context("flush file table")?;
    Ok(())
}

pub fn load_table(source: LoadSource) -> Result<FileTable> {
    let reader: Box<dyn Read> = match source {
        LoadSource::Path(p) => {
            Box::new(File::open(&p).with_context(|| format!("open {}", p.display()))?)
        }
        LoadSource::Reader(r) => r,
    };
    let mut table = FileTable::new();
    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.context("read file table line")?;
        let (size, path) =
            parse_line(&line).with_context(|| format!("file table line {}", lineno + 1))?;
        table.put(size, path);
    }
    Ok(table)
}

/// `<size>,"<path>"`; the path is everything between the outer quotes,
/// untransformed.
fn parse_line(line: &str) -> Result<(u64, PathBuf)> {
    let comma = line.find(',').ok_or_else(|| anyhow!("missing separator"))?;
    let size: u64 =
        line[..comma].parse().map_err(|_| anyhow!("invalid size {:?}", &line[..comma]))?;
    let rest = &line[comma + 1..];
    let inner = rest
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .ok_or_else(|| anyhow!("path not quoted"))?;
    if inner.is_empty() {
        bail!("empty path");
    }
    Ok((size, PathBuf::from(inner)))
}

//! Directory traversal into file tables.

use crate::progress::Progress;
use crate::table::{self, FileTable};
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Traversal configuration for one `add`/`index` operation.
#[derive(Clone, Debug, Default)]
pub struct ScanOptions {
    /// Maximum directory depth below each root; unlimited when unset.
    pub max_depth: Option<usize>,
    pub follow_symlinks: bool,
    /// Glob patterns over root-relative paths; empty means everything.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

fn build_globset(includes: &[String], excludes: &[String]) -> Result<(GlobSet, GlobSet)> {
    let mut incb = GlobSetBuilder::new();
    let mut excb = GlobSetBuilder::new();
    if includes.is_empty() {
        incb.add(Glob::new("**/*")?);
    }
    for g in includes {
        incb.add(Glob::new(g)?);
    }
    for g in excludes {
        excb.add(Glob::new(g)?);
    }
    Ok((incb.build()?, excb.build()?))
}

/// Make `p` absolute against the current directory, without resolving
/// symlinks. Table entries always store absolute paths.
pub fn absolutize(p: &Path) -> Result<PathBuf> {
    if p.is_absolute() {
        Ok(p.to_path_buf())
    } else {
        Ok(std::env::current_dir().context("current dir")?.join(p))
    }
}

fn scan_root(
    root: &Path,
    opts: &ScanOptions,
    inc: &GlobSet,
    exc: &GlobSet,
    progress: Option<&Progress>,
) -> Result<FileTable> {
    let mut out = FileTable::new();
    let mut walk = walkdir::WalkDir::new(root).follow_links(opts.follow_symlinks);
    if let Some(depth) = opts.max_depth {
        walk = walk.max_depth(depth);
    }
    for ent in walk {
        let ent = ent.with_context(|| format!("read path under {}", root.display()))?;
        if !ent.file_type().is_file() {
            continue;
        }
        let rel = ent.path().strip_prefix(root).unwrap_or_else(|_| ent.path());
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        if !inc.is_match(&rel_str) || exc.is_match(&rel_str) {
            continue;
        }
        let size = ent
            .metadata()
            .with_context(|| format!("stat {}", ent.path().display()))?
            .len();
        out.put(size, ent.path());
        if let Some(p) = progress {
            p.inc_file();
            p.add_bytes(size as usize);
        }
    }
    Ok(out)
}

/// Scan every root into its own table (roots in parallel) and union the
/// results. Any unreadable path fails the whole scan.
pub fn scan_roots(
    roots: &[PathBuf],
    opts: &ScanOptions,
    progress: Option<&Progress>,
) -> Result<FileTable> {
    let (inc, exc) = build_globset(&opts.include, &opts.exclude)?;
    let tables = roots
        .par_iter()
        .map(|r| {
            let root = absolutize(r)?;
            scan_root(&root, opts, &inc, &exc, progress)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(table::union(tables))
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reseed_core::index::FileIndex;
use reseed_core::localize::FluentLoc;
use reseed_core::manifest::ManifestFile;
use reseed_core::metainfo;
use reseed_core::persist::{save_table, SaveTarget};
use reseed_core::progress::Progress;
use reseed_core::scan::{scan_roots, ScanOptions};

#[derive(Parser)]
#[command(name = "reseed", version, about = "locate torrent data on disk")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Build a file index from folder contents and save it as CSV
    Scan {
        /// Index CSV to write
        #[arg(long, default_value = "index.csv")]
        out: PathBuf,
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long, default_value_t = false)]
        follow_symlinks: bool,
        /// Root-relative include globs (default: everything)
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long, default_value_t = false)]
        progress: bool,
        roots: Vec<PathBuf>,
    },
    /// Search an index for the files of a torrent
    Search {
        #[arg(long, default_value = "index.csv")]
        index: PathBuf,
        /// Move each located file into place under this directory
        #[arg(long)]
        move_to: Option<PathBuf>,
        /// Print the result list as JSON instead of per-file lines
        #[arg(long, default_value_t = false)]
        json: bool,
        torrent: PathBuf,
    },
    /// Add folder contents to an existing index CSV
    Add {
        #[arg(long, default_value = "index.csv")]
        index: PathBuf,
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long, default_value_t = false)]
        follow_symlinks: bool,
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        roots: Vec<PathBuf>,
    },
    /// Remove entries under the given folders from an index CSV
    Remove {
        #[arg(long, default_value = "index.csv")]
        index: PathBuf,
        roots: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Scan { out, max_depth, follow_symlinks, include, exclude, progress, roots } => {
            let opts = ScanOptions { max_depth, follow_symlinks, include, exclude };
            scan(&out, &roots, &opts, progress)?;
        }
        Cmd::Search { index, move_to, json, torrent } => search(&index, move_to, json, &torrent)?,
        Cmd::Add { index, max_depth, follow_symlinks, include, exclude, roots } => {
            let opts = ScanOptions { max_depth, follow_symlinks, include, exclude };
            add(&index, &roots, opts)?;
        }
        Cmd::Remove { index, roots } => remove(&index, &roots)?,
    }
    Ok(())
}

fn scan(out: &Path, roots: &[PathBuf], opts: &ScanOptions, show_progress: bool) -> Result<()> {
    let loc = FluentLoc::builtin("en-GB");
    let prog = Progress::new(show_progress);
    prog.set_stage("Scanning");
    prog.start();
    let table = scan_roots(roots, opts, Some(&prog))?;
    prog.stop();
    save_table(&table, SaveTarget::from(out))?;
    let mut bytes = 0u64;
    table.for_each(|size, _| bytes += size);
    let count = table.len().to_string();
    let bytes = bytes.to_string();
    println!("{}", loc.msg("scan-summary", &[("count", &count), ("bytes", &bytes)]));
    Ok(())
}

fn search(index: &Path, move_to: Option<PathBuf>, json: bool, torrent: &Path) -> Result<()> {
    let loc = Arc::new(FluentLoc::builtin("en-GB"));
    let bytes =
        fs::read(torrent).with_context(|| format!("read torrent {}", torrent.display()))?;
    let manifest = metainfo::decode(&bytes)?;
    let total = manifest.files.len();
    let name = manifest.name.clone();

    let idx = FileIndex::load(index);
    let files = match move_to {
        Some(dest_root) => {
            let dest_base = dest_root.join(&name);
            let loc_moved = Arc::clone(&loc);
            idx.search_with(manifest, move |file| move_into_place(file, &dest_base, &loc_moved))
                .wait()?
        }
        None if json => idx.search(manifest).wait()?,
        None => {
            let loc_match = Arc::clone(&loc);
            idx.on_match(move |file| {
                let path = match &file.location {
                    Some(p) => p.display().to_string(),
                    None => String::from("?"),
                };
                println!(
                    "{}",
                    loc_match.msg("match-found", &[("name", file.name.as_str()), ("path", &path)])
                );
            });
            let loc_miss = Arc::clone(&loc);
            idx.on_not_found(move |file| {
                println!("{}", loc_miss.msg("not-found", &[("name", file.name.as_str())]));
            });
            idx.search(manifest).wait()?
        }
    };

    if json {
        serde_json::to_writer_pretty(std::io::stdout().lock(), &files)?;
        println!();
    }
    let found = files.iter().filter(|f| f.location.is_some()).count().to_string();
    let total = total.to_string();
    println!("{}", loc.msg("search-summary", &[("found", &found), ("total", &total)]));
    Ok(())
}

fn move_into_place(file: &ManifestFile, dest_base: &Path, loc: &FluentLoc) -> Result<()> {
    let Some(src) = &file.location else {
        return Ok(());
    };
    let dest = dest_base.join(&file.path);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::rename(src, &dest)
        .with_context(|| format!("move {} -> {}", src.display(), dest.display()))?;
    let dest = dest.display().to_string();
    println!("{}", loc.msg("moved-file", &[("name", file.name.as_str()), ("dest", &dest)]));
    Ok(())
}

fn add(index: &Path, roots: &[PathBuf], opts: ScanOptions) -> Result<()> {
    let loc = FluentLoc::builtin("en-GB");
    let idx = FileIndex::load(index);
    idx.add(roots, opts).wait()?;
    idx.save(index).wait()?;
    println!("{}", loc.msg("index-updated", &[]));
    Ok(())
}

fn remove(index: &Path, roots: &[PathBuf]) -> Result<()> {
    let loc = FluentLoc::builtin("en-GB");
    let idx = FileIndex::load(index);
    idx.remove(roots).wait()?;
    idx.save(index).wait()?;
    println!("{}", loc.msg("index-updated", &[]));
    Ok(())
}

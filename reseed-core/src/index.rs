//! FileIndex: a FIFO task queue serializing file-table mutation against
//! concurrently running searches for one index instance.
//!
//! Tasks execute on the process-wide rayon pool; admission bookkeeping lives
//! under one mutex per index. Mutation-class tasks (add, remove, load) bar
//! further admission while they run and install a freshly built table by
//! swapping the controller's `Arc`; searches keep whatever table reference
//! they captured at admission, so they never observe a half-rebuilt table.

use crate::locate;
use crate::manifest::{Manifest, ManifestFile, ManifestSource};
use crate::persist::{self, LoadSource, SaveTarget};
use crate::scan::{self, ScanOptions};
use crate::table::FileTable;
use anyhow::{anyhow, Error, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Tasks admitted simultaneously per index instance.
const CONCURRENCY: usize = 5;

type PerFileFn = Box<dyn FnMut(&ManifestFile) -> Result<()> + Send>;

enum Task {
    Search {
        manifest: Manifest,
        per_file: Option<PerFileFn>,
        done: Sender<Result<Vec<ManifestFile>>>,
    },
    Add { roots: Vec<PathBuf>, options: ScanOptions, done: Sender<Result<()>> },
    Remove { roots: Vec<PathBuf>, done: Sender<Result<()>> },
    Load { source: LoadSource, done: Sender<Result<()>> },
    Save { target: SaveTarget, done: Sender<Result<()>> },
}

impl Task {
    fn is_mutation(&self) -> bool {
        matches!(self, Task::Add { .. } | Task::Remove { .. } | Task::Load { .. })
    }

    fn reject(self, cause: &str) {
        let err = anyhow!("index unavailable: {cause}");
        match self {
            Task::Search { done, .. } => {
                let _ = done.send(Err(err));
            }
            Task::Add { done, .. }
            | Task::Remove { done, .. }
            | Task::Load { done, .. }
            | Task::Save { done, .. } => {
                let _ = done.send(Err(err));
            }
        }
    }
}

struct QueueState {
    table: Arc<FileTable>,
    pending: VecDeque<Task>,
    running: usize,
    barred: bool,
    /// Set when a load failure tore the queue down; stores the cause every
    /// later submission is rejected with.
    dead: Option<String>,
}

type FileFn = Box<dyn Fn(&ManifestFile) + Send + Sync>;
type FilesFn = Box<dyn Fn(&[ManifestFile]) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&Error) + Send + Sync>;
type UpdateFn = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Signals {
    matched: Mutex<Vec<FileFn>>,
    not_found: Mutex<Vec<FileFn>>,
    error: Mutex<Vec<ErrorFn>>,
    end: Mutex<Vec<FilesFn>>,
    update: Mutex<Vec<UpdateFn>>,
}

impl Signals {
    fn emit_match(&self, file: &ManifestFile) {
        for f in self.matched.lock().unwrap().iter() {
            f(file);
        }
    }
    fn emit_not_found(&self, file: &ManifestFile) {
        for f in self.not_found.lock().unwrap().iter() {
            f(file);
        }
    }
    fn emit_error(&self, err: &Error) {
        for f in self.error.lock().unwrap().iter() {
            f(err);
        }
    }
    fn emit_end(&self, files: &[ManifestFile]) {
        for f in self.end.lock().unwrap().iter() {
            f(files);
        }
    }
    fn emit_update(&self) {
        for f in self.update.lock().unwrap().iter() {
            f();
        }
    }
}

struct Shared {
    state: Mutex<QueueState>,
    signals: Signals,
}

/// Completion handle for an enqueued task.
pub struct TaskHandle<T> {
    rx: Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Block until the task completes and return its result.
    pub fn wait(self) -> Result<T> {
        self.rx.recv().unwrap_or_else(|_| Err(anyhow!("index task dropped")))
    }
}

pub type SearchHandle = TaskHandle<Vec<ManifestFile>>;

/// A searchable index of on-disk files, keyed by size and proven by content.
#[derive(Clone)]
pub struct FileIndex {
    shared: Arc<Shared>,
}

impl FileIndex {
    fn empty() -> Self {
        FileIndex {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    table: Arc::new(FileTable::new()),
                    pending: VecDeque::new(),
                    running: 0,
                    barred: false,
                    dead: None,
                }),
                signals: Signals::default(),
            }),
        }
    }

    /// Create an index from the contents of the given root folder(s). Errors
    /// surface through the index's `error` signal or through the handle of a
    /// later task.
    pub fn index<P: AsRef<Path>>(paths: &[P], options: ScanOptions) -> FileIndex {
        let idx = FileIndex::empty();
        drop(idx.add(paths, options));
        idx
    }

    /// Create an index by decoding a persisted table. A decode failure tears
    /// the queue down: every pending and later task reports the failure.
    pub fn load(source: impl Into<LoadSource>) -> FileIndex {
        let idx = FileIndex::empty();
        drop(idx.load_from(source));
        idx
    }

    /// Replace the table wholesale by decoding a persisted table. On decode
    /// failure the queue is torn down as in [`load`](Self::load).
    pub fn load_from(&self, source: impl Into<LoadSource>) -> TaskHandle<()> {
        let (tx, rx) = channel();
        self.submit(Task::Load { source: source.into(), done: tx });
        TaskHandle { rx }
    }

    /// Search the index for the files of `source`, emitting `match` /
    /// `notFound` per file and `end` on completion.
    pub fn search(&self, source: impl Into<ManifestSource>) -> SearchHandle {
        self.submit_search(source.into(), None)
    }

    /// Like [`search`](Self::search), but invoking `per_file` for each newly
    /// located file instead of the `match` signal. A handler error fails the
    /// search task.
    pub fn search_with<F>(&self, source: impl Into<ManifestSource>, per_file: F) -> SearchHandle
    where
        F: FnMut(&ManifestFile) -> Result<()> + Send + 'static,
    {
        self.submit_search(source.into(), Some(Box::new(per_file)))
    }

    /// Index the contents of the given folder(s) into the table. Entries
    /// already under those roots are dropped first, so re-adding a root
    /// re-indexes it.
    pub fn add<P: AsRef<Path>>(&self, paths: &[P], options: ScanOptions) -> TaskHandle<()> {
        let (tx, rx) = channel();
        let roots = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        self.submit(Task::Add { roots, options, done: tx });
        TaskHandle { rx }
    }

    /// Drop every entry under the given folder(s). Does not touch the disk.
    pub fn remove<P: AsRef<Path>>(&self, paths: &[P]) -> TaskHandle<()> {
        let (tx, rx) = channel();
        let roots = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        self.submit(Task::Remove { roots, done: tx });
        TaskHandle { rx }
    }

    /// Serialize the current table. A pure read; runs concurrently with
    /// searches.
    pub fn save(&self, target: impl Into<SaveTarget>) -> TaskHandle<()> {
        let (tx, rx) = channel();
        self.submit(Task::Save { target: target.into(), done: tx });
        TaskHandle { rx }
    }

    pub fn on_match(&self, f: impl Fn(&ManifestFile) + Send + Sync + 'static) -> &Self {
        self.shared.signals.matched.lock().unwrap().push(Box::new(f));
        self
    }

    pub fn on_not_found(&self, f: impl Fn(&ManifestFile) + Send + Sync + 'static) -> &Self {
        self.shared.signals.not_found.lock().unwrap().push(Box::new(f));
        self
    }

    pub fn on_error(&self, f: impl Fn(&Error) + Send + Sync + 'static) -> &Self {
        self.shared.signals.error.lock().unwrap().push(Box::new(f));
        self
    }

    pub fn on_end(&self, f: impl Fn(&[ManifestFile]) + Send + Sync + 'static) -> &Self {
        self.shared.signals.end.lock().unwrap().push(Box::new(f));
        self
    }

    pub fn on_update(&self, f: impl Fn() + Send + Sync + 'static) -> &Self {
        self.shared.signals.update.lock().unwrap().push(Box::new(f));
        self
    }

    fn submit_search(&self, source: ManifestSource, per_file: Option<PerFileFn>) -> SearchHandle {
        let (tx, rx) = channel();
        match source.resolve() {
            Ok(manifest) => self.submit(Task::Search { manifest, per_file, done: tx }),
            Err(e) => {
                self.shared.signals.emit_error(&e);
                let _ = tx.send(Err(e));
            }
        }
        TaskHandle { rx }
    }

    fn submit(&self, task: Task) {
        let mut admitted = Vec::new();
        {
            let mut st = self.shared.state.lock().unwrap();
            if let Some(cause) = st.dead.clone() {
                drop(st);
                task.reject(&cause);
                return;
            }
            st.pending.push_back(task);
            pump(&mut st, &mut admitted);
        }
        spawn_all(&self.shared, admitted);
    }
}

/// Admit queued tasks FIFO up to the concurrency ceiling, stopping at a
/// mutation barrier. Each admission captures the current table reference.
fn pump(st: &mut QueueState, out: &mut Vec<(Task, Arc<FileTable>)>) {
    while !st.barred && st.running < CONCURRENCY {
        let Some(task) = st.pending.pop_front() else {
            break;
        };
        if task.is_mutation() {
            st.barred = true;
        }
        st.running += 1;
        out.push((task, Arc::clone(&st.table)));
    }
}

fn spawn_all(shared: &Arc<Shared>, admitted: Vec<(Task, Arc<FileTable>)>) {
    for (task, table) in admitted {
        let shared = Arc::clone(shared);
        rayon::spawn(move || run_task(shared, task, table));
    }
}

fn run_task(shared: Arc<Shared>, task: Task, table: Arc<FileTable>) {
    let mutation = task.is_mutation();
    let mut fatal = None;
    match task {
        Task::Search { mut manifest, per_file, done } => {
            match run_search(&shared, &table, &mut manifest, per_file) {
                Ok(stale) => {
                    for f in manifest.files.iter().filter(|f| f.location.is_none()) {
                        shared.signals.emit_not_found(f);
                    }
                    shared.signals.emit_end(&manifest.files);
                    if !stale.is_empty() {
                        remove_stale(&shared, &stale);
                    }
                    let _ = done.send(Ok(manifest.files));
                }
                Err(e) => {
                    shared.signals.emit_error(&e);
                    let _ = done.send(Err(e));
                }
            }
        }
        Task::Add { roots, options, done } => match scan::scan_roots(&roots, &options, None) {
            Ok(scanned) => {
                let roots_abs = absolutize_roots(&roots);
                {
                    let mut st = shared.state.lock().unwrap();
                    let mut next = st.table.filter(|_, path| !under_any(path, &roots_abs));
                    next.merge(scanned);
                    st.table = Arc::new(next);
                }
                shared.signals.emit_update();
                let _ = done.send(Ok(()));
            }
            Err(e) => {
                shared.signals.emit_error(&e);
                let _ = done.send(Err(e));
            }
        },
        Task::Remove { roots, done } => {
            let roots_abs = absolutize_roots(&roots);
            {
                let mut st = shared.state.lock().unwrap();
                st.table = Arc::new(st.table.filter(|_, path| !under_any(path, &roots_abs)));
            }
            shared.signals.emit_update();
            let _ = done.send(Ok(()));
        }
        Task::Load { source, done } => match persist::load_table(source) {
            Ok(loaded) => {
                {
                    let mut st = shared.state.lock().unwrap();
                    st.table = Arc::new(loaded);
                }
                shared.signals.emit_update();
                let _ = done.send(Ok(()));
            }
            Err(e) => {
                fatal = Some(format!("{e:#}"));
                shared.signals.emit_error(&e);
                let _ = done.send(Err(e));
            }
        },
        Task::Save { target, done } => match persist::save_table(&table, target) {
            Ok(()) => {
                let _ = done.send(Ok(()));
            }
            Err(e) => {
                shared.signals.emit_error(&e);
                let _ = done.send(Err(e));
            }
        },
    }
    finish_task(&shared, mutation, fatal);
}

fn run_search(
    shared: &Arc<Shared>,
    table: &FileTable,
    manifest: &mut Manifest,
    mut per_file: Option<PerFileFn>,
) -> Result<Vec<PathBuf>> {
    let mut stale = Vec::new();
    locate::locate_files(table, manifest, &mut |file| {
        match per_file.as_mut() {
            Some(handler) => {
                handler(file)?;
                // A handler that relocated or deleted the file leaves the
                // table entry pointing nowhere; queue it for cleanup.
                if let Some(loc) = &file.location {
                    if !loc.exists() {
                        stale.push(loc.clone());
                    }
                }
            }
            None => shared.signals.emit_match(file),
        }
        Ok(())
    })?;
    Ok(stale)
}

/// Drop table entries whose path vanished while a per-file handler ran.
fn remove_stale(shared: &Arc<Shared>, stale: &[PathBuf]) {
    let mut st = shared.state.lock().unwrap();
    let mut next = (*st.table).clone();
    for path in stale {
        next.remove(path);
    }
    st.table = Arc::new(next);
}

fn finish_task(shared: &Arc<Shared>, mutation: bool, fatal: Option<String>) {
    let mut admitted = Vec::new();
    let mut rejected = Vec::new();
    let mut cause = None;
    {
        let mut st = shared.state.lock().unwrap();
        st.running -= 1;
        if mutation {
            st.barred = false;
        }
        if let Some(why) = fatal {
            st.dead = Some(why.clone());
            rejected.extend(st.pending.drain(..));
            cause = Some(why);
        } else {
            pump(&mut st, &mut admitted);
        }
    }
    if let Some(why) = cause {
        for task in rejected {
            task.reject(&why);
        }
    }
    spawn_all(shared, admitted);
}

fn absolutize_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    roots.iter().filter_map(|r| scan::absolutize(r).ok()).collect()
}

fn under_any(path: &Path, roots: &[PathBuf]) -> bool {
    roots.iter().any(|r| path.starts_with(r))
}

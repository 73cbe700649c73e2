use crossbeam_channel::{bounded, Sender};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Jobs waiting in the queue before `submit` blocks.
pub const WRITE_QUEUE_CAPACITY: usize = 64;

enum WriteJob {
    Append(PathBuf, Vec<u8>),
    Flush(Sender<()>),
}

/// Counters reported when the queue shuts down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub written: usize,
    pub failed: usize,
}

/// Single background writer over a bounded channel.
///
/// Jobs run in submission order, so appends to the same file never interleave
/// out of order. Submitting never waits for the write itself.
pub struct WriteQueue {
    tx: Option<Sender<WriteJob>>,
    handle: Option<JoinHandle<WriteStats>>,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::with_capacity(WRITE_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = bounded::<WriteJob>(capacity);

        let handle = thread::spawn(move || {
            let mut stats = WriteStats::default();
            for job in rx {
                let result = match job {
                    WriteJob::Append(path, bytes) => append(&path, &bytes).map(|_| path),
                    WriteJob::Flush(done) => {
                        let _ = done.send(());
                        continue;
                    }
                };
                match result {
                    Ok(path) => {
                        stats.written += 1;
                        debug!("Wrote {}", path.display());
                    }
                    Err(e) => {
                        stats.failed += 1;
                        error!("Write failed: {}", e);
                    }
                }
            }
            stats
        });

        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    fn send(&self, job: WriteJob) {
        if let Some(tx) = &self.tx {
            if tx.send(job).is_err() {
                error!("Write queue worker has stopped");
            }
        }
    }

    /// Appends `bytes` to `path`, creating the file and its parents if needed.
    pub fn append(&self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        self.send(WriteJob::Append(path.into(), bytes.into()));
    }

    /// Blocks until every job submitted so far has run.
    pub fn flush(&self) {
        let (done_tx, done_rx) = bounded(1);
        self.send(WriteJob::Flush(done_tx));
        let _ = done_rx.recv();
    }

    /// Drains the queue and stops the worker.
    pub fn finish(mut self) -> WriteStats {
        self.shutdown()
    }

    fn shutdown(&mut self) -> WriteStats {
        drop(self.tx.take());
        self.handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn append(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    ensure_parent(path)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(bytes)
}

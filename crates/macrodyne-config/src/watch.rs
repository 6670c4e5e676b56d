use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use tracing::{debug, trace};

/// Polling watch on a single file.
///
/// The callback runs on the watcher thread whenever the file's modification
/// time or size changes. The watch stops when dropped.
#[derive(Debug)]
pub struct FileWatch {
    path: PathBuf,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

type Fingerprint = Option<(Option<SystemTime>, u64)>;

fn fingerprint(path: &Path) -> Fingerprint {
    std::fs::metadata(path)
        .ok()
        .map(|meta| (meta.modified().ok(), meta.len()))
}

impl FileWatch {
    /// Start watching `path`, checking every `interval`.
    pub fn spawn<F>(path: &Path, interval: Duration, on_change: F) -> io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let watched = path.to_path_buf();
        let mut last = fingerprint(&watched);

        let handle = thread::Builder::new()
            .name("macrodyne-descriptor-watch".to_string())
            .spawn(move || {
                debug!(path = ?watched, "descriptor watch started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let current = fingerprint(&watched);
                    if current != last {
                        trace!(path = ?watched, "descriptor file changed");
                        last = current;
                        on_change();
                    }
                }
                debug!(path = ?watched, "descriptor watch stopped");
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Path being watched.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileWatch {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            // The callback may drop its own watch while reinstalling.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

use minechat_core::AuditEntry;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Appends every audit entry to the history file, one rendered line each.
/// Keeps draining the queue after a file error so the sessions never block on
/// a broken disk.
pub struct HistoryWriter {
    path: PathBuf,
}

impl HistoryWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns how many entries reached the file once the queue closes.
    pub async fn run(self, mut entries: mpsc::Receiver<AuditEntry>) -> u64 {
        let mut file = match open_append(&self.path).await {
            Ok(file) => Some(file),
            Err(err) => {
                warn!(event = "history_open_failed", path = %self.path.display(), error = %err);
                None
            }
        };
        let mut written = 0u64;
        while let Some(entry) = entries.recv().await {
            let Some(out) = file.as_mut() else {
                continue;
            };
            let line = format!("{}\n", entry.render());
            let result = async {
                out.write_all(line.as_bytes()).await?;
                out.flush().await
            }
            .await;
            match result {
                Ok(()) => written += 1,
                Err(err) => {
                    warn!(event = "history_write_failed", path = %self.path.display(), error = %err);
                    file = None;
                }
            }
        }
        debug!(event = "history_writer_done", written);
        written
    }
}

async fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    OpenOptions::new().create(true).append(true).open(path).await
}

/// The last `limit` lines of the history file; a missing file is empty history.
pub async fn load_recent(path: &Path, limit: usize) -> io::Result<Vec<String>> {
    let raw = match fs::read(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let text = String::from_utf8_lossy(&raw);
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    let skip = lines.len().saturating_sub(limit);
    Ok(lines[skip..].iter().map(|line| line.to_string()).collect())
}

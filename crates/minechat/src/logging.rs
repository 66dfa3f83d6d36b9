use crate::config::RuntimeConfig;
use std::env;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

/// Where one run of the binary sends its tracing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub file: Option<PathBuf>,
    pub mirror_stdout: bool,
}

impl LogSettings {
    /// `run` names the log file. A run that owns the terminal never mirrors
    /// to stdout.
    pub fn for_run(config: &RuntimeConfig, run: &str, owns_terminal: bool) -> Self {
        let dir = config.log_dir.trim();
        Self {
            file: (!dir.is_empty()).then(|| Path::new(dir).join(format!("minechat-{run}.log"))),
            mirror_stdout: config.log_stdout && !owns_terminal,
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `MINECHAT_LOG_LEVEL`,
/// which wins over `info`. Returns the log file actually in use.
pub fn init_logging(settings: &LogSettings) -> Option<PathBuf> {
    let level = env::var("MINECHAT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let file = match settings.file.as_deref().map(open_append).transpose() {
        Ok(file) => file,
        Err(err) => {
            eprintln!("minechat: log file unavailable: {err}");
            None
        }
    };
    let in_use = file.as_ref().and(settings.file.clone());
    let tee = Tee {
        file: file.map(|file| Arc::new(Mutex::new(file))),
        stdout: settings.mirror_stdout,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_writer(BoxMakeWriter::new(move || tee.clone()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok()?;
    in_use
}

/// Copies every formatted event to the log file and, optionally, stdout.
#[derive(Clone)]
struct Tee {
    file: Option<Arc<Mutex<File>>>,
    stdout: bool,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                file.write_all(buf)?;
            }
        }
        if self.stdout {
            io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                file.flush()?;
            }
        }
        if self.stdout {
            io::stdout().flush()?;
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

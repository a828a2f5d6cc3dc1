use crate::config::AppConfig;
use chrono::Local;
use env_logger::{Builder, Target};
use log::{Level, LevelFilter};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Marker carried by messages logged through [`success!`](crate::success).
pub const SUCCESS_PREFIX: &str = "✅";

/// Logs an info-level message rendered with the success marker.
#[macro_export]
macro_rules! success {
    ($($arg:tt)+) => {
        log::info!("{} {}", $crate::utils::logger::SUCCESS_PREFIX, format_args!($($arg)+))
    };
}

pub fn level_prefix(level: Level) -> &'static str {
    match level {
        Level::Error => "❌",
        Level::Warn => "⚠️",
        Level::Info => "ℹ️",
        Level::Debug => "🔍",
        Level::Trace => "🔬",
    }
}

/// Prefixes `message` with the emoji for `level`, unless it already
/// carries the success marker.
pub fn decorate(level: Level, message: &str) -> String {
    if message.starts_with(SUCCESS_PREFIX) {
        message.to_string()
    } else {
        format!("{} {}", level_prefix(level), message)
    }
}

/// Installs the global logger: stderr plus an optional size-rotated file.
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &AppConfig) -> io::Result<()> {
    let level = LevelFilter::from_str(&config.log_level).unwrap_or(LevelFilter::Info);

    let file = match &config.log_file {
        Some(path) => Some(RotatingFile::open(path, config.log_max_bytes, config.log_backups)?),
        None => None,
    };

    let mut builder = Builder::new();
    builder
        .filter_level(level)
        .parse_default_env()
        .target(Target::Pipe(Box::new(TeeWriter { file })))
        .format(|buf, record| {
            let message = record.args().to_string();
            writeln!(
                buf,
                "{} | {} | {} | {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(),
                record.level(),
                decorate(record.level(), &message)
            )
        });

    builder
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

struct TeeWriter {
    file: Option<RotatingFile>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            // stderr keeps working after the file sink fails
            if file.write_all(buf).is_err() {
                self.file = None;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Append-only log file that rolls over to `name.1`, `name.2`, ... once it
/// grows past `max_bytes`, keeping at most `backups` old files.
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: File,
    written: u64,
}

impl RotatingFile {
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            max_bytes,
            backups,
            file,
            written,
        })
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups == 0 {
            self.file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
        } else {
            let oldest = self.backup_path(self.backups);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for index in (1..self.backups).rev() {
                let from = self.backup_path(index);
                if from.exists() {
                    fs::rename(&from, self.backup_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
            self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        }
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.max_bytes > 0 && self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Severity tags of the operator-facing run log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTag {
    Success,
    Error,
    Skipped,
    Debug,
}

impl LogTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::Success => "SUCCESS",
            LogTag::Error => "ERRO",
            LogTag::Skipped => "IGNORADO",
            LogTag::Debug => "DEBUG",
        }
    }
}

/// Append-only, one file per run. Every event is flushed as it is written so
/// the file survives a killed process.
pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    /// Creates `import_YYYYMMDD_HHMMSS_<run>.log` under `dir`.
    pub fn create(dir: &Path, run_tag: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("import_{}_{}.log", stamp, run_tag));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, tag: LogTag, detail: &str) -> io::Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(self.file, "[{}] {}: {}", timestamp, tag.as_str(), detail)?;
        self.file.flush()
    }
}

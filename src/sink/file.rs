//! File sink: appends rendered lines to a configured file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::Result;

use super::LocalSink;

/// Appends one rendered line per event to a file. Parent directories are
/// created on construction; `truncate` discards previous content.
pub struct FileSink {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>, truncate: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = if truncate {
            File::create(&path)?
        } else {
            OpenOptions::new().create(true).append(true).open(&path)?
        };

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocalSink for FileSink {
    fn write_line(&self, line: &str) {
        let mut writer = self.writer.lock();
        if let Err(err) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            tracing::warn!(path = %self.path.display(), %err, "File sink write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep/nested/trace.log");
        let sink = FileSink::create(&path, false).unwrap();

        sink.write_line("first");
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\n");
    }

    #[test]
    fn appends_by_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trace.log");

        FileSink::create(&path, false).unwrap().write_line("one");
        FileSink::create(&path, false).unwrap().write_line("two");

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn truncate_discards_previous_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trace.log");

        FileSink::create(&path, false).unwrap().write_line("stale");
        let sink = FileSink::create(&path, true).unwrap();
        sink.write_line("fresh");

        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
    }
}

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use indicatif::ProgressBar;
use parking_lot::Mutex;

pub fn current_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Timestamped log lines, echoed to the terminal and appended to an optional log file.
#[derive(Clone, Default)]
pub struct Logger {
    file: Option<Arc<Mutex<File>>>,
}

impl Logger {
    /// Terminal-only logger.
    pub fn stderr() -> Self {
        Self { file: None }
    }

    pub fn with_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Some(Arc::new(Mutex::new(f))) })
    }

    pub fn info<S: AsRef<str>>(&self, pb: Option<&ProgressBar>, msg: S) {
        let line = format!("[{}] {}", current_timestamp(), msg.as_ref());
        self.emit(pb, &line);
    }

    fn emit(&self, pb: Option<&ProgressBar>, line: &str) {
        match pb {
            Some(pb) if !pb.is_hidden() => pb.println(line),
            _ => eprintln!("{}", line),
        }
        if let Some(ref lf) = self.file {
            let mut guard = lf.lock();
            let _ = writeln!(*guard, "{}", line);
            let _ = guard.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn lines_are_appended_with_timestamp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.log");
        let logger = Logger::with_file(&path).unwrap();
        logger.info(None, "first");
        logger.clone().info(None, "second");

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('[') && lines[0].ends_with("] first"));
        assert!(lines[1].ends_with("] second"));
    }
}

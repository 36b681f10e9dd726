//! Incremental line reading from a growing file

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Reads complete lines appended to a file since the last read
#[derive(Debug)]
pub struct LineTail {
    path: PathBuf,
    offset: u64,
    /// Bytes after the last newline, waiting for the rest of the line
    partial: Vec<u8>,
}

impl LineTail {
    /// Start at the current end of the file; existing lines are skipped
    pub fn open_at_end(path: &Path) -> std::io::Result<Self> {
        let offset = std::fs::metadata(path)?.len();
        Ok(Self {
            path: path.to_path_buf(),
            offset,
            partial: Vec::new(),
        })
    }

    /// Start at the beginning of the file
    pub fn from_start(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            offset: 0,
            partial: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read lines completed since the last call
    ///
    /// A shrinking file is treated as truncated and re-read from the start.
    /// Empty lines are dropped; a trailing `\r` and a leading BOM are stripped.
    pub fn read_new_lines(&mut self) -> std::io::Result<Vec<String>> {
        let len = std::fs::metadata(&self.path)?.len();

        if len < self.offset {
            tracing::info!("{:?} was truncated, reading from the start", self.path);
            self.offset = 0;
            self.partial.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        let mut file = std::fs::File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        let read = file.take(len - self.offset).read_to_end(&mut buf)?;
        self.offset += read as u64;
        self.partial.extend_from_slice(&buf);

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            let line = decode_line(&raw[..raw.len() - 1]);
            if !line.is_empty() {
                lines.push(line);
            }
        }

        Ok(lines)
    }
}

/// Decode one line without its newline
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let text = String::from_utf8_lossy(raw);
    text.trim_start_matches('\u{feff}').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, bytes: &[u8]) {
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(bytes).unwrap();
    }

    #[test]
    fn test_open_at_end_skips_history() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("log.txt");
        std::fs::write(&path, "old line\n").unwrap();

        let mut tail = LineTail::open_at_end(&path).unwrap();
        assert!(tail.read_new_lines().unwrap().is_empty());

        append(&path, "看8\n".as_bytes());
        assert_eq!(tail.read_new_lines().unwrap(), vec!["看8"]);
    }

    #[test]
    fn test_from_start_reads_everything() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("log.txt");
        std::fs::write(&path, "a\nb\n").unwrap();

        let mut tail = LineTail::from_start(&path);
        assert_eq!(tail.read_new_lines().unwrap(), vec!["a", "b"]);
        assert_eq!(tail.offset(), 4);
    }

    #[test]
    fn test_partial_line_is_buffered() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("log.txt");
        std::fs::write(&path, "").unwrap();
        let mut tail = LineTail::open_at_end(&path).unwrap();

        // Split inside a multi-byte character
        let line = "看10号\n".as_bytes();
        append(&path, &line[..2]);
        assert!(tail.read_new_lines().unwrap().is_empty());

        append(&path, &line[2..]);
        assert_eq!(tail.read_new_lines().unwrap(), vec!["看10号"]);
    }

    #[test]
    fn test_crlf_bom_and_blank_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("log.txt");
        std::fs::write(&path, "\u{feff}first\r\n\r\nsecond\r\n".as_bytes()).unwrap();

        let mut tail = LineTail::from_start(&path);
        assert_eq!(tail.read_new_lines().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("log.txt");
        std::fs::write(&path, b"ok \xff\n").unwrap();

        let mut tail = LineTail::from_start(&path);
        assert_eq!(tail.read_new_lines().unwrap(), vec!["ok \u{fffd}"]);
    }

    #[test]
    fn test_truncation_restarts() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("log.txt");
        std::fs::write(&path, "one\ntwo\n").unwrap();
        let mut tail = LineTail::open_at_end(&path).unwrap();

        std::fs::write(&path, "new\n").unwrap();
        assert_eq!(tail.read_new_lines().unwrap(), vec!["new"]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let mut tail = LineTail::from_start(&temp.path().join("gone.txt"));
        assert!(tail.read_new_lines().is_err());
    }
}

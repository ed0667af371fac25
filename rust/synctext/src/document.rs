//! Document file I/O.
//!
//! The document is an ordered sequence of byte lines (UTF-8 by convention,
//! but nothing here requires it; columns and segments are byte-oriented
//! throughout). Trailing empty lines are dropped on both read and write so
//! that a final newline never shows up as a phantom diff.

use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// One document line, without its terminating newline.
pub type Line = Vec<u8>;

/// Seed content written when the document does not exist yet.
pub const INITIAL_DOC: &[u8] = b"int x = 10;\nint y = 20;\nint z = 30;\n";

/// Read the document into normalized lines.
pub fn read_lines(path: &Path) -> io::Result<Vec<Line>> {
    let raw = fs::read(path)?;
    let mut lines: Vec<Line> = raw.split(|&b| b == b'\n').map(<[u8]>::to_vec).collect();
    normalize(&mut lines);
    Ok(lines)
}

/// Write lines back, LF-terminated, truncating the file.
///
/// Each peer owns its own document file, so a plain truncating write is
/// race-free with respect to other peers.
pub fn write_lines(path: &Path, lines: &[Line]) -> io::Result<()> {
    let mut out = Vec::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    fs::write(path, out)
}

/// Drop trailing empty lines.
pub fn normalize(lines: &mut Vec<Line>) {
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
}

/// Create the document with seed content if it does not exist.
pub fn ensure_initial(path: &Path) -> io::Result<()> {
    if path.exists() {
        return Ok(());
    }
    fs::write(path, INITIAL_DOC)
}

/// Modification timestamp of the document.
pub fn mtime(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_of(strs: &[&str]) -> Vec<Line> {
        strs.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn read_drops_trailing_empties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        fs::write(&path, "a\nb\n\n\n").unwrap();
        assert_eq!(read_lines(&path).unwrap(), lines_of(&["a", "b"]));
    }

    #[test]
    fn read_without_final_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        fs::write(&path, "a\nb").unwrap();
        assert_eq!(read_lines(&path).unwrap(), lines_of(&["a", "b"]));
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        let lines = lines_of(&["int x = 10;", "int y = 20;"]);
        write_lines(&path, &lines).unwrap();
        assert_eq!(read_lines(&path).unwrap(), lines);
        assert_eq!(fs::read(&path).unwrap(), b"int x = 10;\nint y = 20;\n");
    }

    #[test]
    fn empty_file_reads_as_no_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        fs::write(&path, "").unwrap();
        assert!(read_lines(&path).unwrap().is_empty());
    }

    #[test]
    fn ensure_initial_seeds_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        ensure_initial(&path).unwrap();
        assert_eq!(
            read_lines(&path).unwrap(),
            lines_of(&["int x = 10;", "int y = 20;", "int z = 30;"])
        );

        // An existing document is left alone.
        fs::write(&path, "edited\n").unwrap();
        ensure_initial(&path).unwrap();
        assert_eq!(read_lines(&path).unwrap(), lines_of(&["edited"]));
    }

    #[test]
    fn mtime_changes_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        fs::write(&path, "a\n").unwrap();
        let before = mtime(&path).unwrap();
        // Filesystems with coarse timestamps need a beat between writes.
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(&path, "b\n").unwrap();
        assert_ne!(before, mtime(&path).unwrap());
    }
}

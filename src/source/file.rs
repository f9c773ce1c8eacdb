//! Source files and the replay playlist

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncSeekExt, BufReader};

/// Buffered reader over one source file
pub type SourceReader = BufReader<File>;

/// One recorded log file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    path: PathBuf,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open for reading with the cursor at `offset`.
    ///
    /// Returns the reader and the file length.
    pub async fn open_at(&self, offset: u64) -> std::io::Result<(SourceReader, u64)> {
        let mut file = File::open(&self.path).await?;
        let len = file.metadata().await?.len();
        if offset > 0 {
            file.seek(SeekFrom::Start(offset.min(len))).await?;
        }
        Ok((BufReader::new(file), len))
    }
}

/// Entry handed out by [`Playlist::next_file`]
#[derive(Debug, Clone)]
pub struct PlaylistEntry {
    pub index: usize,
    pub file: SourceFile,
    /// Last file in the list, so finishing it completes a cycle
    pub is_last: bool,
}

/// Ordered list of source files, optionally wrapping at the end
#[derive(Debug, Clone)]
pub struct Playlist {
    files: Vec<SourceFile>,
    restart: bool,
    next: usize,
}

impl Playlist {
    pub fn new(files: Vec<SourceFile>, restart: bool) -> Self {
        Self {
            files,
            restart,
            next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Next file to replay, or `None` once the list is exhausted without restart
    pub fn next_file(&mut self) -> Option<PlaylistEntry> {
        if self.files.is_empty() {
            return None;
        }
        if self.next >= self.files.len() {
            if !self.restart {
                return None;
            }
            self.next = 0;
        }

        let index = self.next;
        self.next += 1;
        Some(PlaylistEntry {
            index,
            file: self.files[index].clone(),
            is_last: index + 1 == self.files.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tokio::io::AsyncReadExt;

    use super::*;

    fn playlist(n: usize, restart: bool) -> Playlist {
        let files = (0..n)
            .map(|i| SourceFile::new(format!("log{}.s7k", i)))
            .collect();
        Playlist::new(files, restart)
    }

    #[test]
    fn test_playlist_no_restart() {
        let mut list = playlist(2, false);

        let first = list.next_file().unwrap();
        assert_eq!(first.index, 0);
        assert!(!first.is_last);

        let second = list.next_file().unwrap();
        assert_eq!(second.index, 1);
        assert!(second.is_last);

        assert!(list.next_file().is_none());
        assert!(list.next_file().is_none());
    }

    #[test]
    fn test_playlist_restart_wraps() {
        let mut list = playlist(2, true);

        let order: Vec<usize> = (0..5).map(|_| list.next_file().unwrap().index).collect();
        assert_eq!(order, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_playlist_empty() {
        let mut list = playlist(0, true);
        assert!(list.is_empty());
        assert!(list.next_file().is_none());
    }

    #[test]
    fn test_single_file_is_last() {
        let mut list = playlist(1, true);
        assert!(list.next_file().unwrap().is_last);
        assert!(list.next_file().unwrap().is_last);
    }

    #[tokio::test]
    async fn test_open_at_offset() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        tmp.flush().unwrap();

        let source = SourceFile::new(tmp.path());
        let (mut reader, len) = source.open_at(4).await.unwrap();
        assert_eq!(len, 10);

        let mut rest = String::new();
        reader.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "456789");
    }

    #[tokio::test]
    async fn test_open_missing() {
        let source = SourceFile::new("/nonexistent/emu7k/input.s7k");
        assert!(source.open_at(0).await.is_err());
    }
}

//! Filesystem chunk storage.
//!
//! Downloads are assembled in a `<path>.part` sibling and renamed into place
//! when the last chunk has been written, so a partially downloaded file never
//! appears under its final name. Shared files are read in place.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use swarmshare_transfer::{ChunkReader, ChunkWriter};

/// Suffix appended to the destination path while a download is in progress.
const PART_SUFFIX: &str = ".part";

/// Path of the in-progress file for `path`.
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// Blocking chunk store over the local filesystem.
///
/// Holds no open handles between calls, so it is cheap to clone one store per
/// manager.
///
/// # Note
/// Every call performs blocking `std::fs` I/O, `sync_all` included, on the
/// thread of the service task that drives the engine. Each call touches at most
/// one chunk, so the stall is bounded by a single chunk write or read plus the
/// final sync of a completed download.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsChunkStore;

impl FsChunkStore {
    pub fn new() -> Self {
        Self
    }
}

impl ChunkWriter for FsChunkStore {
    fn write(&mut self, path: &Path, offset: u64, data: &[u8]) -> io::Result<()> {
        let part = part_path(path);
        if let Some(parent) = part.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&part)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn close(&mut self, path: &Path) -> io::Result<()> {
        let part = part_path(path);
        if !part.exists() {
            // Nothing was ever written, e.g. an empty file.
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            File::create(path)?;
            return Ok(());
        }
        File::open(&part)?.sync_all()?;
        fs::rename(&part, path)?;
        tracing::debug!(path = %path.display(), "storage: download finalized");
        Ok(())
    }
}

impl ChunkReader for FsChunkStore {
    fn read(&mut self, path: &Path, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/data/movie.mkv")),
            PathBuf::from("/data/movie.mkv.part")
        );
    }

    #[test]
    fn out_of_order_writes_assemble_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.bin");
        let mut store = FsChunkStore::new();

        store.write(&path, 4, b"5678").unwrap();
        store.write(&path, 0, b"1234").unwrap();
        store.write(&path, 8, b"9").unwrap();
        assert!(!path.exists());
        assert!(part_path(&path).exists());

        store.close(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"123456789");
        assert!(!part_path(&path).exists());
    }

    #[test]
    fn close_without_writes_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        FsChunkStore::new().close(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"");
    }

    #[test]
    fn read_at_offset_and_short_read_at_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.bin");
        fs::write(&path, b"abcdefghij").unwrap();
        let mut store = FsChunkStore::new();

        let mut buf = [0u8; 4];
        assert_eq!(store.read(&path, 2, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"cdef");

        let mut buf = [0u8; 8];
        assert_eq!(store.read(&path, 7, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"hij");

        assert_eq!(store.read(&path, 20, &mut buf).unwrap(), 0);
    }

    #[test]
    fn read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = [0u8; 4];
        let err = FsChunkStore::new()
            .read(&dir.path().join("gone"), 0, &mut buf)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}

//! Atomic replacement of configuration files.
//!
//! Writing directly over a configuration file risks leaving a truncated
//! file behind if the process dies mid-write. [`WriteFile`] writes to an
//! exclusively created temporary sibling instead and renames it over the
//! target on [`commit`](WriteFile::commit), so the target is either the
//! old content or the complete new content.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};

/// A file being written for atomic replacement of a target path.
#[derive(Debug)]
pub struct WriteFile {
    file: Option<File>,
    temp: Utf8PathBuf,
    target: Utf8PathBuf,
}

impl WriteFile {
    /// Opens a fresh temporary sibling of `target` for writing.
    pub fn create(target: impl AsRef<Utf8Path>) -> io::Result<WriteFile> {
        let target = target.as_ref().to_owned();
        let mut attempt = 0u32;
        loop {
            let temp = Utf8PathBuf::from(format!("{target}.tmp{attempt}"));
            match OpenOptions::new().write(true).create_new(true).open(&temp) {
                Ok(file) => {
                    return Ok(WriteFile {
                        file: Some(file),
                        temp,
                        target,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The path being written; the rename target of [`commit`](WriteFile::commit).
    pub fn target(&self) -> &Utf8Path {
        &self.target
    }

    /// Flushes the temporary file and renames it over the target.
    pub fn commit(mut self) -> io::Result<()> {
        let file = match self.file.take() {
            Some(file) => file,
            None => return Err(io::Error::new(io::ErrorKind::Other, "already closed")),
        };
        file.sync_all()?;
        drop(file);
        fs::rename(&self.temp, &self.target)
    }

    /// Discards the temporary file, leaving the target untouched.
    /// Dropping an uncommitted `WriteFile` has the same effect.
    pub fn cancel(self) {}
}

impl Write for WriteFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.file {
            Some(file) => file.write(buf),
            None => Err(io::Error::new(io::ErrorKind::Other, "already closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for WriteFile {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.temp);
        }
    }
}

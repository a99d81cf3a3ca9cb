//! Files open within a session, addressed by shell file-descriptor numbers.

use std::collections::HashMap;
use std::io::IsTerminal;
use std::os::fd::{AsFd, OwnedFd};
use std::process::Stdio;

use crate::error::{Error, ErrorKind};

/// A file open in a session context.
pub enum OpenFile {
    /// The process's original standard input.
    Stdin(std::io::Stdin),
    /// The process's original standard output.
    Stdout(std::io::Stdout),
    /// The process's original standard error.
    Stderr(std::io::Stderr),
    /// A regular file.
    File(std::fs::File),
    /// The read end of a pipe.
    PipeReader(os_pipe::PipeReader),
    /// The write end of a pipe.
    PipeWriter(os_pipe::PipeWriter),
}

impl Clone for OpenFile {
    fn clone(&self) -> Self {
        #[allow(clippy::unwrap_used)]
        self.try_dup().unwrap()
    }
}

impl std::fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Stdin(_) => "stdin",
            Self::Stdout(_) => "stdout",
            Self::Stderr(_) => "stderr",
            Self::File(_) => "file",
            Self::PipeReader(_) => "pipe-reader",
            Self::PipeWriter(_) => "pipe-writer",
        };
        write!(f, "OpenFile({kind})")
    }
}

impl OpenFile {
    /// Duplicates the open file.
    pub fn try_dup(&self) -> Result<Self, Error> {
        let duped = match self {
            Self::Stdin(_) => Self::Stdin(std::io::stdin()),
            Self::Stdout(_) => Self::Stdout(std::io::stdout()),
            Self::Stderr(_) => Self::Stderr(std::io::stderr()),
            Self::File(f) => Self::File(f.try_clone()?),
            Self::PipeReader(r) => Self::PipeReader(r.try_clone()?),
            Self::PipeWriter(w) => Self::PipeWriter(w.try_clone()?),
        };

        Ok(duped)
    }

    /// Converts the open file into an owned OS file descriptor.
    pub(crate) fn into_owned_fd(self) -> Result<OwnedFd, Error> {
        match self {
            Self::Stdin(f) => Ok(f.as_fd().try_clone_to_owned()?),
            Self::Stdout(f) => Ok(f.as_fd().try_clone_to_owned()?),
            Self::Stderr(f) => Ok(f.as_fd().try_clone_to_owned()?),
            Self::File(f) => Ok(f.into()),
            Self::PipeReader(r) => Ok(OwnedFd::from(r)),
            Self::PipeWriter(w) => Ok(OwnedFd::from(w)),
        }
    }

    /// Returns whether the file refers to a terminal.
    pub(crate) fn is_terminal(&self) -> bool {
        match self {
            Self::Stdin(f) => f.is_terminal(),
            Self::Stdout(f) => f.is_terminal(),
            Self::Stderr(f) => f.is_terminal(),
            Self::File(f) => f.is_terminal(),
            Self::PipeReader(_) | Self::PipeWriter(_) => false,
        }
    }
}

impl AsFd for OpenFile {
    fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
        match self {
            Self::Stdin(f) => f.as_fd(),
            Self::Stdout(f) => f.as_fd(),
            Self::Stderr(f) => f.as_fd(),
            Self::File(f) => f.as_fd(),
            Self::PipeReader(r) => r.as_fd(),
            Self::PipeWriter(w) => w.as_fd(),
        }
    }
}

impl From<std::fs::File> for OpenFile {
    fn from(file: std::fs::File) -> Self {
        Self::File(file)
    }
}

impl From<os_pipe::PipeReader> for OpenFile {
    fn from(reader: os_pipe::PipeReader) -> Self {
        Self::PipeReader(reader)
    }
}

impl From<os_pipe::PipeWriter> for OpenFile {
    fn from(writer: os_pipe::PipeWriter) -> Self {
        Self::PipeWriter(writer)
    }
}

impl From<OpenFile> for Stdio {
    fn from(open_file: OpenFile) -> Self {
        match open_file {
            OpenFile::Stdin(_) | OpenFile::Stdout(_) | OpenFile::Stderr(_) => Self::inherit(),
            OpenFile::File(f) => f.into(),
            OpenFile::PipeReader(r) => r.into(),
            OpenFile::PipeWriter(w) => w.into(),
        }
    }
}

impl std::io::Read for OpenFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Stdin(f) => f.read(buf),
            Self::File(f) => f.read(buf),
            Self::PipeReader(r) => r.read(buf),
            Self::Stdout(_) | Self::Stderr(_) | Self::PipeWriter(_) => {
                Err(std::io::Error::other("not readable"))
            }
        }
    }
}

impl std::io::Write for OpenFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Stdout(f) => f.write(buf),
            Self::Stderr(f) => f.write(buf),
            Self::File(f) => f.write(buf),
            Self::PipeWriter(w) => w.write(buf),
            Self::Stdin(_) | Self::PipeReader(_) => {
                Err(std::io::Error::other("not writable"))
            }
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(f) => f.flush(),
            Self::Stderr(f) => f.flush(),
            Self::File(f) => f.flush(),
            Self::PipeWriter(w) => w.flush(),
            Self::Stdin(_) | Self::PipeReader(_) => Ok(()),
        }
    }
}

/// The FD table of a session or command context.
#[derive(Clone, Debug)]
pub struct OpenFiles {
    files: HashMap<u32, OpenFile>,
}

impl Default for OpenFiles {
    fn default() -> Self {
        Self {
            files: HashMap::from([
                (Self::STDIN_FD, OpenFile::Stdin(std::io::stdin())),
                (Self::STDOUT_FD, OpenFile::Stdout(std::io::stdout())),
                (Self::STDERR_FD, OpenFile::Stderr(std::io::stderr())),
            ]),
        }
    }
}

impl OpenFiles {
    /// Standard input.
    pub const STDIN_FD: u32 = 0;
    /// Standard output.
    pub const STDOUT_FD: u32 = 1;
    /// Standard error.
    pub const STDERR_FD: u32 = 2;

    /// Returns a new FD table seeded with the process's stdio.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an empty FD table.
    pub fn empty() -> Self {
        Self {
            files: HashMap::new(),
        }
    }

    /// Duplicates the table, duplicating each open file.
    pub fn try_clone(&self) -> Result<Self, Error> {
        let mut files = HashMap::new();
        for (fd, file) in &self.files {
            files.insert(*fd, file.try_dup()?);
        }
        Ok(Self { files })
    }

    /// Looks up the file at the given descriptor.
    pub fn get(&self, fd: u32) -> Option<&OpenFile> {
        self.files.get(&fd)
    }

    /// Returns a duplicate of the file at the given descriptor.
    pub fn dup_fd(&self, fd: u32) -> Result<OpenFile, Error> {
        self.files
            .get(&fd)
            .ok_or_else(|| Error::from(ErrorKind::BadFileDescriptor(fd)))?
            .try_dup()
    }

    /// Returns whether the descriptor is in use.
    pub fn contains(&self, fd: u32) -> bool {
        self.files.contains_key(&fd)
    }

    /// Installs a file at the given descriptor, returning any prior file.
    pub fn set(&mut self, fd: u32, file: OpenFile) -> Option<OpenFile> {
        self.files.insert(fd, file)
    }

    /// Removes (closes) the file at the given descriptor.
    pub fn remove(&mut self, fd: u32) -> Option<OpenFile> {
        self.files.remove(&fd)
    }

    /// Iterates over all (fd, file) entries.
    pub fn iter(&self) -> impl Iterator<Item = (&u32, &OpenFile)> {
        self.files.iter()
    }

    /// Returns the lowest unused descriptor at or above `min`.
    pub fn first_unused_fd(&self, min: u32) -> u32 {
        let mut fd = min;
        while self.files.contains_key(&fd) {
            fd += 1;
        }
        fd
    }
}

impl IntoIterator for OpenFiles {
    type Item = (u32, OpenFile);
    type IntoIter = <HashMap<u32, OpenFile> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

/// Creates a new OS pipe.
pub fn pipe() -> Result<(os_pipe::PipeReader, os_pipe::PipeWriter), Error> {
    Ok(os_pipe::pipe()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn pipe_round_trip() {
        let (mut reader, mut writer) = pipe().unwrap();
        writer.write_all(b"hello").unwrap();
        drop(writer);

        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hello");
    }

    #[test]
    fn fd_table_basics() {
        let mut files = OpenFiles::new();
        assert!(files.contains(0));
        assert!(files.contains(1));
        assert!(files.contains(2));

        assert_eq!(files.first_unused_fd(0), 3);
        assert_eq!(files.first_unused_fd(10), 10);

        files.remove(1);
        assert!(!files.contains(1));
        assert!(files.dup_fd(1).is_err());
    }
}

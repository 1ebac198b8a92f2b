use std::fmt;
use std::fs::{FileType, Metadata};
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Pipe,
    Socket,
    Other,
}

impl FileKind {
    pub fn from_file_type(file_type: FileType) -> Self {
        if file_type.is_symlink() {
            return Self::Symlink;
        }
        if file_type.is_file() {
            return Self::Regular;
        }
        if file_type.is_dir() {
            return Self::Directory;
        }
        special_kind(file_type)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Regular => "regular file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Pipe => "named pipe",
            Self::Socket => "socket",
            Self::Other => "special file",
        };
        f.write_str(text)
    }
}

#[cfg(unix)]
fn special_kind(file_type: FileType) -> FileKind {
    use std::os::unix::fs::FileTypeExt;

    if file_type.is_fifo() {
        FileKind::Pipe
    } else if file_type.is_socket() {
        FileKind::Socket
    } else {
        FileKind::Other
    }
}

#[cfg(not(unix))]
fn special_kind(_file_type: FileType) -> FileKind {
    FileKind::Other
}

/// Stat `path`, following symlinks when asked. A missing path is `Ok(None)`.
pub fn probe(path: &Path, follow_symlinks: bool) -> io::Result<Option<Metadata>> {
    let result = if follow_symlinks {
        std::fs::metadata(path)
    } else {
        std::fs::symlink_metadata(path)
    };
    match result {
        Ok(metadata) => Ok(Some(metadata)),
        Err(err) if is_missing(&err) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Classify `path`. `Ok(None)` means nothing exists there (or, when following,
/// the link is dangling).
pub fn classify(path: impl AsRef<Path>, follow_symlinks: bool) -> io::Result<Option<FileKind>> {
    Ok(probe(path.as_ref(), follow_symlinks)?
        .map(|metadata| FileKind::from_file_type(metadata.file_type())))
}

fn is_missing(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::NotFound {
        return true;
    }
    // ENOTDIR: a parent component is a regular file, so nothing can exist below it.
    #[cfg(unix)]
    if err.raw_os_error() == Some(20) {
        return true;
    }
    false
}

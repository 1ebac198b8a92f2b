//! Assertions about what exists on the filesystem.
//!
//! The `assert_*` functions panic with a descriptive message, for use directly
//! in tests. [`PathCheck`] exposes the same checks as `Result`s and lets the
//! caller choose whether symlinks are followed and what the failure says.

use crate::error::{AssertionFailure, OrPanic};
use crate::stat_probe::{self, FileKind};
use std::fs::Metadata;
use std::path::Path;

type CheckResult = Result<(), AssertionFailure>;

#[derive(Debug, Clone)]
pub struct PathCheck<'a> {
    path: &'a Path,
    follow_symlinks: Option<bool>,
    message: Option<String>,
}

impl<'a> PathCheck<'a> {
    pub fn new(path: &'a Path) -> Self {
        Self {
            path,
            follow_symlinks: None,
            message: None,
        }
    }

    /// File, directory and existence checks follow symlinks unless told not
    /// to. Pipe and socket checks look at the path itself unless told to
    /// follow. Symlink checks never follow.
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = Some(follow);
        self
    }

    /// Replace the default failure message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn exists(&self) -> CheckResult {
        self.stat(self.follow_or(true)).map(|_| ())
    }

    pub fn not_exists(&self) -> CheckResult {
        let present = matches!(stat_probe::probe(self.path, self.follow_or(true)), Ok(Some(_)));
        if present {
            return Err(self.fail(format!("Path exists: {:?}", self.path)));
        }
        Ok(())
    }

    pub fn is_file(&self) -> CheckResult {
        self.is_kind(FileKind::Regular, self.follow_or(true), "a regular file")
    }

    pub fn not_is_file(&self) -> CheckResult {
        self.not_is_kind(FileKind::Regular, self.follow_or(true), "a regular file")
    }

    pub fn is_dir(&self) -> CheckResult {
        self.is_kind(FileKind::Directory, self.follow_or(true), "a directory")
    }

    pub fn not_is_dir(&self) -> CheckResult {
        self.not_is_kind(FileKind::Directory, self.follow_or(true), "a directory")
    }

    /// Check that the path is a symlink and, if `to` is given, that its
    /// immediate target is exactly `to`. Targets are compared as raw strings:
    /// `../a` and `/abs/a` are different targets even if they resolve to the
    /// same file.
    pub fn is_link(&self, to: Option<&Path>) -> CheckResult {
        self.is_kind(FileKind::Symlink, false, "a symlink")?;
        let Some(expected) = to else {
            return Ok(());
        };
        let actual = std::fs::read_link(self.path).map_err(|err| {
            self.fail(format!(
                "Could not read symlink target of {:?}: {err}",
                self.path
            ))
        })?;
        if actual.as_os_str() != expected.as_os_str() {
            return Err(self.fail(format!(
                "Symlink target of:\n  {}\nExpected:\n  {}\nActual:\n  {}\n",
                self.path.display(),
                expected.display(),
                actual.display()
            )));
        }
        Ok(())
    }

    pub fn not_is_link(&self) -> CheckResult {
        self.not_is_kind(FileKind::Symlink, false, "a symlink")
    }

    pub fn is_pipe(&self) -> CheckResult {
        self.is_kind(FileKind::Pipe, self.follow_or(false), "a named pipe")
    }

    pub fn not_is_pipe(&self) -> CheckResult {
        self.not_is_kind(FileKind::Pipe, self.follow_or(false), "a named pipe")
    }

    pub fn is_socket(&self) -> CheckResult {
        self.is_kind(FileKind::Socket, self.follow_or(false), "a socket")
    }

    pub fn not_is_socket(&self) -> CheckResult {
        self.not_is_kind(FileKind::Socket, self.follow_or(false), "a socket")
    }

    fn follow_or(&self, default: bool) -> bool {
        self.follow_symlinks.unwrap_or(default)
    }

    fn is_kind(&self, kind: FileKind, follow: bool, noun: &str) -> CheckResult {
        let metadata = self.stat(follow)?;
        if FileKind::from_file_type(metadata.file_type()) != kind {
            return Err(self.fail(format!(
                "Path exists, but is not {noun}: {:?}",
                self.path
            )));
        }
        Ok(())
    }

    fn not_is_kind(&self, kind: FileKind, follow: bool, noun: &str) -> CheckResult {
        let metadata = self.stat(follow)?;
        if FileKind::from_file_type(metadata.file_type()) == kind {
            return Err(self.fail(format!("Path is {noun}: {:?}", self.path)));
        }
        Ok(())
    }

    fn stat(&self, follow: bool) -> Result<Metadata, AssertionFailure> {
        match stat_probe::probe(self.path, follow) {
            Ok(Some(metadata)) => Ok(metadata),
            Ok(None) | Err(_) => Err(self.fail(format!(
                "Path does not exist, or can't be stat-ed: {:?}",
                self.path
            ))),
        }
    }

    fn fail(&self, default_message: String) -> AssertionFailure {
        AssertionFailure::new(self.message.clone().unwrap_or(default_message))
    }
}

#[track_caller]
pub fn assert_path_exists(path: impl AsRef<Path>) {
    PathCheck::new(path.as_ref()).exists().or_panic();
}

#[track_caller]
pub fn assert_not_path_exists(path: impl AsRef<Path>) {
    PathCheck::new(path.as_ref()).not_exists().or_panic();
}

/// Passes for a symlink to a regular file; use [`PathCheck::follow_symlinks`]
/// to require the path itself to be the file.
#[track_caller]
pub fn assert_isfile(path: impl AsRef<Path>) {
    PathCheck::new(path.as_ref()).is_file().or_panic();
}

#[track_caller]
pub fn assert_not_isfile(path: impl AsRef<Path>) {
    PathCheck::new(path.as_ref()).not_is_file().or_panic();
}

#[track_caller]
pub fn assert_isdir(path: impl AsRef<Path>) {
    PathCheck::new(path.as_ref()).is_dir().or_panic();
}

#[track_caller]
pub fn assert_not_isdir(path: impl AsRef<Path>) {
    PathCheck::new(path.as_ref()).not_is_dir().or_panic();
}

#[track_caller]
pub fn assert_islink(path: impl AsRef<Path>) {
    PathCheck::new(path.as_ref()).is_link(None).or_panic();
}

#[track_caller]
pub fn assert_islink_to(path: impl AsRef<Path>, to: impl AsRef<Path>) {
    PathCheck::new(path.as_ref())
        .is_link(Some(to.as_ref()))
        .or_panic();
}

#[track_caller]
pub fn assert_not_islink(path: impl AsRef<Path>) {
    PathCheck::new(path.as_ref()).not_is_link().or_panic();
}

#[track_caller]
pub fn assert_ispipe(path: impl AsRef<Path>) {
    PathCheck::new(path.as_ref()).is_pipe().or_panic();
}

#[track_caller]
pub fn assert_not_ispipe(path: impl AsRef<Path>) {
    PathCheck::new(path.as_ref()).not_is_pipe().or_panic();
}

#[track_caller]
pub fn assert_issocket(path: impl AsRef<Path>) {
    PathCheck::new(path.as_ref()).is_socket().or_panic();
}

#[track_caller]
pub fn assert_not_issocket(path: impl AsRef<Path>) {
    PathCheck::new(path.as_ref()).not_is_socket().or_panic();
}

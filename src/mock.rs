//! Mocking a command by placing a stub ahead of it on `PATH`.
//!
//! ```no_run
//! use testpath::MockCommand;
//! use std::process::Command;
//!
//! let git = MockCommand::new("git");
//! {
//!     let _active = git.activate().expect("activate mock");
//!     Command::new("git").arg("status").status().expect("run git");
//! }
//! let calls = git.get_calls().expect("read calls");
//! assert_eq!(calls[0].args(), ["status"]);
//! ```

use crate::calls::verify_calls;
use crate::command_name::validate_command_name;
use crate::error::{Error, OrPanic, Result};
use crate::record::{self, InvocationRecord};
use crate::registry::CommandRegistry;
use crate::search_path;
use crate::stub::{self, Platform, StubContent, StubContext, StubFiles};
use std::cell::{Cell, RefCell};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockState {
    Inactive,
    Active,
    Finished,
}

#[derive(Debug)]
enum Lifecycle {
    Inactive,
    Active(Activation),
    Finished,
}

#[derive(Debug)]
struct Activation {
    files: StubFiles,
    command_dir: PathBuf,
}

impl Activation {
    fn paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.files.stub.as_path())
            .chain(self.files.launcher.as_ref().map(|(path, _)| path.as_path()))
    }
}

/// A command to be replaced by a stub while active.
///
/// Each instance goes through `Inactive -> Active -> Finished` once. Dropping
/// an active instance deactivates it.
#[derive(Debug)]
pub struct MockCommand<'r> {
    name: String,
    content: StubContent,
    registry: &'r CommandRegistry,
    state: RefCell<Lifecycle>,
    record_offset: Cell<Option<u64>>,
}

impl MockCommand<'static> {
    /// Record every call to `name` in the global registry.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_parts(name, StubContent::Recording, CommandRegistry::global())
    }

    /// Print `output` verbatim and exit 0, ignoring arguments.
    pub fn fixed_output(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self::from_parts(
            name,
            StubContent::FixedOutput(output.into()),
            CommandRegistry::global(),
        )
    }

    /// Use `script` as the stub. It should start with a `#!` line.
    pub fn with_content(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self::from_parts(
            name,
            StubContent::Custom(script.into()),
            CommandRegistry::global(),
        )
    }
}

impl<'r> MockCommand<'r> {
    pub fn from_parts(
        name: impl Into<String>,
        content: StubContent,
        registry: &'r CommandRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            content,
            registry,
            state: RefCell::new(Lifecycle::Inactive),
            record_offset: Cell::new(None),
        }
    }

    /// Move a not yet activated mock to another registry.
    pub fn in_registry(self, registry: &CommandRegistry) -> MockCommand<'_> {
        MockCommand::from_parts(self.name.clone(), self.content.clone(), registry)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &StubContent {
        &self.content
    }

    pub fn registry(&self) -> &'r CommandRegistry {
        self.registry
    }

    pub fn state(&self) -> MockState {
        match &*self.state.borrow() {
            Lifecycle::Inactive => MockState::Inactive,
            Lifecycle::Active(_) => MockState::Active,
            Lifecycle::Finished => MockState::Finished,
        }
    }

    /// Install the stub and put the command directory at the head of `PATH`.
    ///
    /// Fails with [`Error::AlreadyMocked`] if a stub for this name already
    /// exists; in that case nothing is changed.
    pub fn open(&self) -> Result<()> {
        if self.state() != MockState::Inactive {
            return Err(self.inactive());
        }
        validate_command_name(&self.name).map_err(|violation| Error::InvalidCommandName {
            name: self.name.clone(),
            violation,
        })?;

        let _guard = self.registry.lock_activation();
        let dirs = self.registry.dirs()?;
        let platform = Platform::current();
        let stub_path = stub::stub_path(platform, &dirs.command_dir, &self.name);
        let launcher_path = stub::launcher_path(platform, &dirs.command_dir, &self.name);
        for path in std::iter::once(&stub_path).chain(launcher_path.as_ref()) {
            if path.symlink_metadata().is_ok() {
                return Err(self.already_mocked(path));
            }
        }

        let interpreter = if self.content.needs_interpreter(platform) {
            Some(self.registry.interpreter()?)
        } else {
            None
        };
        let files = stub::render(
            platform,
            &self.name,
            &self.content,
            &StubContext {
                command_dir: &dirs.command_dir,
                recording_dir: &dirs.recording_dir,
                interpreter: interpreter.as_deref(),
            },
        );
        let record_file = record::record_file(&dirs.recording_dir, &self.name);
        let offset = if self.content.writes_records() {
            record::record_file_len(&record_file)?
        } else {
            0
        };

        let activation = Activation {
            files,
            command_dir: dirs.command_dir,
        };
        self.write_stub_files(&activation)?;
        if let Err(err) = search_path::prepend_dir(&activation.command_dir) {
            remove_stub_files(&activation);
            return Err(Error::io(
                "add to PATH",
                &activation.command_dir,
                io::Error::other(err),
            ));
        }

        tracing::debug!(
            command = %self.name,
            stub = %activation.files.stub.display(),
            "activated mock command"
        );
        self.record_offset.set(Some(offset));
        *self.state.borrow_mut() = Lifecycle::Active(activation);
        Ok(())
    }

    /// Remove the stub. Once no stubs remain in the command directory, the
    /// directory is taken off `PATH` again.
    pub fn close(&self) -> Result<()> {
        let activation = match self.state.replace(Lifecycle::Finished) {
            Lifecycle::Active(activation) => activation,
            other => {
                *self.state.borrow_mut() = other;
                return Err(self.inactive());
            }
        };

        let _guard = self.registry.lock_activation();
        let mut first_error = remove_stub_files(&activation);
        match dir_has_entries(&activation.command_dir) {
            Ok(true) => {}
            Ok(false) => {
                if let Err(err) = search_path::remove_dir(&activation.command_dir) {
                    first_error.get_or_insert(Error::io(
                        "remove from PATH",
                        &activation.command_dir,
                        io::Error::other(err),
                    ));
                }
            }
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
        tracing::debug!(command = %self.name, "deactivated mock command");
        first_error.map_or(Ok(()), Err)
    }

    /// Activate and return a guard that deactivates when dropped.
    pub fn activate(&self) -> Result<ActiveMock<'_>> {
        self.open()?;
        let stub = self.stub_path().unwrap_or_default();
        let launcher = self.launcher_path();
        Ok(ActiveMock {
            mock: self,
            stub,
            launcher,
            closed: false,
        })
    }

    /// Run `body` with the mock active. The mock is deactivated even if
    /// `body` panics.
    pub fn scope<T>(&self, body: impl FnOnce(&ActiveMock<'_>) -> T) -> Result<T> {
        let active = self.activate()?;
        let value = body(&active);
        active.close()?;
        Ok(value)
    }

    pub fn stub_path(&self) -> Option<PathBuf> {
        match &*self.state.borrow() {
            Lifecycle::Active(activation) => Some(activation.files.stub.clone()),
            _ => None,
        }
    }

    pub fn launcher_path(&self) -> Option<PathBuf> {
        match &*self.state.borrow() {
            Lifecycle::Active(activation) => activation
                .files
                .launcher
                .as_ref()
                .map(|(path, _)| path.clone()),
            _ => None,
        }
    }

    /// Calls made to this mock since it was activated, in order.
    ///
    /// Only recording stubs write records; for other content this is always
    /// empty.
    pub fn get_calls(&self) -> Result<Vec<InvocationRecord>> {
        if !self.content.writes_records() {
            return Ok(Vec::new());
        }
        let (Some(offset), Some(dirs)) = (self.record_offset.get(), self.registry.existing_dirs())
        else {
            return Ok(Vec::new());
        };
        let path = record::record_file(&dirs.recording_dir, &self.name);
        record::read_records_from(&path, offset)
    }

    /// Check that the mock was called, and with exactly `args` (after the
    /// command name) at least once if given.
    pub fn check_called(&self, args: Option<&[&str]>) -> Result<()> {
        let calls = self.get_calls()?;
        verify_calls(&self.name, &calls, args)?;
        Ok(())
    }

    #[track_caller]
    pub fn assert_called(&self, args: Option<&[&str]>) {
        self.check_called(args).or_panic();
    }

    fn write_stub_files(&self, activation: &Activation) -> Result<()> {
        let files = &activation.files;
        let launcher = files
            .launcher
            .as_ref()
            .map(|(path, body)| (path.as_path(), body.as_str()));
        for (path, body) in std::iter::once((files.stub.as_path(), files.stub_body.as_str()))
            .chain(launcher)
        {
            if let Err(err) = self.write_new_file(path, body) {
                remove_stub_files(activation);
                return Err(err);
            }
        }
        Ok(())
    }

    fn write_new_file(&self, path: &Path, body: &str) -> Result<()> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(self.already_mocked(path));
            }
            Err(err) => return Err(Error::io("create stub", path, err)),
        };
        file.write_all(body.as_bytes())
            .map_err(|err| Error::io("write stub", path, err))?;
        drop(file);
        make_executable(path)
    }

    fn already_mocked(&self, path: &Path) -> Error {
        Error::AlreadyMocked {
            name: self.name.clone(),
            path: path.to_path_buf(),
        }
    }

    fn inactive(&self) -> Error {
        Error::Inactive {
            name: self.name.clone(),
        }
    }
}

impl Drop for MockCommand<'_> {
    fn drop(&mut self) {
        if self.state() == MockState::Active {
            if let Err(err) = self.close() {
                tracing::error!(command = %self.name, error = %err, "failed to deactivate mock command");
            }
        }
    }
}

/// Guard returned by [`MockCommand::activate`].
#[derive(Debug)]
pub struct ActiveMock<'a> {
    mock: &'a MockCommand<'a>,
    stub: PathBuf,
    launcher: Option<PathBuf>,
    closed: bool,
}

impl<'a> ActiveMock<'a> {
    pub fn mock(&self) -> &'a MockCommand<'a> {
        self.mock
    }

    pub fn name(&self) -> &str {
        self.mock.name()
    }

    /// The file `PATH` lookup finds on Unix, or the payload file on Windows.
    pub fn stub_path(&self) -> &Path {
        &self.stub
    }

    /// The `.cmd` launcher on Windows.
    pub fn launcher_path(&self) -> Option<&Path> {
        self.launcher.as_deref()
    }

    pub fn get_calls(&self) -> Result<Vec<InvocationRecord>> {
        self.mock.get_calls()
    }

    pub fn check_called(&self, args: Option<&[&str]>) -> Result<()> {
        self.mock.check_called(args)
    }

    #[track_caller]
    pub fn assert_called(&self, args: Option<&[&str]>) {
        self.mock.assert_called(args);
    }

    /// Deactivate now, reporting cleanup errors instead of logging them.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.mock.close()
    }
}

impl Drop for ActiveMock<'_> {
    fn drop(&mut self) {
        if self.closed || self.mock.state() != MockState::Active {
            return;
        }
        if let Err(err) = self.mock.close() {
            tracing::error!(command = %self.mock.name(), error = %err, "failed to deactivate mock command");
        }
    }
}

/// Remove whatever stub files exist, returning the first failure.
fn remove_stub_files(activation: &Activation) -> Option<Error> {
    let mut first_error = None;
    for path in activation.paths() {
        match fs_err::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                first_error.get_or_insert(Error::io("remove stub", path, err));
            }
        }
    }
    first_error
}

fn dir_has_entries(dir: &Path) -> Result<bool> {
    let mut entries =
        fs_err::read_dir(dir).map_err(|err| Error::io("list command directory", dir, err))?;
    Ok(entries.next().is_some())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs_err::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|err| Error::io("make executable", path, err))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::registry::RegistryConfig;
    use crate::search_path::PATH_VAR;
    use crate::test_support::lock_env;
    use std::env;
    use tempfile::TempDir;

    fn registry(temp: &TempDir) -> CommandRegistry {
        CommandRegistry::with_config(
            RegistryConfig::default()
                .with_temp_root(temp.path())
                .with_interpreter(temp.path().join("missing-interpreter")),
        )
    }

    #[test]
    fn fixed_output_stub_is_written_and_removed() {
        let _guard = lock_env();
        let temp = TempDir::new().expect("tempdir");
        let registry = registry(&temp);
        let original_path = env::var_os(PATH_VAR);

        let mock = MockCommand::from_parts(
            "hello",
            StubContent::FixedOutput("hi".to_string()),
            &registry,
        );
        assert_eq!(mock.state(), MockState::Inactive);
        let active = mock.activate().expect("activate");
        let stub = active.stub_path().to_path_buf();
        assert!(stub.is_file());
        assert_eq!(mock.state(), MockState::Active);
        let command_dir = registry.command_dir().expect("command dir");
        assert!(search_path::is_head(&command_dir));

        active.close().expect("close");
        assert!(!stub.exists());
        assert_eq!(mock.state(), MockState::Finished);
        assert_eq!(env::var_os(PATH_VAR), original_path);
    }

    #[test]
    fn stub_is_executable() {
        use std::os::unix::fs::PermissionsExt;
        let _guard = lock_env();
        let temp = TempDir::new().expect("tempdir");
        let registry = registry(&temp);
        let mock = MockCommand::from_parts(
            "hello",
            StubContent::FixedOutput(String::new()),
            &registry,
        );
        let active = mock.activate().expect("activate");
        let mode = fs_err::metadata(active.stub_path())
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn second_activation_of_same_name_is_refused() {
        let _guard = lock_env();
        let temp = TempDir::new().expect("tempdir");
        let registry = registry(&temp);
        let first =
            MockCommand::from_parts("dup", StubContent::FixedOutput("1".into()), &registry);
        let second =
            MockCommand::from_parts("dup", StubContent::FixedOutput("2".into()), &registry);

        let active = first.activate().expect("first activation");
        let path_while_active = env::var_os(PATH_VAR);
        let err = second.activate().expect_err("second activation");
        assert!(err.is_already_mocked(), "{err}");
        assert_eq!(second.state(), MockState::Inactive);
        assert_eq!(env::var_os(PATH_VAR), path_while_active);
        assert_eq!(
            fs_err::read_to_string(active.stub_path()).expect("stub body"),
            stub::render(
                Platform::current(),
                "dup",
                first.content(),
                &StubContext {
                    command_dir: &registry.command_dir().expect("command dir"),
                    recording_dir: &registry.recording_dir().expect("recording dir"),
                    interpreter: None,
                },
            )
            .stub_body
        );
    }

    #[test]
    fn path_stays_until_last_stub_is_removed() {
        let _guard = lock_env();
        let temp = TempDir::new().expect("tempdir");
        let registry = registry(&temp);
        let original_path = env::var_os(PATH_VAR);
        let a = MockCommand::from_parts("aa", StubContent::FixedOutput("a".into()), &registry);
        let b = MockCommand::from_parts("bb", StubContent::FixedOutput("b".into()), &registry);

        a.open().expect("open a");
        b.open().expect("open b");
        let command_dir = registry.command_dir().expect("command dir");
        a.close().expect("close a");
        assert!(search_path::is_head(&command_dir));
        b.close().expect("close b");
        assert_eq!(env::var_os(PATH_VAR), original_path);
    }

    #[test]
    fn lifecycle_is_single_use() {
        let _guard = lock_env();
        let temp = TempDir::new().expect("tempdir");
        let registry = registry(&temp);
        let mock = MockCommand::from_parts("once", StubContent::FixedOutput("x".into()), &registry);

        assert!(matches!(mock.close(), Err(Error::Inactive { .. })));
        mock.open().expect("open");
        assert!(matches!(mock.open(), Err(Error::Inactive { .. })));
        mock.close().expect("close");
        assert!(matches!(mock.open(), Err(Error::Inactive { .. })));
        assert!(matches!(mock.close(), Err(Error::Inactive { .. })));
    }

    #[test]
    fn invalid_names_are_rejected_before_touching_anything() {
        let temp = TempDir::new().expect("tempdir");
        let registry = registry(&temp);
        for name in ["", "a/b", r"a\b", ".", "..", "g\0it"] {
            let mock = MockCommand::from_parts(name, StubContent::Recording, &registry);
            let err = mock.open().expect_err("invalid name");
            assert!(matches!(err, Error::InvalidCommandName { .. }), "{err}");
        }
        assert!(registry.existing_dirs().is_none());
    }

    #[test]
    fn recording_without_interpreter_fails_cleanly() {
        let _guard = lock_env();
        let temp = TempDir::new().expect("tempdir");
        let registry = registry(&temp);
        let original_path = env::var_os(PATH_VAR);
        let mock = MockCommand::from_parts("git", StubContent::Recording, &registry);

        let err = mock.open().expect_err("interpreter is missing");
        assert!(matches!(err, Error::InterpreterNotFound { .. }), "{err}");
        assert_eq!(mock.state(), MockState::Inactive);
        assert_eq!(env::var_os(PATH_VAR), original_path);
        let command_dir = registry.command_dir().expect("command dir");
        assert!(!dir_has_entries(&command_dir).expect("list"));
    }

    #[test]
    fn dropping_active_mock_cleans_up() {
        let _guard = lock_env();
        let temp = TempDir::new().expect("tempdir");
        let registry = registry(&temp);
        let original_path = env::var_os(PATH_VAR);
        let stub = {
            let mock =
                MockCommand::from_parts("dropme", StubContent::FixedOutput("x".into()), &registry);
            mock.open().expect("open");
            mock.stub_path().expect("stub path")
        };
        assert!(!stub.exists());
        assert_eq!(env::var_os(PATH_VAR), original_path);
    }

    #[test]
    fn non_recording_content_reports_no_calls() {
        let _guard = lock_env();
        let temp = TempDir::new().expect("tempdir");
        let registry = registry(&temp);
        let mock = MockCommand::from_parts(
            "quiet",
            StubContent::Custom("#!/bin/sh\nexit 0\n".into()),
            &registry,
        );
        let calls = mock.scope(|active| active.get_calls()).expect("scope");
        assert!(calls.expect("calls").is_empty());
        let err = mock.check_called(None).expect_err("not called");
        assert_eq!(err.to_string(), "Command \"quiet\" was not called");
    }

    #[test]
    fn get_calls_ignores_records_from_before_activation() {
        let _guard = lock_env();
        let temp = TempDir::new().expect("tempdir");
        let bin = temp.path().join("interp");
        crate::test_support::write_executable_script(&bin, "#!/bin/sh\nexit 0\n");
        let registry = CommandRegistry::with_config(
            RegistryConfig::default()
                .with_temp_root(temp.path())
                .with_interpreter(&bin),
        );
        let recording_dir = registry.recording_dir().expect("recording dir");
        let file = record::record_file(&recording_dir, "git");
        record::append_record(
            &file,
            &InvocationRecord {
                env: Default::default(),
                argv: vec!["git".into(), "stale".into()],
                cwd: PathBuf::from("/"),
            },
            false,
        )
        .expect("seed stale record");

        let mock = MockCommand::from_parts("git", StubContent::Recording, &registry);
        assert!(mock.get_calls().expect("calls before activation").is_empty());
        let active = mock.activate().expect("activate");
        assert!(active.get_calls().expect("calls").is_empty());
        record::append_record(
            &file,
            &InvocationRecord {
                env: Default::default(),
                argv: vec!["git".into(), "fresh".into()],
                cwd: PathBuf::from("/"),
            },
            false,
        )
        .expect("append fresh record");
        drop(active);

        let calls = mock.get_calls().expect("calls after deactivation");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args(), ["fresh"]);
        mock.assert_called(Some(&["fresh"]));
    }
}

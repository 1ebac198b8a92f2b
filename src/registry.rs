//! Where stubs and their invocation records live.
//!
//! A registry owns one command directory (prepended to `PATH` while any of
//! its stubs are active) and one recording directory. Both are created on
//! first use and kept for the life of the process, so that records stay
//! readable after a mock is deactivated.
//!
//! Activation edits the process-wide `PATH`. The registry serializes its own
//! activations, but nothing stops other threads from reading the environment
//! concurrently, so mocks are meant for single-threaded test bodies.

use crate::env_util;
use crate::error::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

/// File name of the interpreter binary, without platform suffix.
pub const STUB_BIN_NAME: &str = "testpath-stub";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Interpreter used by recording stubs. Resolved automatically if unset.
    pub interpreter: Option<PathBuf>,
    /// Parent for the lazily created directories. Defaults to the system
    /// temp dir.
    pub temp_root: Option<PathBuf>,
}

impl RegistryConfig {
    /// Configuration from `TESTPATH_STUB_BIN` and `TESTPATH_TMPDIR`.
    pub fn from_env() -> Self {
        Self {
            interpreter: env_util::stub_bin_override(),
            temp_root: env_util::temp_root_override(),
        }
    }

    pub fn with_interpreter(mut self, path: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(path.into());
        self
    }

    pub fn with_temp_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryDirs {
    pub command_dir: PathBuf,
    pub recording_dir: PathBuf,
}

#[derive(Debug)]
pub struct CommandRegistry {
    config: RegistryConfig,
    dirs: Mutex<Option<RegistryDirs>>,
    interpreter: Mutex<Option<PathBuf>>,
    activation: Mutex<()>,
}

static GLOBAL: OnceLock<CommandRegistry> = OnceLock::new();

impl CommandRegistry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            dirs: Mutex::new(None),
            interpreter: Mutex::new(None),
            activation: Mutex::new(()),
        }
    }

    /// Use fixed directories instead of fresh temporary ones. They are
    /// created on first use if missing. Relative paths are resolved against
    /// the working directory at that point.
    pub fn with_dirs(command_dir: impl Into<PathBuf>, recording_dir: impl Into<PathBuf>) -> Self {
        let registry = Self::new();
        *lock(&registry.dirs) = Some(RegistryDirs {
            command_dir: command_dir.into(),
            recording_dir: recording_dir.into(),
        });
        registry
    }

    /// The process-wide registry used by [`crate::MockCommand::new`],
    /// configured from the environment on first use.
    pub fn global() -> &'static CommandRegistry {
        GLOBAL.get_or_init(|| Self::with_config(RegistryConfig::from_env()))
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Both directories, creating them if needed.
    pub fn dirs(&self) -> Result<RegistryDirs> {
        let mut slot = lock(&self.dirs);
        match slot.as_ref() {
            Some(dirs) => {
                for dir in [&dirs.command_dir, &dirs.recording_dir] {
                    fs_err::create_dir_all(dir)
                        .map_err(|err| Error::io("create directory", dir, err))?;
                }
                let dirs = RegistryDirs {
                    command_dir: absolute(&dirs.command_dir)?,
                    recording_dir: absolute(&dirs.recording_dir)?,
                };
                *slot = Some(dirs.clone());
                Ok(dirs)
            }
            None => {
                let root = match &self.config.temp_root {
                    Some(root) => absolute(root)?,
                    None => env::temp_dir(),
                };
                let dirs = RegistryDirs {
                    command_dir: make_temp_dir(&root, "testpath-commands-")?,
                    recording_dir: make_temp_dir(&root, "testpath-records-")?,
                };
                tracing::debug!(
                    command_dir = %dirs.command_dir.display(),
                    recording_dir = %dirs.recording_dir.display(),
                    "created registry directories"
                );
                *slot = Some(dirs.clone());
                Ok(dirs)
            }
        }
    }

    /// The directories if they have been created, without creating them.
    pub fn existing_dirs(&self) -> Option<RegistryDirs> {
        lock(&self.dirs).clone()
    }

    pub fn command_dir(&self) -> Result<PathBuf> {
        Ok(self.dirs()?.command_dir)
    }

    pub fn recording_dir(&self) -> Result<PathBuf> {
        Ok(self.dirs()?.recording_dir)
    }

    /// Locate the `testpath-stub` binary.
    ///
    /// Tries the configured path, then `TESTPATH_STUB_BIN`, then
    /// `testpath-stub` beside the running executable or in its parent
    /// directory (the layout cargo uses for test binaries), then `PATH`. A
    /// successful lookup is cached.
    pub fn interpreter(&self) -> Result<PathBuf> {
        let mut cached = lock(&self.interpreter);
        if let Some(path) = cached.as_ref() {
            return Ok(path.clone());
        }
        let path = resolve_interpreter(&self.config)?;
        tracing::debug!(interpreter = %path.display(), "resolved stub interpreter");
        *cached = Some(path.clone());
        Ok(path)
    }

    /// Held across a mock's activation or deactivation.
    pub(crate) fn lock_activation(&self) -> MutexGuard<'_, ()> {
        lock(&self.activation)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Stubs embed these paths and run from whatever directory the caller
/// spawns them in, so nothing relative may reach them.
fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|err| Error::io("resolve", path, err))
}

fn make_temp_dir(root: &Path, prefix: &str) -> Result<PathBuf> {
    fs_err::create_dir_all(root).map_err(|err| Error::io("create directory", root, err))?;
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(root)
        .map_err(|err| Error::io("create temporary directory in", root, err))?;
    Ok(dir.keep())
}

fn interpreter_file_name() -> String {
    format!("{STUB_BIN_NAME}{}", env::consts::EXE_SUFFIX)
}

fn resolve_interpreter(config: &RegistryConfig) -> Result<PathBuf> {
    let explicit = config
        .interpreter
        .clone()
        .or_else(env_util::stub_bin_override);
    if let Some(path) = explicit {
        let path = absolute(&path)?;
        if path.is_file() {
            return Ok(path);
        }
        return Err(Error::InterpreterNotFound {
            searched: vec![path.display().to_string()],
        });
    }

    let file_name = interpreter_file_name();
    let mut searched = Vec::new();
    if let Ok(exe) = env::current_exe() {
        let beside = exe.parent();
        let above = beside.and_then(Path::parent);
        for dir in [beside, above].into_iter().flatten() {
            let candidate = dir.join(&file_name);
            if candidate.is_file() {
                return Ok(candidate);
            }
            searched.push(candidate.display().to_string());
        }
    }

    match which::which(STUB_BIN_NAME) {
        Ok(path) => Ok(path),
        Err(_) => {
            searched.push(format!("{STUB_BIN_NAME} on PATH"));
            Err(Error::InterpreterNotFound { searched })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env_util::{STUB_BIN_VAR, TMPDIR_VAR};
    use crate::test_support::{lock_env, write_executable_script};
    use tempfile::TempDir;

    #[test]
    fn directories_are_created_lazily_under_temp_root() {
        let temp = TempDir::new().expect("tempdir");
        let registry =
            CommandRegistry::with_config(RegistryConfig::default().with_temp_root(temp.path()));
        assert!(registry.existing_dirs().is_none());

        let dirs = registry.dirs().expect("dirs");
        assert!(dirs.command_dir.is_dir());
        assert!(dirs.recording_dir.is_dir());
        assert!(dirs.command_dir.starts_with(temp.path()));
        assert_ne!(dirs.command_dir, dirs.recording_dir);
        assert_eq!(registry.dirs().expect("dirs again"), dirs);
        assert_eq!(registry.existing_dirs(), Some(dirs));
    }

    #[test]
    fn fixed_directories_are_created_on_demand() {
        let temp = TempDir::new().expect("tempdir");
        let commands = temp.path().join("a/commands");
        let records = temp.path().join("b/records");
        let registry = CommandRegistry::with_dirs(&commands, &records);

        assert_eq!(registry.command_dir().expect("command dir"), commands);
        assert_eq!(registry.recording_dir().expect("recording dir"), records);
        assert!(commands.is_dir());
        assert!(records.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn relative_fixed_directories_are_stored_absolute() {
        let commands = PathBuf::from("target/testpath-registry-test/commands");
        let records = PathBuf::from("target/testpath-registry-test/records");
        let registry = CommandRegistry::with_dirs(&commands, &records);

        let dirs = registry.dirs().expect("dirs");
        let cwd = env::current_dir().expect("cwd");
        assert_eq!(dirs.command_dir, cwd.join(&commands));
        assert_eq!(dirs.recording_dir, cwd.join(&records));
        assert_eq!(registry.existing_dirs(), Some(dirs));
        fs_err::remove_dir_all(cwd.join("target/testpath-registry-test")).expect("clean up");
    }

    #[test]
    fn configured_interpreter_must_exist() {
        let temp = TempDir::new().expect("tempdir");
        let missing = temp.path().join("nope");
        let registry =
            CommandRegistry::with_config(RegistryConfig::default().with_interpreter(&missing));
        match registry.interpreter() {
            Err(Error::InterpreterNotFound { searched }) => {
                assert_eq!(searched, vec![missing.display().to_string()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn configured_interpreter_is_used_and_cached() {
        let temp = TempDir::new().expect("tempdir");
        let bin = temp.path().join(interpreter_file_name());
        write_executable_script(&bin, "#!/bin/sh\nexit 0\n");
        let registry =
            CommandRegistry::with_config(RegistryConfig::default().with_interpreter(&bin));
        assert_eq!(registry.interpreter().expect("interpreter"), bin);

        fs_err::remove_file(&bin).expect("remove interpreter");
        assert_eq!(registry.interpreter().expect("cached interpreter"), bin);
    }

    #[test]
    fn config_from_env_reads_overrides() {
        let _guard = lock_env();
        env::set_var(STUB_BIN_VAR, "/opt/testpath-stub");
        env::set_var(TMPDIR_VAR, "  ");
        let config = RegistryConfig::from_env();
        env::remove_var(STUB_BIN_VAR);
        env::remove_var(TMPDIR_VAR);

        assert_eq!(config.interpreter, Some(PathBuf::from("/opt/testpath-stub")));
        assert_eq!(config.temp_root, None);
    }
}

//! Edits to the command search path (`PATH`).

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const PATH_VAR: &str = "PATH";

/// Entries of `PATH`. An unset variable has no entries, while an empty one
/// has a single empty entry (the current directory).
fn entries(value: Option<OsString>) -> Vec<PathBuf> {
    value
        .map(|value| env::split_paths(&value).collect())
        .unwrap_or_default()
}

/// Write `entries` back. No entries only arises when `PATH` started unset,
/// so the variable is removed again.
fn store(entries: Vec<PathBuf>) -> Result<(), env::JoinPathsError> {
    if entries.is_empty() {
        env::remove_var(PATH_VAR);
        return Ok(());
    }
    let joined = env::join_paths(entries)?;
    env::set_var(PATH_VAR, joined);
    Ok(())
}

pub fn is_head(dir: &Path) -> bool {
    entries(env::var_os(PATH_VAR))
        .first()
        .is_some_and(|head| head == dir)
}

/// Put `dir` in front of every other entry unless it is already first.
/// Returns whether `PATH` changed.
pub fn prepend_dir(dir: &Path) -> Result<bool, env::JoinPathsError> {
    if is_head(dir) {
        return Ok(false);
    }
    let mut current = entries(env::var_os(PATH_VAR));
    current.insert(0, dir.to_path_buf());
    store(current)?;
    tracing::debug!(dir = %dir.display(), "prepended directory to PATH");
    Ok(true)
}

/// Remove the first occurrence of `dir`, keeping the other entries in order.
/// Returns whether `PATH` changed.
pub fn remove_dir(dir: &Path) -> Result<bool, env::JoinPathsError> {
    let mut current = entries(env::var_os(PATH_VAR));
    let Some(index) = current.iter().position(|entry| entry == dir) else {
        return Ok(false);
    };
    current.remove(index);
    store(current)?;
    tracing::debug!(dir = %dir.display(), "removed directory from PATH");
    Ok(true)
}

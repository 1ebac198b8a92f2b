//! `TESTPATH_*` variables that configure the crate and the stub binary.

use std::env;
use std::path::PathBuf;

/// Path of the `testpath-stub` interpreter.
pub const STUB_BIN_VAR: &str = "TESTPATH_STUB_BIN";
/// Parent directory for the registry's temporary directories.
pub const TMPDIR_VAR: &str = "TESTPATH_TMPDIR";
/// Set to a truthy value to append records without taking the file lock.
pub const NO_RECORD_LOCK_VAR: &str = "TESTPATH_NO_RECORD_LOCK";

pub(crate) fn stub_bin_override() -> Option<PathBuf> {
    path_var(STUB_BIN_VAR)
}

pub(crate) fn temp_root_override() -> Option<PathBuf> {
    path_var(TMPDIR_VAR)
}

pub(crate) fn record_lock_enabled() -> bool {
    !flag_var(NO_RECORD_LOCK_VAR)
}

fn flag_var(name: &str) -> bool {
    env::var(name).is_ok_and(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

/// Blank values count as unset.
fn path_var(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

//! Snapshot and restore process environment variables.
//!
//! All of this mutates process-wide state. Tests that use it concurrently
//! from several threads must serialise themselves.

use std::collections::HashSet;
use std::env;
use std::ffi::{OsStr, OsString};

/// Prior values of a set of environment variables.
///
/// `None` marks a variable that did not exist when the snapshot was taken.
/// A full snapshot additionally removes, on restore, any variable that was
/// created after it was taken.
#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    saved: Vec<(OsString, Option<OsString>)>,
    full: bool,
}

impl EnvSnapshot {
    pub fn capture<I, K>(names: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<OsStr>,
    {
        let mut seen = HashSet::new();
        let saved = names
            .into_iter()
            .filter(|name| seen.insert(name.as_ref().to_os_string()))
            .map(|name| {
                let name = name.as_ref().to_os_string();
                let prior = env::var_os(&name);
                (name, prior)
            })
            .collect();
        Self { saved, full: false }
    }

    pub fn capture_all() -> Self {
        let saved = env::vars_os().map(|(name, value)| (name, Some(value))).collect();
        Self { saved, full: true }
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn names(&self) -> impl Iterator<Item = &OsStr> {
        self.saved.iter().map(|(name, _)| name.as_os_str())
    }

    pub fn prior_value(&self, name: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.saved
            .iter()
            .find(|(saved, _)| saved.as_os_str() == name.as_ref())
            .and_then(|(_, value)| value.as_deref())
    }

    /// Names that were captured but did not exist at capture time.
    pub fn absent(&self) -> impl Iterator<Item = &OsStr> {
        self.saved
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name.as_os_str())
    }

    pub fn restore(self) {
        if self.full {
            let keep: HashSet<&OsStr> = self.names().collect();
            let added: Vec<OsString> = env::vars_os()
                .map(|(name, _)| name)
                .filter(|name| !keep.contains(name.as_os_str()))
                .collect();
            for name in added {
                env::remove_var(&name);
            }
        }
        for (name, value) in &self.saved {
            match value {
                Some(value) => env::set_var(name, value),
                None => env::remove_var(name),
            }
        }
        tracing::debug!(
            variables = self.saved.len(),
            full = self.full,
            "restored environment snapshot"
        );
    }
}

/// Replaces the whole environment until dropped.
#[must_use = "the previous environment is restored when this guard is dropped"]
#[derive(Debug)]
pub struct TemporaryEnv {
    snapshot: Option<EnvSnapshot>,
}

impl TemporaryEnv {
    pub fn install<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        let snapshot = EnvSnapshot::capture_all();
        let current: Vec<OsString> = env::vars_os().map(|(name, _)| name).collect();
        for name in current {
            env::remove_var(&name);
        }
        for (name, value) in vars {
            env::set_var(name, value);
        }
        Self {
            snapshot: Some(snapshot),
        }
    }

    pub fn restore(mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            snapshot.restore();
        }
    }
}

impl Drop for TemporaryEnv {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            snapshot.restore();
        }
    }
}

/// Run `body` with `vars` as the entire environment.
pub fn temporary_env<I, K, V, T>(vars: I, body: impl FnOnce() -> T) -> T
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<OsStr>,
    V: AsRef<OsStr>,
{
    let _guard = TemporaryEnv::install(vars);
    body()
}

/// Applies overrides on top of the current environment until dropped.
///
/// A `None` override removes the variable for the duration of the scope.
/// With `snapshot` the full environment is captured first and restored
/// exactly, so variables the scope creates are removed again. Without it only
/// the overridden names are put back.
#[must_use = "the previous environment is restored when this guard is dropped"]
#[derive(Debug)]
pub struct ModifiedEnv {
    snapshot: Option<EnvSnapshot>,
}

impl ModifiedEnv {
    pub fn apply<I, K, V>(overrides: I, snapshot: bool) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        let overrides: Vec<(K, Option<V>)> = overrides.into_iter().collect();
        let saved = if snapshot {
            EnvSnapshot::capture_all()
        } else {
            EnvSnapshot::capture(overrides.iter().map(|(name, _)| name.as_ref()))
        };
        for (name, value) in &overrides {
            match value {
                Some(value) => env::set_var(name, value),
                None => env::remove_var(name),
            }
        }
        Self {
            snapshot: Some(saved),
        }
    }

    pub fn restore(mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            snapshot.restore();
        }
    }
}

impl Drop for ModifiedEnv {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            snapshot.restore();
        }
    }
}

/// Run `body` with `overrides` applied on top of the current environment.
pub fn modified_env<I, K, V, T>(overrides: I, snapshot: bool, body: impl FnOnce() -> T) -> T
where
    I: IntoIterator<Item = (K, Option<V>)>,
    K: AsRef<OsStr>,
    V: AsRef<OsStr>,
{
    let _guard = ModifiedEnv::apply(overrides, snapshot);
    body()
}

/// Restores the environment captured by [`make_env_restorer`] when called.
#[derive(Debug)]
pub struct EnvRestorer {
    snapshot: EnvSnapshot,
}

impl EnvRestorer {
    pub fn restore(self) {
        self.snapshot.restore();
    }

    pub fn into_fn(self) -> impl FnOnce() {
        move || self.restore()
    }
}

/// Capture the full environment now; calling the result puts it back.
pub fn make_env_restorer() -> EnvRestorer {
    EnvRestorer {
        snapshot: EnvSnapshot::capture_all(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::lock_env;

    const NONE: Option<&str> = None;

    fn var(name: &str) -> Option<String> {
        env::var(name).ok()
    }

    #[test]
    fn partial_snapshot_restores_values_and_absence() {
        let _guard = lock_env();
        let restorer = make_env_restorer();
        env::set_var("TP_SNAP_A", "1");
        env::remove_var("TP_SNAP_B");

        let snapshot = EnvSnapshot::capture(["TP_SNAP_A", "TP_SNAP_B", "TP_SNAP_A"]);
        assert_eq!(snapshot.names().count(), 2);
        assert_eq!(
            snapshot.absent().collect::<Vec<_>>(),
            vec![OsStr::new("TP_SNAP_B")]
        );
        assert_eq!(snapshot.prior_value("TP_SNAP_A"), Some(OsStr::new("1")));

        env::set_var("TP_SNAP_A", "2");
        env::set_var("TP_SNAP_B", "new");
        env::set_var("TP_SNAP_C", "untracked");
        snapshot.restore();

        assert_eq!(var("TP_SNAP_A").as_deref(), Some("1"));
        assert_eq!(var("TP_SNAP_B"), None);
        assert_eq!(var("TP_SNAP_C").as_deref(), Some("untracked"));
        restorer.restore();
        assert_eq!(var("TP_SNAP_C"), None);
    }

    #[test]
    fn temporary_env_replaces_and_restores_everything() {
        let _guard = lock_env();
        let restorer = make_env_restorer();
        env::set_var("abc123", "4");
        env::set_var("def567", "8");

        temporary_env([("abc123", "9")], || {
            assert_eq!(var("abc123").as_deref(), Some("9"));
            assert_eq!(var("def567"), None);
            assert_eq!(env::vars_os().count(), 1);
            env::set_var("foo951", "bar");
        });

        assert_eq!(var("abc123").as_deref(), Some("4"));
        assert_eq!(var("def567").as_deref(), Some("8"));
        assert_eq!(var("foo951"), None);
        restorer.restore();
    }

    #[test]
    fn modified_env_with_snapshot_rolls_back_everything() {
        let _guard = lock_env();
        let restorer = make_env_restorer();
        env::set_var("abc123", "4");
        env::set_var("def567", "8");
        env::set_var("ghi789", "10");
        env::remove_var("foo951");

        modified_env([("abc123", Some("9")), ("def567", NONE)], true, || {
            assert_eq!(var("abc123").as_deref(), Some("9"));
            assert_eq!(var("def567"), None);
            assert_eq!(var("ghi789").as_deref(), Some("10"));
            env::set_var("foo951", "bar");
        });

        assert_eq!(var("abc123").as_deref(), Some("4"));
        assert_eq!(var("def567").as_deref(), Some("8"));
        assert_eq!(var("ghi789").as_deref(), Some("10"));
        assert_eq!(var("foo951"), None);
        restorer.restore();
    }

    #[test]
    fn modified_env_without_snapshot_restores_only_overrides() {
        let _guard = lock_env();
        let restorer = make_env_restorer();
        env::set_var("abc123", "4");
        env::set_var("def567", "8");
        env::set_var("ghi789", "10");
        env::remove_var("foo951");

        modified_env([("abc123", Some("9")), ("def567", NONE)], false, || {
            assert_eq!(var("abc123").as_deref(), Some("9"));
            assert_eq!(var("def567"), None);
            assert_eq!(var("ghi789").as_deref(), Some("10"));
            env::set_var("foo951", "bar");
        });

        assert_eq!(var("abc123").as_deref(), Some("4"));
        assert_eq!(var("def567").as_deref(), Some("8"));
        assert_eq!(var("ghi789").as_deref(), Some("10"));
        assert_eq!(var("foo951").as_deref(), Some("bar"));
        restorer.restore();
        assert_eq!(var("foo951"), None);
    }

    #[test]
    fn modified_env_restores_even_when_body_panics() {
        let _guard = lock_env();
        env::set_var("TP_PANIC_VAR", "before");

        let result = std::panic::catch_unwind(|| {
            modified_env([("TP_PANIC_VAR", Some("during"))], false, || {
                panic!("body failed");
            })
        });

        assert!(result.is_err());
        assert_eq!(var("TP_PANIC_VAR").as_deref(), Some("before"));
        env::remove_var("TP_PANIC_VAR");
    }

    #[test]
    fn restorer_can_be_used_as_closure() {
        let _guard = lock_env();
        env::remove_var("TP_RESTORER_VAR");
        let restore = make_env_restorer().into_fn();
        env::set_var("TP_RESTORER_VAR", "leaked");
        restore();
        assert_eq!(var("TP_RESTORER_VAR"), None);
    }
}

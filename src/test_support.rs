use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Serialises unit tests that touch process-wide state (environment, `PATH`).
pub static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Like `ENV_LOCK.lock()`, but a test that panicked while holding the lock
/// does not fail every test after it.
pub fn lock_env() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn write_executable_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("set perms");
    }
}

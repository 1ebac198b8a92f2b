//! Asserting that a block of code runs a command.

use crate::error::{AssertionFailure, OrPanic, Result};
use crate::mock::MockCommand;
use crate::record::InvocationRecord;
use crate::registry::CommandRegistry;
use crate::stub::StubContent;
use std::fmt::Write as _;
use std::thread;

/// Mocks a command for as long as it lives, then checks that it was called.
///
/// Prefer [`CallAssertion::finish`], which returns the failure. If the guard
/// is simply dropped, a failed check panics, unless the thread is already
/// panicking, in which case only cleanup happens.
#[derive(Debug)]
pub struct CallAssertion<'r> {
    mock: MockCommand<'r>,
    expected: Option<Vec<String>>,
    finished: bool,
}

impl CallAssertion<'static> {
    pub fn begin(name: impl Into<String>) -> Result<Self> {
        Self::start(MockCommand::new(name))
    }
}

impl<'r> CallAssertion<'r> {
    pub fn begin_in(name: impl Into<String>, registry: &'r CommandRegistry) -> Result<Self> {
        Self::start(MockCommand::from_parts(name, StubContent::Recording, registry))
    }

    fn start(mock: MockCommand<'r>) -> Result<Self> {
        mock.open()?;
        Ok(Self {
            mock,
            expected: None,
            finished: false,
        })
    }

    /// Also require one call whose arguments after the command name are
    /// exactly `args`.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn mock(&self) -> &MockCommand<'r> {
        &self.mock
    }

    /// Deactivate the mock and check its calls.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.check()
    }

    fn check(&self) -> Result<()> {
        self.mock.close()?;
        let calls = self.mock.get_calls()?;
        let expected: Option<Vec<&str>> = self
            .expected
            .as_ref()
            .map(|args| args.iter().map(String::as_str).collect());
        verify_calls(self.mock.name(), &calls, expected.as_deref())?;
        Ok(())
    }
}

impl Drop for CallAssertion<'_> {
    fn drop(&mut self) {
        if self.finished || thread::panicking() {
            return;
        }
        self.finished = true;
        if let Err(err) = self.check() {
            panic!("{err}");
        }
    }
}

/// Run `body` with `name` mocked and check that it was called, with `args`
/// at least once if given.
pub fn check_calls<T>(name: &str, args: Option<&[&str]>, body: impl FnOnce() -> T) -> Result<T> {
    check_calls_in(CommandRegistry::global(), name, args, body)
}

pub fn check_calls_in<T>(
    registry: &CommandRegistry,
    name: &str,
    args: Option<&[&str]>,
    body: impl FnOnce() -> T,
) -> Result<T> {
    let mut assertion = CallAssertion::begin_in(name, registry)?;
    if let Some(args) = args {
        assertion = assertion.with_args(args.iter().copied());
    }
    let value = body();
    assertion.finish()?;
    Ok(value)
}

/// Panicking form of [`check_calls`].
#[track_caller]
pub fn assert_calls<T>(name: &str, args: Option<&[&str]>, body: impl FnOnce() -> T) -> T {
    check_calls(name, args, body).or_panic()
}

/// The call check shared by [`CallAssertion`] and
/// [`MockCommand::check_called`].
pub fn verify_calls(
    name: &str,
    calls: &[InvocationRecord],
    expected: Option<&[&str]>,
) -> Result<(), AssertionFailure> {
    if calls.is_empty() {
        return Err(AssertionFailure::new(format!(
            "Command {name:?} was not called"
        )));
    }
    let Some(expected) = expected else {
        return Ok(());
    };
    if calls.iter().any(|call| call.args_match(expected)) {
        return Ok(());
    }

    let mut message = format!(
        "Command {name:?} was not called with specified args ({expected:?})\nIt was called with these arguments: "
    );
    for call in calls {
        let _ = write!(message, "\n  {:?}", call.args());
    }
    Err(AssertionFailure::new(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn call(argv: &[&str]) -> InvocationRecord {
        InvocationRecord {
            env: BTreeMap::new(),
            argv: argv.iter().map(|arg| arg.to_string()).collect(),
            cwd: PathBuf::from("/"),
        }
    }

    #[test]
    fn no_calls_fails_with_command_name() {
        let err = verify_calls("git", &[], None).expect_err("not called");
        assert_eq!(err.message(), "Command \"git\" was not called");
        assert!(verify_calls("git", &[], Some(&["status"])).is_err());
    }

    #[test]
    fn any_call_satisfies_check_without_args() {
        assert!(verify_calls("git", &[call(&["git", "anything"])], None).is_ok());
    }

    #[test]
    fn one_exact_match_is_enough() {
        let calls = [call(&["git", "status"]), call(&["git", "log", "-1"])];
        assert!(verify_calls("git", &calls, Some(&["log", "-1"])).is_ok());
        assert!(verify_calls("git", &calls, Some(&["log"])).is_err());
    }

    #[test]
    fn mismatch_lists_every_call() {
        let calls = [call(&["/tmp/cmds/git", "status"]), call(&["git"])];
        let err =
            verify_calls("git", &calls, Some(&["commit", "-m", "x"])).expect_err("mismatch");
        assert_eq!(
            err.message(),
            "Command \"git\" was not called with specified args ([\"commit\", \"-m\", \"x\"])\n\
             It was called with these arguments: \n  [\"status\"]\n  []"
        );
    }
}

//! Test helpers for code that works with files and runs external commands.
//!
//! * [`asserts`]: assertions about paths on the filesystem.
//! * [`MockCommand`], [`assert_calls`]: replace a command on `PATH` with a
//!   stub and inspect how it was called.
//! * [`env`]: scoped changes to environment variables.
//!
//! Recording stubs hand off to the `testpath-stub` binary built from this
//! package; see [`CommandRegistry::interpreter`] for how it is located.

pub mod asserts;
pub mod calls;
mod command_name;
pub mod env;
mod env_util;
pub mod error;
#[doc(hidden)]
pub mod interpreter;
pub mod logging;
pub mod mock;
pub mod record;
pub mod registry;
mod search_path;
pub mod stat_probe;
mod stub;

#[cfg(test)]
mod test_support;

pub use asserts::{
    assert_isdir, assert_isfile, assert_islink, assert_islink_to, assert_ispipe,
    assert_issocket, assert_not_isdir, assert_not_isfile, assert_not_islink, assert_not_ispipe,
    assert_not_issocket, assert_not_path_exists, assert_path_exists, PathCheck,
};
pub use calls::{assert_calls, check_calls, check_calls_in, CallAssertion};
pub use command_name::CommandNameViolation;
pub use env::{make_env_restorer, modified_env, temporary_env, EnvSnapshot};
pub use env_util::{NO_RECORD_LOCK_VAR, STUB_BIN_VAR, TMPDIR_VAR};
pub use error::{AssertionFailure, Error, OrPanic, Result};
pub use mock::{ActiveMock, MockCommand, MockState};
pub use record::InvocationRecord;
pub use registry::{CommandRegistry, RegistryConfig};
pub use stub::StubContent;

//! The `testpath-stub` program that generated stubs hand control to.
//!
//! ```text
//! testpath-stub record <recording-dir> <argv0> [args...]
//! testpath-stub print <stub-file>
//! testpath-stub run <stub-file> [args...]
//! ```

use crate::env_util;
use crate::record::{self, InvocationRecord};
use anyhow::{anyhow, bail, Context, Result};
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

pub const USAGE: &str = "usage: testpath-stub <record <recording-dir> <argv0> [args...] | print <stub-file> | run <stub-file> [args...]>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubAction {
    Record {
        recording_dir: PathBuf,
        argv: Vec<OsString>,
    },
    Print {
        stub_file: PathBuf,
    },
    Run {
        stub_file: PathBuf,
        args: Vec<OsString>,
    },
}

/// Parse the arguments after the program name.
pub fn parse_args(args: Vec<OsString>) -> Result<StubAction> {
    let mut args = args.into_iter();
    let mode = args.next().ok_or_else(|| anyhow!(USAGE))?;
    match mode.to_str() {
        Some("record") => {
            let recording_dir = args
                .next()
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("record: missing recording directory\n{USAGE}"))?;
            let argv: Vec<OsString> = args.collect();
            if argv.is_empty() {
                bail!("record: missing argv0\n{USAGE}");
            }
            Ok(StubAction::Record {
                recording_dir,
                argv,
            })
        }
        Some("print") => {
            let stub_file = args
                .next()
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("print: missing stub file\n{USAGE}"))?;
            if args.next().is_some() {
                bail!("print: unexpected extra arguments\n{USAGE}");
            }
            Ok(StubAction::Print { stub_file })
        }
        Some("run") => {
            let stub_file = args
                .next()
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("run: missing stub file\n{USAGE}"))?;
            Ok(StubAction::Run {
                stub_file,
                args: args.collect(),
            })
        }
        _ => Err(anyhow!(
            "unknown mode `{}`; expected record|print|run\n{USAGE}",
            mode.to_string_lossy()
        )),
    }
}

/// Carry out `action`, returning the exit code the process should end with.
pub fn execute(action: StubAction) -> Result<i32> {
    match action {
        StubAction::Record {
            recording_dir,
            argv,
        } => {
            record_invocation(&recording_dir, argv)?;
            Ok(0)
        }
        StubAction::Print { stub_file } => {
            let stdout = io::stdout();
            print_stub(&stub_file, &mut stdout.lock())?;
            Ok(0)
        }
        StubAction::Run { stub_file, args } => {
            let status = run_shebang(&stub_file, &args)?;
            Ok(exit_code_like(status))
        }
    }
}

/// Append a record of this invocation to `<recording_dir>/<command name>`.
pub fn record_invocation(recording_dir: &Path, argv: Vec<OsString>) -> Result<PathBuf> {
    let argv: Vec<String> = argv
        .into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let argv0 = argv.first().ok_or_else(|| anyhow!("record: missing argv0"))?;
    let command = command_name(argv0)?;
    let path = record::record_file(recording_dir, &command);
    let invocation =
        InvocationRecord::capture(argv).context("failed to capture invocation context")?;
    let lock = env_util::record_lock_enabled();
    record::append_record(&path, &invocation, lock)?;
    tracing::debug!(command = %command, path = %path.display(), "recorded invocation");
    Ok(path)
}

fn command_name(argv0: &str) -> Result<String> {
    Path::new(argv0)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("cannot determine command name from argv0 `{argv0}`"))
}

pub fn print_stub(stub_file: &Path, out: &mut impl Write) -> Result<()> {
    let bytes = fs_err::read(stub_file)?;
    out.write_all(&bytes)
        .and_then(|()| out.flush())
        .with_context(|| format!("failed to write contents of {}", stub_file.display()))
}

/// Run the interpreter named on the stub's `#!` line on the stub itself.
pub fn run_shebang(stub_file: &Path, args: &[OsString]) -> Result<ExitStatus> {
    let content = fs_err::read_to_string(stub_file)?;
    let mut tokens = shebang_command(&content).with_context(|| {
        format!("custom stub {} has no usable `#!` line", stub_file.display())
    })?;
    let program = tokens.remove(0);
    Command::new(&program)
        .args(tokens)
        .arg(stub_file)
        .args(args)
        .status()
        .with_context(|| format!("failed to spawn stub interpreter `{program}`"))
}

pub fn shebang_command(content: &str) -> Result<Vec<String>> {
    let first_line = content.lines().next().unwrap_or_default();
    let command = first_line
        .strip_prefix("#!")
        .ok_or_else(|| anyhow!("first line does not start with `#!`"))?;
    let tokens = shell_words::split(command.trim())
        .with_context(|| "shebang line must be a valid shell-style command line")?;
    if tokens.is_empty() {
        bail!("shebang line names no interpreter");
    }
    Ok(tokens)
}

#[cfg(unix)]
fn exit_code_like(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(code) = status.code() {
        return code;
    }
    status.signal().map(|signal| 128 + signal).unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code_like(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

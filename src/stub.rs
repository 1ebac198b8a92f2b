//! Rendering of the files that stand in for a mocked command.
//!
//! On Unix a stub is a `/bin/sh` script named after the command. The
//! interpreter path goes on an `exec` line rather than the `#!` line, so it is
//! not subject to the kernel's shebang length limit.
//!
//! On Windows, `PATH` lookup only runs files with a `PATHEXT` extension, so the
//! stub payload goes in `<name>.stub` and a `<name>.cmd` launcher hands it to
//! the `testpath-stub` interpreter.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// What running a stub does.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StubContent {
    /// Append an invocation record and exit 0.
    #[default]
    Recording,
    /// Print this text verbatim and exit 0, ignoring arguments.
    FixedOutput(String),
    /// Use this script as-is. On Unix it needs its own `#!` line; on Windows
    /// the interpreter named on its `#!` line is run on it.
    Custom(String),
}

impl StubContent {
    pub fn writes_records(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn needs_interpreter(&self, platform: Platform) -> bool {
        match platform {
            Platform::Unix => self.writes_records(),
            Platform::Windows => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }
}

/// Paths and bodies of the files making up one stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubFiles {
    pub stub: PathBuf,
    pub stub_body: String,
    pub launcher: Option<(PathBuf, String)>,
}

pub struct StubContext<'a> {
    pub command_dir: &'a Path,
    pub recording_dir: &'a Path,
    pub interpreter: Option<&'a Path>,
}

pub const WINDOWS_STUB_EXTENSION: &str = "stub";
pub const WINDOWS_LAUNCHER_EXTENSION: &str = "cmd";

/// Longest path cmd.exe will start without the verbatim `\\?\` prefix.
const WINDOWS_MAX_PATH: usize = 259;

pub fn stub_path(platform: Platform, command_dir: &Path, name: &str) -> PathBuf {
    match platform {
        Platform::Unix => command_dir.join(name),
        Platform::Windows => command_dir.join(format!("{name}.{WINDOWS_STUB_EXTENSION}")),
    }
}

pub fn launcher_path(platform: Platform, command_dir: &Path, name: &str) -> Option<PathBuf> {
    match platform {
        Platform::Unix => None,
        Platform::Windows => {
            Some(command_dir.join(format!("{name}.{WINDOWS_LAUNCHER_EXTENSION}")))
        }
    }
}

/// Render the stub for `name`. `ctx.interpreter` must be set whenever
/// [`StubContent::needs_interpreter`] says so.
pub fn render(platform: Platform, name: &str, content: &StubContent, ctx: &StubContext<'_>) -> StubFiles {
    let stub = stub_path(platform, ctx.command_dir, name);
    match platform {
        Platform::Unix => StubFiles {
            stub,
            stub_body: render_unix(content, ctx),
            launcher: None,
        },
        Platform::Windows => {
            let launcher = launcher_path(platform, ctx.command_dir, name)
                .map(|path| (path, render_windows_launcher(name, content, ctx)));
            StubFiles {
                stub,
                stub_body: render_windows_stub(content),
                launcher,
            }
        }
    }
}

fn render_unix(content: &StubContent, ctx: &StubContext<'_>) -> String {
    match content {
        StubContent::Recording => format!(
            "#!/bin/sh\nexec {} record {} \"$0\" \"$@\"\n",
            sh_quote(interpreter_of(ctx)),
            sh_quote(ctx.recording_dir)
        ),
        StubContent::FixedOutput(text) => format!(
            "#!/bin/sh\nprintf '%s' {}\nexit 0\n",
            shell_words::quote(text)
        ),
        StubContent::Custom(script) => script.clone(),
    }
}

/// Body of the `.stub` file next to the launcher. The launcher of a recording
/// stub never reads it; the empty file still marks the name as mocked when
/// another mock of the same name is opened.
fn render_windows_stub(content: &StubContent) -> String {
    match content {
        StubContent::Recording => String::new(),
        StubContent::FixedOutput(text) => text.clone(),
        StubContent::Custom(script) => script.clone(),
    }
}

fn render_windows_launcher(name: &str, content: &StubContent, ctx: &StubContext<'_>) -> String {
    let program = cmd_quote(&launcher_program(interpreter_of(ctx)));
    let stub_file = format!("\"%~dp0{}.{WINDOWS_STUB_EXTENSION}\"", cmd_escape(name));
    match content {
        StubContent::Recording => format!(
            "@{program} record {} \"%~dp0{}\" %*\r\n",
            cmd_quote(&ctx.recording_dir.to_string_lossy()),
            cmd_escape(name)
        ),
        StubContent::FixedOutput(_) => format!("@{program} print {stub_file}\r\n"),
        StubContent::Custom(_) => format!("@{program} run {stub_file} %*\r\n"),
    }
}

fn interpreter_of<'a>(ctx: &StubContext<'a>) -> &'a Path {
    ctx.interpreter.unwrap_or(Path::new("testpath-stub"))
}

fn sh_quote(path: &Path) -> Cow<'_, str> {
    match path.to_string_lossy() {
        Cow::Borrowed(text) => shell_words::quote(text),
        Cow::Owned(text) => Cow::Owned(shell_words::quote(&text).into_owned()),
    }
}

/// The program text for a launcher line. Paths beyond `MAX_PATH` are only
/// startable in verbatim form.
pub fn launcher_program(path: &Path) -> String {
    let text = path.to_string_lossy();
    if text.len() > WINDOWS_MAX_PATH && !text.starts_with(r"\\?\") {
        if let Some(unc) = text.strip_prefix(r"\\") {
            return format!(r"\\?\UNC\{unc}");
        }
        return format!(r"\\?\{}", text.replace('/', "\\"));
    }
    text.into_owned()
}

fn cmd_escape(text: &str) -> String {
    text.replace('%', "%%")
}

fn cmd_quote(text: &str) -> String {
    format!("\"{}\"", cmd_escape(text))
}

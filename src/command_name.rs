//! Names a mock may be registered under.
//!
//! A stub is written as `<command dir>/<name>`, so the name has to be one
//! plain file-name component. Anything a file name may hold is accepted,
//! including spaces and a leading `-`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandNameViolation {
    Empty,
    ContainsNul,
    IsDotToken,
    ContainsPathSeparator,
}

impl fmt::Display for CommandNameViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "command name is empty",
            Self::ContainsNul => "command name contains a NUL byte",
            Self::IsDotToken => "`.` and `..` name directories, not commands",
            Self::ContainsPathSeparator => "command name contains a path separator",
        })
    }
}

pub fn validate_command_name(name: &str) -> Result<(), CommandNameViolation> {
    match name {
        "" => Err(CommandNameViolation::Empty),
        "." | ".." => Err(CommandNameViolation::IsDotToken),
        _ if name.contains('\0') => Err(CommandNameViolation::ContainsNul),
        _ if name.contains(['/', '\\']) => Err(CommandNameViolation::ContainsPathSeparator),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_file_names_are_accepted() {
        for name in [
            "git",
            "x86_64-linux-gnu-gcc",
            "python3.12",
            "my tool",
            "-x",
            " padded ",
            ".hidden",
            "emoji🚀",
        ] {
            assert_eq!(validate_command_name(name), Ok(()), "{name:?}");
        }
    }

    #[test]
    fn names_that_leave_the_command_dir_are_rejected() {
        let cases = [
            ("", CommandNameViolation::Empty),
            (".", CommandNameViolation::IsDotToken),
            ("..", CommandNameViolation::IsDotToken),
            ("bin/git", CommandNameViolation::ContainsPathSeparator),
            (r"bin\git", CommandNameViolation::ContainsPathSeparator),
            ("/usr/bin/git", CommandNameViolation::ContainsPathSeparator),
            ("g\0it", CommandNameViolation::ContainsNul),
        ];
        for (name, expected) in cases {
            assert_eq!(validate_command_name(name), Err(expected), "{name:?}");
        }
    }

    #[test]
    fn violation_messages_are_readable() {
        assert_eq!(
            CommandNameViolation::ContainsPathSeparator.to_string(),
            "command name contains a path separator"
        );
    }
}

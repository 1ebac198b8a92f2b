//! The on-disk hand-off between a recording stub and the test process.
//!
//! Each call appends one JSON object followed by [`RECORD_SEPARATOR`] to
//! `<recording_dir>/<command name>`. The JSON encoder escapes every control
//! character, so the separator cannot occur inside a serialized record.
//! Arguments and environment values that are not valid UTF-8 are stored
//! lossily.

use crate::error::{Error, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// ASCII record separator.
pub const RECORD_SEPARATOR: u8 = 0x1e;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub env: BTreeMap<String, String>,
    pub argv: Vec<String>,
    pub cwd: PathBuf,
}

impl InvocationRecord {
    /// Describe the current process, invoked with `argv`.
    pub fn capture(argv: Vec<String>) -> io::Result<Self> {
        let env = env::vars_os()
            .map(|(key, value)| {
                (
                    key.to_string_lossy().into_owned(),
                    value.to_string_lossy().into_owned(),
                )
            })
            .collect();
        Ok(Self {
            env,
            argv,
            cwd: env::current_dir()?,
        })
    }

    /// The arguments after argv[0].
    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or(&[])
    }

    /// File name of argv[0], which may be a full path to the stub.
    pub fn program_name(&self) -> Option<&str> {
        let first = self.argv.first()?;
        Path::new(first).file_name().and_then(|name| name.to_str())
    }

    pub fn args_match<S: AsRef<str>>(&self, expected: &[S]) -> bool {
        self.args().len() == expected.len()
            && self
                .args()
                .iter()
                .zip(expected)
                .all(|(actual, expected)| actual == expected.as_ref())
    }
}

pub fn record_file(recording_dir: &Path, command: &str) -> PathBuf {
    recording_dir.join(command)
}

/// Append one record in a single write. With `lock`, an exclusive advisory
/// lock is held on the file for the duration of the write.
pub fn append_record(path: &Path, record: &InvocationRecord, lock: bool) -> Result<()> {
    let mut bytes = serde_json::to_vec(record)
        .map_err(|err| Error::io("serialize record for", path, io::Error::other(err)))?;
    bytes.push(RECORD_SEPARATOR);

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| Error::io("open record file", path, err))?;
    if lock {
        file.lock_exclusive()
            .map_err(|err| Error::io("lock record file", path, err))?;
    }
    file.write_all(&bytes)
        .map_err(|err| Error::io("append to record file", path, err))?;
    file.flush()
        .map_err(|err| Error::io("flush record file", path, err))?;
    Ok(())
}

/// Read every record in `path`. A missing file holds no records.
pub fn read_records(path: &Path) -> Result<Vec<InvocationRecord>> {
    read_records_from(path, 0)
}

/// Read the records appended after byte `offset`, which must fall on a
/// record boundary.
pub fn read_records_from(path: &Path, offset: u64) -> Result<Vec<InvocationRecord>> {
    let bytes = match fs_err::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(Error::io("read record file", path, err)),
    };
    let start = usize::try_from(offset).unwrap_or(usize::MAX);
    parse_records(path, bytes.get(start..).unwrap_or_default())
}

/// Current length of `path`, or 0 if it does not exist yet.
pub fn record_file_len(path: &Path) -> Result<u64> {
    match fs_err::metadata(path) {
        Ok(metadata) => Ok(metadata.len()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(err) => Err(Error::io("stat record file", path, err)),
    }
}

pub fn parse_records(path: &Path, bytes: &[u8]) -> Result<Vec<InvocationRecord>> {
    let mut chunks: Vec<&[u8]> = bytes.split(|byte| *byte == RECORD_SEPARATOR).collect();
    // Everything after the final separator is not a record.
    chunks.pop();
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            serde_json::from_slice(chunk).map_err(|source| Error::MalformedRecord {
                path: path.to_path_buf(),
                index,
                source,
            })
        })
        .collect()
}

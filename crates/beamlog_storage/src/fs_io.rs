#![forbid(unsafe_code)]

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

const TAIL_WINDOW_BYTES: u64 = 4 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error path={}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

pub(crate) fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), StorageError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(io_error(parent))
        }
        _ => Ok(()),
    }
}

/// Missing files read as `None`; every other failure is an error.
pub fn read_text_if_exists(path: &Path) -> Result<Option<String>, StorageError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_error(path)(err)),
    }
}

/// Replaces `path` with `data` by writing a sibling `.tmp` file and renaming it over.
/// The `.tmp` file is removed again when any step fails.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    ensure_parent_dir(path)?;
    let tmp = tmp_path(path);
    let mut file = File::create(&tmp).map_err(io_error(&tmp))?;
    let written = file.write_all(data).and_then(|_| file.sync_data());
    drop(file);
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(io_error(&tmp)(err));
    }
    fs::rename(&tmp, path).map_err(|err| {
        let _ = fs::remove_file(&tmp);
        io_error(path)(err)
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".tmp");
    PathBuf::from(raw)
}

/// Appends one line. A previous unterminated line is closed first so records never merge.
pub fn append_line(path: &Path, line: &str) -> Result<(), StorageError> {
    ensure_parent_dir(path)?;
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(io_error(path))?;
    let needs_separator = ends_without_newline(&mut file).map_err(io_error(path))?;
    let mut buf = String::with_capacity(line.len() + 2);
    if needs_separator {
        buf.push('\n');
    }
    buf.push_str(line);
    buf.push('\n');
    file.write_all(buf.as_bytes())
        .and_then(|_| file.sync_data())
        .map_err(io_error(path))
}

fn ends_without_newline(file: &mut File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Returns the final non-blank line without reading the whole file.
pub fn read_last_line(path: &Path) -> Result<Option<String>, StorageError> {
    read_last_matching_line(path, |line| Some(line.to_string()))
}

/// Walks the file backwards from the end and returns the first non-blank line `parse`
/// accepts. The tail window starts at 4 KiB and doubles until a line is accepted or the
/// window covers the file. A window that starts mid-file drops its leading partial line.
pub fn read_last_matching_line<T, F>(path: &Path, mut parse: F) -> Result<Option<T>, StorageError>
where
    F: FnMut(&str) -> Option<T>,
{
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_error(path)(err)),
    };
    let len = file.metadata().map_err(io_error(path))?.len();
    let mut window = TAIL_WINDOW_BYTES;
    loop {
        let start = len.saturating_sub(window);
        file.seek(SeekFrom::Start(start)).map_err(io_error(path))?;
        let mut buf = Vec::with_capacity((len - start) as usize);
        file.read_to_end(&mut buf).map_err(io_error(path))?;
        let text = String::from_utf8_lossy(&buf);
        let complete = if start == 0 {
            &text[..]
        } else {
            text.find('\n').map_or("", |idx| &text[idx + 1..])
        };
        for line in complete.lines().rev().map(str::trim) {
            if line.is_empty() {
                continue;
            }
            if let Some(found) = parse(line) {
                return Ok(Some(found));
            }
        }
        if start == 0 {
            return Ok(None);
        }
        window = window.saturating_mul(2);
    }
}

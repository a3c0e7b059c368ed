//! Parses the `---`-delimited key/value header at the top of an entry source
//! file. The format is deliberately minimal: one `key: value` pair per line,
//! split on the first `:`, with no quoting, escaping, or multi-line values.
//!
//! ```md
//! ---
//! title: hello-world
//! published: 2021-04-16
//! revision: 2021-04-16
//! excerpt: Saying hi
//! tags: greet, meta
//! ---
//! # Hello
//!
//! World
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// The fence which opens and closes the front matter block.
pub const FENCE: &str = "---";

/// The key/value pairs found between the two fences. Duplicate keys resolve to
/// the last value seen.
pub type FrontMatter = HashMap<String, String>;

/// Reads front matter and the raw (unrendered) body from `reader`. Lines
/// before the opening fence are skipped. Every line after the closing fence
/// is returned in the body, each terminated with `\n`. The body is copied as
/// bytes; only the header has to be UTF-8.
pub fn parse<R: BufRead>(mut reader: R) -> Result<(FrontMatter, Vec<u8>)> {
    let mut front_matter = FrontMatter::new();
    let mut opened = false;
    let mut buf = String::new();

    loop {
        buf.clear();
        if reader.read_line(&mut buf)? == 0 {
            return Err(Error::NoContent);
        }
        let line = buf.strip_suffix('\n').unwrap_or(buf.as_str());
        let line = line.strip_suffix('\r').unwrap_or(line).trim_matches(' ');
        if line == FENCE {
            if opened {
                break;
            }
            opened = true;
        } else if opened {
            match line.split_once(':') {
                Some((key, value)) => {
                    front_matter.insert(key.to_owned(), value.trim_matches(' ').to_owned());
                }
                None => return Err(Error::InvalidKeyValue(line.to_owned())),
            }
        }
    }

    let mut body = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        body.extend_from_slice(strip_newline(&line));
        body.push(b'\n');
    }

    Ok((front_matter, body))
}

// Drops a trailing `\n` or `\r\n`.
fn strip_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Opens the file at `path` and parses it with [`parse`]. Errors are
/// annotated with the path.
pub fn parse_file(path: &Path) -> Result<(FrontMatter, Vec<u8>)> {
    let annotate = |err: Error| Error::Annotated(format!("parsing `{}`", path.display()), Box::new(err));
    let file = File::open(path).map_err(|e| annotate(Error::Io(e)))?;
    parse(BufReader::new(file)).map_err(annotate)
}

/// Represents the result of a front matter parse.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem parsing front matter.
#[derive(Debug)]
pub enum Error {
    /// Returned when a line inside the block has no `:`.
    InvalidKeyValue(String),

    /// Returned when the input ends before the closing fence.
    NoContent,

    /// Returned for I/O errors reading the source.
    Io(std::io::Error),

    /// An error with an annotation.
    Annotated(String, Box<Error>),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidKeyValue(line) => {
                write!(f, "invalid front matter key-value pair: {:?}", line)
            }
            Error::NoContent => write!(f, "no content found"),
            Error::Io(err) => err.fmt(f),
            Error::Annotated(annotation, err) => write!(f, "{}: {}", annotation, err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidKeyValue(_) => None,
            Error::NoContent => None,
            Error::Io(err) => Some(err),
            Error::Annotated(_, err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    /// Converts a [`std::io::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator while reading lines.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

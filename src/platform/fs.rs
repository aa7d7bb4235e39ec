// LogSift - platform/fs.rs
//
// Byte-range reads for the chunk sorters. Each worker opens its own
// read-only handle, so no file state is shared between threads.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Read exactly the bytes `start..end` of `path`.
///
/// A file that has shrunk below `end` produces `UnexpectedEof`.
pub fn read_range(path: &Path, start: u64, end: u64) -> io::Result<Vec<u8>> {
    if end < start {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid byte range {start}..{end}"),
        ));
    }
    let len = usize::try_from(end - start).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("byte range {start}..{end} does not fit in memory"),
        )
    })?;

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Split a chunk's bytes into `(offset, line)` pairs.
///
/// Lines end at `\n`; a trailing `\r` is dropped. A final line without a
/// newline is still a line. Invalid UTF-8 is replaced rather than rejected.
/// `base` is the file offset of `bytes[0]`.
pub fn split_lines(bytes: &[u8], base: u64) -> impl Iterator<Item = (u64, String)> + '_ {
    let mut pos = 0usize;
    std::iter::from_fn(move || {
        if pos >= bytes.len() {
            return None;
        }
        let rest = &bytes[pos..];
        let (line, consumed) = match memchr::memchr(b'\n', rest) {
            Some(nl) => (&rest[..nl], nl + 1),
            None => (rest, rest.len()),
        };
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let offset = base + pos as u64;
        pos += consumed;
        Some((offset, String::from_utf8_lossy(line).into_owned()))
    })
}

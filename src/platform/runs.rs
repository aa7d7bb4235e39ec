// LogSift - platform/runs.rs
//
// Scratch storage for sorted runs. Each chunk sorter writes its run to a
// file in a per-sort scratch directory; the merge reads the runs back one
// record at a time, so only one head per run is resident while the ordered
// stream is consumed.
//
// Record format, one per line:
//   band \t seconds.nanos \t anchor \t offset \t raw line
// Band is L (leading), T (timeline) or Z (trailing); a missing timestamp is
// written as "-". Raw lines never contain '\n', so a record is always one
// line. Entries are rebuilt by re-parsing the raw line at its offset.

use crate::core::merge::{Band, Keyed, MergeKey, StreamErrorSlot};
use crate::core::parser;
use crate::util::error::LogSiftError;
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SCRATCH_PREFIX: &str = "logsift-sort-";

// =============================================================================
// Scratch directory
// =============================================================================

/// A per-sort scratch directory, removed when the last handle is dropped.
///
/// Run readers hold a handle, so the directory outlives the sort call for as
/// long as the ordered stream is alive.
#[derive(Debug, Clone)]
pub struct ScratchDir(Arc<tempfile::TempDir>);

impl ScratchDir {
    /// Create a fresh directory under `base`, or under the system temp dir.
    pub fn create(base: Option<&Path>) -> Result<Self, LogSiftError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let created = match base {
            Some(base) => builder.tempdir_in(base),
            None => builder.tempdir(),
        };
        let dir = created.map_err(|source| LogSiftError::Io {
            path: base.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
            operation: "create scratch directory",
            source,
        })?;
        tracing::debug!(path = %dir.path().display(), "Scratch directory created");
        Ok(Self(Arc::new(dir)))
    }

    pub fn path(&self) -> &Path {
        self.0.path()
    }

    /// Path of the run file `kind` for chunk `chunk_id`.
    pub fn run_path(&self, chunk_id: usize, kind: &str) -> PathBuf {
        self.path().join(format!("chunk-{chunk_id:06}.{kind}"))
    }
}

// =============================================================================
// Writing
// =============================================================================

/// A finished run on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFile {
    pub path: PathBuf,
    pub records: usize,
}

/// Buffered writer for one run file.
pub struct RunWriter {
    path: PathBuf,
    out: BufWriter<File>,
    records: usize,
}

impl RunWriter {
    pub fn create(path: PathBuf) -> io::Result<Self> {
        let file = File::create(&path)?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
            records: 0,
        })
    }

    pub fn push(&mut self, key: &MergeKey, raw: &str) -> io::Result<()> {
        let band = match key.band {
            Band::Leading => 'L',
            Band::Timeline => 'T',
            Band::Trailing => 'Z',
        };
        write!(self.out, "{band}\t")?;
        match key.timestamp {
            Some(ts) => write!(self.out, "{}.{}", ts.timestamp(), ts.timestamp_subsec_nanos())?,
            None => self.out.write_all(b"-")?,
        }
        writeln!(self.out, "\t{}\t{}\t{raw}", key.anchor, key.offset)?;
        self.records += 1;
        Ok(())
    }

    /// Flush the run. An empty run leaves no file behind and yields `None`.
    pub fn finish(self) -> io::Result<Option<RunFile>> {
        let Self { path, out, records } = self;
        out.into_inner().map_err(io::IntoInnerError::into_error)?;
        if records == 0 {
            fs::remove_file(&path)?;
            return Ok(None);
        }
        Ok(Some(RunFile { path, records }))
    }
}

/// Write `records`, already in run order, to a new run file at `path`.
pub fn write_run(path: PathBuf, records: &[Keyed]) -> io::Result<Option<RunFile>> {
    if records.is_empty() {
        return Ok(None);
    }
    let mut writer = RunWriter::create(path)?;
    for record in records {
        writer.push(&record.key, &record.entry.raw_text)?;
    }
    writer.finish()
}

// =============================================================================
// Reading
// =============================================================================

/// Streams one run file back as keyed entries.
///
/// The file is deleted as soon as its last record has been read, so disk
/// usage shrinks as the merge advances. A read error or a run that ends
/// early stops this reader and is recorded in the shared error slot; the
/// stream then yields fewer entries than its length promised.
pub struct RunReader {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    remaining: usize,
    line: Vec<u8>,
    errors: StreamErrorSlot,
    _scratch: ScratchDir,
}

impl RunReader {
    pub fn open(
        run: RunFile,
        scratch: &ScratchDir,
        errors: StreamErrorSlot,
    ) -> Result<Self, LogSiftError> {
        let file = File::open(&run.path).map_err(|source| LogSiftError::Io {
            path: run.path.clone(),
            operation: "open run",
            source,
        })?;
        Ok(Self {
            path: run.path,
            reader: Some(BufReader::new(file)),
            remaining: run.records,
            line: Vec::new(),
            errors,
            _scratch: scratch.clone(),
        })
    }

    fn release(&mut self) {
        self.remaining = 0;
        if self.reader.take().is_some() {
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::debug!(path = %self.path.display(), error = %e, "Run file not removed");
            }
        }
    }

    fn fail(&mut self, source: io::Error) {
        tracing::warn!(path = %self.path.display(), error = %source, "Run read failed");
        self.errors.record(LogSiftError::Io {
            path: self.path.clone(),
            operation: "read run",
            source,
        });
        self.release();
    }
}

impl Iterator for RunReader {
    type Item = Keyed;

    fn next(&mut self) -> Option<Keyed> {
        if self.remaining == 0 {
            self.release();
            return None;
        }
        let reader = self.reader.as_mut()?;

        self.line.clear();
        let decoded = match reader.read_until(b'\n', &mut self.line) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("run ended with {} record(s) missing", self.remaining),
            )),
            Ok(_) => decode_record(&self.line),
            Err(e) => Err(e),
        };
        match decoded {
            Ok(keyed) => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.release();
                }
                Some(keyed)
            }
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for RunReader {}

impl Drop for RunReader {
    fn drop(&mut self) {
        self.release();
    }
}

fn invalid(reason: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("corrupt run record: {reason}"))
}

fn decode_record(line: &[u8]) -> io::Result<Keyed> {
    let line = line
        .strip_suffix(b"\n")
        .ok_or_else(|| invalid("truncated record"))?;
    let line = std::str::from_utf8(line).map_err(|_| invalid("not UTF-8"))?;

    let mut fields = line.splitn(5, '\t');
    let mut field = |name: &str| fields.next().ok_or_else(|| invalid(name));
    let band = match field("band")? {
        "L" => Band::Leading,
        "T" => Band::Timeline,
        "Z" => Band::Trailing,
        _ => return Err(invalid("band")),
    };
    let timestamp = match field("timestamp")? {
        "-" => None,
        ts => Some(decode_timestamp(ts).ok_or_else(|| invalid("timestamp"))?),
    };
    let anchor = field("anchor")?.parse().map_err(|_| invalid("anchor"))?;
    let offset = field("offset")?.parse().map_err(|_| invalid("offset"))?;
    let raw = field("line")?;

    Ok(Keyed {
        key: MergeKey {
            band,
            timestamp,
            anchor,
            offset,
        },
        entry: parser::parse_line(raw, offset),
    })
}

fn decode_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let (secs, nanos) = s.split_once('.')?;
    DateTime::from_timestamp(secs.parse().ok()?, nanos.parse().ok()?)
}

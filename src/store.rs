//! Append-only checkpoint store for per-prime records.
//!
//! The dataset is a comma-separated text file with a fixed header, one row
//! per prime, appended in computation order. Every append is flushed before
//! it returns, so killing the process at any point loses at most the row
//! being written; a torn trailing row is treated as absent by the resume
//! lookup and simply recomputed.
//!
//! Loading goes through a versioned-schema step: the header line selects
//! the layout, and rows in the older pre-mod-5 layout get their missing
//! fields filled during the load. Rows from overlap re-computation collapse
//! to one entry per prime.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::arith::{five_split_class, PrimeRecord, SplitClass};

/// Dataset filename inside the output directory.
pub const DATASET_FILENAME: &str = "prime_traces.csv";

/// Canonical header, current layout.
pub const HEADER: &str = "p,class_mod4,class_mod5,pisano_period,char_sum,trace,norm_trace,weil_ratio";

/// Header of the older layout, before the mod-5 classification and the raw
/// character sum were recorded.
const HEADER_LEGACY: &str = "p,class_mod4,pisano_period,trace,norm_trace,weil_ratio";

/// Bytes read from the end of the file by the resume lookup. Rows are far
/// shorter than this, so the window always contains the last full line.
const TAIL_WINDOW: u64 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unrecognized dataset header: {0:?}")]
    UnknownHeader(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schema {
    Current,
    Legacy,
}

/// Handle on the on-disk dataset. Cheap to construct; every operation opens
/// the file on demand, so a store can be probed before it exists.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the store holds at least one data row.
    ///
    /// Reads at most two lines; a torn or unparseable row still counts as
    /// data here, because replay must not silently discard a dataset whose
    /// tail alone is damaged.
    pub fn has_records(&self) -> bool {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return false,
        };
        let mut lines = BufReader::new(file).lines();
        let header = matches!(lines.next(), Some(Ok(_)));
        header && matches!(lines.next(), Some(Ok(line)) if !line.trim().is_empty())
    }

    /// Whether the on-disk file still uses the older layout and must be
    /// rewritten before new rows can be appended to it.
    pub fn needs_migration(&self) -> bool {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return false,
        };
        let mut first_line = String::new();
        if BufReader::new(file).read_line(&mut first_line).is_err() {
            return false;
        }
        first_line.trim_end() == HEADER_LEGACY
    }

    /// Largest prime known to be durably recorded, or 1 if the store is
    /// absent, empty, header-only, or its trailing line does not parse as a
    /// complete record.
    ///
    /// Reads only a bounded tail window, never the whole file. The whole
    /// trailing line must parse, not just its key column: a row torn after
    /// its key still starts with a valid integer, and treating it as
    /// checkpointed would leave that prime permanently missing. Returning 1
    /// instead makes resume recompute from the start, which is safe:
    /// duplicates collapse at load time.
    pub fn last_checkpointed_prime(&self) -> u64 {
        match self.read_tail_record() {
            Some(p) => p,
            None => 1,
        }
    }

    fn read_tail_record(&self) -> Option<u64> {
        let mut file = File::open(&self.path).ok()?;
        let len = file.metadata().ok()?.len();
        if len == 0 {
            return None;
        }
        let start = len.saturating_sub(TAIL_WINDOW);
        file.seek(SeekFrom::Start(start)).ok()?;
        let mut buf = Vec::with_capacity((len - start) as usize);
        file.read_to_end(&mut buf).ok()?;
        let tail = String::from_utf8_lossy(&buf);
        let last_line = tail.lines().rev().find(|l| !l.trim().is_empty())?;
        parse_record(last_line, Schema::Current).map(|rec| rec.p)
    }

    /// Open the store for appending. `fresh` truncates the file and writes
    /// the canonical header; otherwise rows are appended after the existing
    /// content.
    pub fn open_appender(&self, fresh: bool) -> Result<RecordWriter, StoreError> {
        if fresh {
            let mut writer = BufWriter::new(File::create(&self.path)?);
            writeln!(writer, "{}", HEADER)?;
            writer.flush()?;
            return Ok(RecordWriter { writer });
        }
        let mut file = OpenOptions::new().append(true).create(true).open(&self.path)?;
        // A kill mid-row can leave the file without its trailing newline;
        // appending straight after that would merge the next row into the
        // torn one. Close the torn line first so it stays a row of its own.
        if self.missing_trailing_newline()? {
            file.write_all(b"\n")?;
            file.flush()?;
        }
        Ok(RecordWriter { writer: BufWriter::new(file) })
    }

    fn missing_trailing_newline(&self) -> Result<bool, std::io::Error> {
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(false);
        }
        file.seek(SeekFrom::End(-1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        Ok(last[0] != b'\n')
    }

    /// Load every parseable record, migrated to the current schema, unique
    /// per prime and sorted ascending.
    ///
    /// Malformed rows (torn writes that a later resume appended past) are
    /// skipped with a warning. When a prime appears more than once the
    /// latest row wins; the kernel is deterministic, so duplicates agree.
    pub fn load_all(&self) -> Result<Vec<PrimeRecord>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut lines = BufReader::new(file).lines();
        let header = match lines.next() {
            None => return Ok(Vec::new()),
            Some(h) => h?,
        };
        let schema = match header.trim_end() {
            HEADER => Schema::Current,
            HEADER_LEGACY => Schema::Legacy,
            other => return Err(StoreError::UnknownHeader(other.to_string())),
        };

        let mut by_p: BTreeMap<u64, PrimeRecord> = BTreeMap::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_record(&line, schema) {
                Some(rec) => {
                    by_p.insert(rec.p, rec);
                }
                None => log::warn!("skipping malformed dataset row: {:?}", line),
            }
        }
        Ok(by_p.into_values().collect())
    }

    /// Discard all persisted records. Used only on restart.
    pub fn truncate(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrite the store as header + the given rows, via a temp file and a
    /// rename so an interruption mid-rewrite cannot destroy the durable
    /// dataset. Loading the rewritten file reproduces the same rows.
    pub fn rewrite_sorted(&self, records: &[PrimeRecord]) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut w = BufWriter::new(File::create(&tmp)?);
            writeln!(w, "{}", HEADER)?;
            for rec in records {
                writeln!(w, "{}", format_record(rec))?;
            }
            w.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Writer handle returned by [`CheckpointStore::open_appender`].
pub struct RecordWriter {
    writer: BufWriter<File>,
}

impl RecordWriter {
    /// Append one row and flush it. After this returns, the row and every
    /// row appended before it in this run survive a process kill.
    pub fn append(&mut self, rec: &PrimeRecord) -> Result<(), StoreError> {
        writeln!(self.writer, "{}", format_record(rec))?;
        self.writer.flush()?;
        Ok(())
    }
}

fn format_record(rec: &PrimeRecord) -> String {
    format!(
        "{},{},{},{},{},{},{},{}",
        rec.p,
        rec.class_mod4,
        rec.class_mod5,
        rec.pisano_period,
        rec.char_sum,
        rec.trace,
        rec.norm_trace,
        rec.weil_ratio
    )
}

fn parse_record(line: &str, schema: Schema) -> Option<PrimeRecord> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    match schema {
        Schema::Current => {
            if fields.len() != 8 {
                return None;
            }
            Some(PrimeRecord {
                p: fields[0].parse().ok()?,
                class_mod4: SplitClass::from_tag(fields[1])?,
                class_mod5: SplitClass::from_tag(fields[2])?,
                pisano_period: fields[3].parse().ok()?,
                char_sum: fields[4].parse().ok()?,
                trace: fields[5].parse().ok()?,
                norm_trace: fields[6].parse().ok()?,
                weil_ratio: fields[7].parse().ok()?,
            })
        }
        Schema::Legacy => {
            if fields.len() != 6 {
                return None;
            }
            let p: u64 = fields[0].parse().ok()?;
            let trace: i64 = fields[3].parse().ok()?;
            // Migration fills: char_sum by the defining identity, the mod-5
            // class from p alone.
            Some(PrimeRecord {
                p,
                class_mod4: SplitClass::from_tag(fields[1])?,
                class_mod5: five_split_class(p),
                pisano_period: fields[2].parse().ok()?,
                char_sum: -trace,
                trace,
                norm_trace: fields[4].parse().ok()?,
                weil_ratio: fields[5].parse().ok()?,
            })
        }
    }
}

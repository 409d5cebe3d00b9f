//! Journal - balance change audit log
//!
//! Records every posted entry as one CSV row for complete auditability.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::money::format_amount;

use super::PostedEntry;

const HEADER: &str = "entry_id,posted_at,account_id,key,op,delta,balance_after";

/// Writes posted entries as CSV
pub struct JournalWriter<W: Write> {
    out: W,
    decimals: u32,
    entry_count: u64,
}

impl JournalWriter<BufWriter<File>> {
    /// Open the journal at `path` for appending, creating it if missing
    ///
    /// The header row is written only into an empty file, so successive runs
    /// extend one audit log.
    pub fn append(path: impl AsRef<Path>, decimals: u32) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let empty = file.metadata()?.len() == 0;
        Self::with_header(BufWriter::new(file), decimals, empty)
    }
}

impl<W: Write> JournalWriter<W> {
    /// Wrap a writer and emit the header row
    pub fn new(out: W, decimals: u32) -> io::Result<Self> {
        Self::with_header(out, decimals, true)
    }

    fn with_header(mut out: W, decimals: u32, header: bool) -> io::Result<Self> {
        if header {
            writeln!(out, "{}", HEADER)?;
        }
        Ok(Self {
            out,
            decimals,
            entry_count: 0,
        })
    }

    /// Write a single entry
    pub fn write_entry(&mut self, entry: &PostedEntry) -> io::Result<()> {
        writeln!(
            self.out,
            "{},{},{},{},{},{},{}",
            entry.entry_id,
            entry.posted_at.to_rfc3339(),
            entry.account_id,
            entry.key,
            entry.op(),
            format_amount(entry.delta, self.decimals),
            format_amount(entry.balance_after, self.decimals),
        )?;
        self.entry_count += 1;
        Ok(())
    }

    pub fn write_all<'a>(
        &mut self,
        entries: impl IntoIterator<Item = &'a PostedEntry>,
    ) -> io::Result<()> {
        for entry in entries {
            self.write_entry(entry)?;
        }
        Ok(())
    }

    /// Get total number of entries written
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

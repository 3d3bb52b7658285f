//! Mapping from instruction offsets to source lines
//!
//! Code objects describe their lines with one of three encodings (see [`LineTableFormat`]).
//! Whatever the encoding, the editor works on a list of [`LineEntry`]s that tile the code, and
//! re-encodes them once editing is done. The encoders produce exactly the bytes the runtime
//! expects to read, including the way long deltas are split across several entries.

use super::{Error, LineTableFormat};
use crate::util::varint::{read_signed_le, read_unsigned_le, write_signed_le};
use crate::util::Offset;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::ErrorKind;

/// Offset delta sentinel of the 3.10 table meaning "no line"
const NO_LINE_DELTA: i8 = -128;

/// Positions table entry codes (bits 3 to 6 of the control byte)
const POSITIONS_NO_LOCATION: u8 = 15;
const POSITIONS_LONG: u8 = 14;
const POSITIONS_NO_COLUMN: u8 = 13;
const POSITIONS_ONE_LINE_BASE: u8 = 10;

/// Maximum number of code units covered by one positions table entry
const POSITIONS_MAX_RUN: usize = 8;

/// Span of code attributed to a source line
///
/// A `number` of `None` means no line at all (eg. compiler-generated cleanup code).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LineEntry {
    pub start: Offset,
    pub end: Offset,
    pub number: Option<u32>,
}

impl LineEntry {
    pub fn new(start: Offset, end: Offset, number: Option<u32>) -> LineEntry {
        LineEntry { start, end, number }
    }

    /// Account for `length` bytes having been inserted at `at`
    ///
    /// Both ends only move if they are strictly after `at`, so code inserted where a line starts
    /// is attributed to that line and not to the one before it.
    pub fn adjust(&mut self, at: Offset, length: isize) {
        if self.start > at {
            self.start.shift(length);
        }
        if self.end > at {
            self.end.shift(length);
        }
    }

    /// Decode a line table into entries that tile the code
    ///
    /// `code_length` is needed because `co_lnotab` doesn't say where the last line ends.
    pub fn decode(
        format: LineTableFormat,
        first_line: u32,
        table: &[u8],
        code_length: usize,
    ) -> Result<Vec<LineEntry>, Error> {
        let (starts, end) = match format {
            LineTableFormat::Lnotab => (
                lnotab_line_starts(first_line, table, code_length)?,
                Offset(code_length),
            ),
            LineTableFormat::Linetable | LineTableFormat::Positions => {
                let ranges = if format == LineTableFormat::Linetable {
                    linetable_ranges(first_line, table)?
                } else {
                    positions_ranges(first_line, table)?
                };
                let end = ranges.last().map_or(Offset(0), |range| range.end);
                (line_starts(&ranges), end)
            }
        };

        let mut entries: Vec<LineEntry> = Vec::with_capacity(starts.len());
        for (idx, (start, number)) in starts.iter().enumerate() {
            let entry_end = starts.get(idx + 1).map_or(end, |(next, _)| *next);
            entries.push(LineEntry::new(*start, entry_end.max(*start), *number));
        }
        Ok(entries)
    }

    /// Encode entries into a line table
    pub fn encode(
        format: LineTableFormat,
        first_line: u32,
        entries: &[LineEntry],
    ) -> Result<Vec<u8>, Error> {
        let mut table = vec![];
        match format {
            LineTableFormat::Lnotab => write_lnotab(&mut table, first_line, entries)?,
            LineTableFormat::Linetable => write_linetable(&mut table, first_line, entries)?,
            LineTableFormat::Positions => write_positions(&mut table, first_line, entries)?,
        }
        Ok(table)
    }
}

/// Points at which line attribution changes
///
/// Empty ranges are skipped, and a start is only reported when the line differs from the one
/// before, which is how the runtime's `findlinestarts` sees things (except that changes to "no
/// line" are reported too).
pub fn line_starts(ranges: &[LineEntry]) -> Vec<(Offset, Option<u32>)> {
    let mut starts = vec![];
    let mut last: Option<Option<u32>> = None;
    for range in ranges.iter().filter(|range| range.start < range.end) {
        if last != Some(range.number) {
            starts.push((range.start, range.number));
            last = Some(range.number);
        }
    }
    starts
}

fn checked_line(offset: Offset, line: i64) -> Result<u32, Error> {
    u32::try_from(line).map_err(|_| Error::InvalidLineNumber { offset, line })
}

/// Line starts from a `co_lnotab`
fn lnotab_line_starts(
    first_line: u32,
    table: &[u8],
    code_length: usize,
) -> Result<Vec<(Offset, Option<u32>)>, Error> {
    if table.len() % 2 != 0 {
        return Err(Error::TruncatedLineTable {
            position: table.len() - 1,
        });
    }

    let mut starts = vec![];
    let mut last_line: Option<i64> = None;
    let mut line = first_line as i64;
    let mut address = 0;
    for pair in table.chunks_exact(2) {
        let address_delta = pair[0] as usize;
        let line_delta = pair[1] as i8;
        if address_delta != 0 {
            if last_line != Some(line) {
                starts.push((Offset(address), Some(checked_line(Offset(address), line)?)));
                last_line = Some(line);
            }
            address += address_delta;
            if address >= code_length {
                return Ok(starts);
            }
        }
        line += line_delta as i64;
    }
    if last_line != Some(line) {
        starts.push((Offset(address), Some(checked_line(Offset(address), line)?)));
    }
    Ok(starts)
}

/// Address ranges from a 3.10 `co_linetable`
fn linetable_ranges(first_line: u32, table: &[u8]) -> Result<Vec<LineEntry>, Error> {
    if table.len() % 2 != 0 {
        return Err(Error::TruncatedLineTable {
            position: table.len() - 1,
        });
    }

    let mut ranges = vec![];
    let mut line = first_line as i64;
    let mut end = Offset(0);
    for pair in table.chunks_exact(2) {
        let start = end;
        end = end.plus(pair[0] as usize);
        let line_delta = pair[1] as i8;
        let number = if line_delta == NO_LINE_DELTA {
            None
        } else {
            line += line_delta as i64;
            Some(checked_line(start, line)?)
        };
        ranges.push(LineEntry::new(start, end, number));
    }
    Ok(ranges)
}

/// Address ranges from a 3.11 positions table (columns are dropped)
fn positions_ranges(first_line: u32, table: &[u8]) -> Result<Vec<LineEntry>, Error> {
    let mut ranges = vec![];
    let mut line = first_line as i64;
    let mut end = Offset(0);
    let mut reader = table;
    while !reader.is_empty() {
        let position = table.len() - reader.len();
        let truncated = |_| Error::TruncatedLineTable { position };

        let control = reader.read_u8().map_err(truncated)?;
        if control & 0x80 == 0 {
            return Err(Error::MalformedLineTable {
                position,
                byte: control,
            });
        }
        let varint_error = |err: std::io::Error| match err.kind() {
            ErrorKind::InvalidData => Error::MalformedLineTable {
                position,
                byte: control,
            },
            _ => Error::TruncatedLineTable { position },
        };
        let code = (control >> 3) & 0xf;
        let words = (control & 0x7) as usize + 1;
        let start = end;
        end = end.plus(2 * words);

        let number = match code {
            POSITIONS_NO_LOCATION => None,
            POSITIONS_LONG => {
                line += read_signed_le(&mut reader).map_err(varint_error)? as i64;
                for _ in 0..3 {
                    read_unsigned_le(&mut reader).map_err(varint_error)?;
                }
                Some(line)
            }
            POSITIONS_NO_COLUMN => {
                line += read_signed_le(&mut reader).map_err(varint_error)? as i64;
                Some(line)
            }
            POSITIONS_ONE_LINE_BASE..=12 => {
                line += (code - POSITIONS_ONE_LINE_BASE) as i64;
                reader.read_u8().map_err(truncated)?;
                reader.read_u8().map_err(truncated)?;
                Some(line)
            }
            _ => {
                reader.read_u8().map_err(truncated)?;
                Some(line)
            }
        };
        let number = number.map(|line| checked_line(start, line)).transpose()?;
        ranges.push(LineEntry::new(start, end, number));
    }
    Ok(ranges)
}

/// `co_lnotab`: unsigned offset delta and signed line delta byte pairs
///
/// The format can't express code without a line, so such entries stay with the previous line.
fn write_lnotab<W: WriteBytesExt>(
    writer: &mut W,
    first_line: u32,
    entries: &[LineEntry],
) -> std::io::Result<()> {
    let mut prev_start = Offset(0);
    let mut prev_number = first_line as i64;
    for entry in entries {
        let number = match entry.number {
            Some(number) => number as i64,
            None => continue,
        };
        assert!(entry.start >= prev_start, "line entries are out of order");
        let mut delta_start = entry.start.0 - prev_start.0;
        let mut delta_number = number - prev_number;

        while delta_start > 255 {
            writer.write_u8(255)?;
            writer.write_i8(0)?;
            delta_start -= 255;
        }
        while delta_number > 127 {
            writer.write_u8(delta_start as u8)?;
            writer.write_i8(127)?;
            delta_start = 0;
            delta_number -= 127;
        }
        while delta_number < -128 {
            writer.write_u8(delta_start as u8)?;
            writer.write_i8(-128)?;
            delta_start = 0;
            delta_number += 128;
        }
        if delta_start != 0 || delta_number != 0 {
            writer.write_u8(delta_start as u8)?;
            writer.write_i8(delta_number as i8)?;
        }

        prev_start = entry.start;
        prev_number = number;
    }
    Ok(())
}

/// 3.10 `co_linetable`: offset delta and line delta byte pairs, `-128` meaning no line
fn write_linetable<W: WriteBytesExt>(
    writer: &mut W,
    first_line: u32,
    entries: &[LineEntry],
) -> std::io::Result<()> {
    let mut prev_end = Offset(0);
    let mut prev_number = first_line as i64;
    for entry in entries {
        assert!(entry.start >= prev_end, "line entries overlap");

        // Anything not covered by a line, including this entry if it has no line
        let gap_end = if entry.number.is_some() {
            entry.start
        } else {
            entry.end
        };
        let mut gap = gap_end.0 - prev_end.0;
        if gap > 0 {
            while gap > 254 {
                writer.write_u8(254)?;
                writer.write_i8(NO_LINE_DELTA)?;
                gap -= 254;
            }
            writer.write_u8(gap as u8)?;
            writer.write_i8(NO_LINE_DELTA)?;
            prev_end = gap_end;
        }
        let number = match entry.number {
            Some(number) => number as i64,
            None => continue,
        };

        let mut delta_end = entry.end.0 - prev_end.0;
        let mut delta_number = number - prev_number;
        while delta_number > 127 {
            writer.write_u8(0)?;
            writer.write_i8(127)?;
            delta_number -= 127;
        }
        while delta_number < -127 {
            writer.write_u8(0)?;
            writer.write_i8(-127)?;
            delta_number += 127;
        }
        while delta_end > 254 {
            writer.write_u8(254)?;
            writer.write_i8(delta_number as i8)?;
            delta_number = 0;
            delta_end -= 254;
        }
        writer.write_u8(delta_end as u8)?;
        writer.write_i8(delta_number as i8)?;

        prev_number = number;
        prev_end = entry.end;
    }
    Ok(())
}

/// 3.11 positions table, without any column information
fn write_positions<W: WriteBytesExt>(
    writer: &mut W,
    first_line: u32,
    entries: &[LineEntry],
) -> std::io::Result<()> {
    fn write_runs<W: WriteBytesExt>(
        writer: &mut W,
        code: u8,
        mut words: usize,
        mut line_delta: Option<i32>,
    ) -> std::io::Result<()> {
        while words > 0 {
            let run = words.min(POSITIONS_MAX_RUN);
            writer.write_u8(0x80 | (code << 3) | (run - 1) as u8)?;
            if let Some(delta) = line_delta {
                write_signed_le(writer, delta)?;
                line_delta = Some(0);
            }
            words -= run;
        }
        Ok(())
    }

    let mut prev_end = Offset(0);
    let mut prev_number = first_line as i64;
    for entry in entries {
        assert!(entry.start >= prev_end, "line entries overlap");
        match entry.number {
            None => {
                let words = (entry.end.0 - prev_end.0) / 2;
                write_runs(writer, POSITIONS_NO_LOCATION, words, None)?;
            }
            Some(number) => {
                let gap_words = (entry.start.0 - prev_end.0) / 2;
                write_runs(writer, POSITIONS_NO_LOCATION, gap_words, None)?;

                let words = (entry.end.0 - entry.start.0) / 2;
                if words > 0 {
                    let line_delta = i32::try_from(number as i64 - prev_number)
                        .expect("line delta overflow");
                    write_runs(writer, POSITIONS_NO_COLUMN, words, Some(line_delta))?;
                    prev_number = number as i64;
                }
            }
        }
        prev_end = entry.end;
    }
    Ok(())
}

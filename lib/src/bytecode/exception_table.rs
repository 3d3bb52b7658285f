use super::{Error, Profile, Serialize};
use crate::util::varint::{read_unsigned_be, write_unsigned_be};
use crate::util::Offset;
use byteorder::WriteBytesExt;
use std::io::ErrorKind;

/// Entry of the (3.11+) exception table
///
/// Instructions in `[start, end)` that raise jump to the handler at `target`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExceptionTableEntry {
    pub start: Offset,
    pub end: Offset,
    pub target: Offset,

    /// Stack depth and "push last instruction" flag, passed through unchanged
    pub other: u32,

    profile: Profile,
}

impl ExceptionTableEntry {
    pub fn new(
        start: Offset,
        end: Offset,
        target: Offset,
        other: u32,
        profile: Profile,
    ) -> ExceptionTableEntry {
        assert!(start <= end, "exception range ends before it starts");
        ExceptionTableEntry {
            start,
            end,
            target,
            other,
            profile,
        }
    }

    /// Decode a whole exception table
    ///
    /// The table must end on a record boundary: running out of bytes part way through a record
    /// is an error, not a shorter table. So is a value that does not fit in 32 bits.
    pub fn decode(table: &[u8], profile: Profile) -> Result<Vec<ExceptionTableEntry>, Error> {
        let unit = profile.jump_unit();
        let mut reader = table;
        let mut entries = vec![];
        while !reader.is_empty() {
            let record_start = table.len() - reader.len();
            let mut read_varint = || -> Result<u32, Error> {
                read_unsigned_be(&mut reader).map_err(|err| match err.kind() {
                    ErrorKind::InvalidData => Error::MalformedExceptionTable {
                        position: record_start,
                    },
                    _ => Error::TruncatedExceptionTable {
                        position: record_start,
                    },
                })
            };
            let start = read_varint()? as usize * unit;
            let length = read_varint()? as usize * unit;
            let target = read_varint()? as usize * unit;
            let other = read_varint()?;
            entries.push(ExceptionTableEntry::new(
                Offset(start),
                Offset(start + length),
                Offset(target),
                other,
                profile,
            ));
        }
        Ok(entries)
    }

    /// Encode a whole exception table
    pub fn encode(entries: &[ExceptionTableEntry]) -> Result<Vec<u8>, Error> {
        let mut table = vec![];
        entries.serialize(&mut table)?;
        Ok(table)
    }

    /// Account for `length` bytes having been inserted at `at`
    ///
    /// Code inserted right at the start of the protected range ends up outside of it, as does
    /// code inserted right at its end. A handler starting right at `at` does not move, so the
    /// inserted code runs before the handler.
    pub fn adjust(&mut self, at: Offset, length: isize) {
        if at <= self.start {
            self.start.shift(length);
        }
        if at < self.end {
            self.end.shift(length);
        }
        if at < self.target {
            self.target.shift(length);
        }
    }

    fn units(&self, bytes: usize) -> u32 {
        let unit = self.profile.jump_unit();
        assert_eq!(bytes % unit, 0, "exception table offset is not a whole unit");
        u32::try_from(bytes / unit).expect("exception table offset overflow")
    }
}

/// Record is four big-endian varints, the first of which is marked
impl Serialize for ExceptionTableEntry {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        write_unsigned_be(writer, self.units(self.start.0), true)?;
        write_unsigned_be(writer, self.units(self.end.0 - self.start.0), false)?;
        write_unsigned_be(writer, self.units(self.target.0), false)?;
        write_unsigned_be(writer, self.other, false)
    }
}

use crate::util::Offset;

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Instruction streams are made of 2-byte words
    OddCodeLength(usize),

    /// Exception table ended in the middle of the record starting at `position`
    TruncatedExceptionTable { position: usize },

    /// Exception table record at `position` holds a value past 32 bits
    MalformedExceptionTable { position: usize },

    /// Line table ended in the middle of an entry
    TruncatedLineTable { position: usize },

    /// Positions table entry did not start with a control byte, or holds a value past 32 bits
    MalformedLineTable { position: usize, byte: u8 },

    /// Line deltas accumulated to a line number that can't exist
    InvalidLineNumber { offset: Offset, line: i64 },

    /// Stack analysis found an opcode whose stack effect is unknown
    UnknownStackEffect { opcode: u8, offset: Offset },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

use std::fmt;
use std::ops::Sub;

/// Elements with a width in bytes of the instruction stream
pub trait Width {
    fn width(&self) -> usize;
}

/// Byte offset into an instruction stream
///
/// Every side structure of an edited function (jumps, exception table entries, line entries)
/// stores these instead of references into the buffer, since splicing moves things around.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Offset(pub usize);

impl Offset {
    /// Move this offset by a signed amount of bytes
    ///
    /// Panics if the result would be negative (that would mean an edit removed the code this
    /// offset points into).
    pub fn shift(&mut self, by: isize) {
        self.0 = self
            .0
            .checked_add_signed(by)
            .expect("offset shifted before the start of the code");
    }

    /// Offset that is `bytes` further along
    pub fn plus(self, bytes: usize) -> Offset {
        Offset(self.0 + bytes)
    }
}

impl Sub for Offset {
    type Output = isize;

    fn sub(self, other: Offset) -> isize {
        (self.0 as isize) - (other.0 as isize)
    }
}

impl fmt::Debug for Offset {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("@{}", self.0))
    }
}

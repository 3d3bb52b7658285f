use byteorder::WriteBytesExt;
use std::io::Result;

/// Utility trait for serializing parts of a code object
///
/// The tables of a code object are raw byte strings with no framing: a value is written
/// directly after the previous one, so there is no length prefix or tag to take care of.
pub trait Serialize {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

impl<A: Serialize> Serialize for [A] {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

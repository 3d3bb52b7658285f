//! Variable-length integers built from 6-bit chunks
//!
//! Every byte carries 6 bits of payload and uses `0x40` to signal that more chunks follow. The
//! line tables store chunks least-significant first while the exception table stores them
//! most-significant first, with `0x80` marking the first byte of each exception table record.
//! Both layouts must match the runtime bit for bit.

use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Error, ErrorKind, Result};

/// Continuation flag present on every chunk but the last
pub const CONTINUATION: u8 = 0x40;

/// Payload bits of a chunk
pub const CHUNK_MASK: u8 = 0x3f;

/// Marker on the first byte of an exception table record
pub const RECORD_START: u8 = 0x80;

/// Write an unsigned integer, least-significant chunk first
pub fn write_unsigned_le<W: WriteBytesExt>(writer: &mut W, mut value: u32) -> Result<()> {
    while value > CHUNK_MASK as u32 {
        writer.write_u8(CONTINUATION | (value as u8 & CHUNK_MASK))?;
        value >>= 6;
    }
    writer.write_u8(value as u8)
}

/// Write a signed integer, least-significant chunk first, after zig-zag encoding it
pub fn write_signed_le<W: WriteBytesExt>(writer: &mut W, value: i32) -> Result<()> {
    let zigzag = if value < 0 {
        (value.unsigned_abs() << 1) | 1
    } else {
        (value as u32) << 1
    };
    write_unsigned_le(writer, zigzag)
}

fn overflow() -> Error {
    Error::new(ErrorKind::InvalidData, "varint does not fit in 32 bits")
}

/// Read an unsigned integer written with [`write_unsigned_le`]
///
/// Chunks carrying bits past the 32nd are an `InvalidData` error.
pub fn read_unsigned_le<R: ReadBytesExt>(reader: &mut R) -> Result<u32> {
    let mut byte = reader.read_u8()?;
    let mut value = (byte & CHUNK_MASK) as u32;
    let mut shift: u32 = 0;
    while byte & CONTINUATION != 0 {
        byte = reader.read_u8()?;
        shift += 6;
        let chunk = (byte & CHUNK_MASK) as u32;
        if shift >= u32::BITS || chunk >> (u32::BITS - shift) != 0 {
            return Err(overflow());
        }
        value |= chunk << shift;
    }
    Ok(value)
}

/// Read a signed integer written with [`write_signed_le`]
pub fn read_signed_le<R: ReadBytesExt>(reader: &mut R) -> Result<i32> {
    let zigzag = read_unsigned_le(reader)?;
    let magnitude = (zigzag >> 1) as i32;
    Ok(if zigzag & 1 != 0 {
        -magnitude
    } else {
        magnitude
    })
}

/// Write an unsigned integer, most-significant chunk first
///
/// When `mark_first` is set, [`RECORD_START`] is added to the first byte written.
pub fn write_unsigned_be<W: WriteBytesExt>(
    writer: &mut W,
    value: u32,
    mark_first: bool,
) -> Result<()> {
    let bits = u32::BITS - value.leading_zeros();
    let chunks = ((bits + 5) / 6).max(1);
    for chunk in (0..chunks).rev() {
        let mut byte = (value >> (6 * chunk)) as u8 & CHUNK_MASK;
        if chunk != 0 {
            byte |= CONTINUATION;
        }
        if mark_first && chunk == chunks - 1 {
            byte |= RECORD_START;
        }
        writer.write_u8(byte)?;
    }
    Ok(())
}

/// Read an unsigned integer written with [`write_unsigned_be`]
///
/// The record marker is ignored. Running out of input before the terminal chunk is an
/// `UnexpectedEof` error, and a value past 32 bits is an `InvalidData` error.
pub fn read_unsigned_be<R: ReadBytesExt>(reader: &mut R) -> Result<u32> {
    let mut value: u32 = 0;
    loop {
        let byte = reader.read_u8()?;
        value |= (byte & CHUNK_MASK) as u32;
        if byte & CONTINUATION == 0 {
            return Ok(value);
        }
        if value >> (u32::BITS - 6) != 0 {
            return Err(overflow());
        }
        value <<= 6;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::ErrorKind;

    fn unsigned_le(value: u32) -> Vec<u8> {
        let mut bytes = vec![];
        write_unsigned_le(&mut bytes, value).unwrap();
        bytes
    }

    fn unsigned_be(value: u32, mark_first: bool) -> Vec<u8> {
        let mut bytes = vec![];
        write_unsigned_be(&mut bytes, value, mark_first).unwrap();
        bytes
    }

    #[test]
    fn little_endian_layout() {
        assert_eq!(unsigned_le(0), vec![0]);
        assert_eq!(unsigned_le(63), vec![63]);
        assert_eq!(unsigned_le(64), vec![0x40, 1]);
        assert_eq!(unsigned_le(4095), vec![0x7f, 0x3f]);
        assert_eq!(unsigned_le(4096), vec![0x40, 0x40, 1]);
    }

    #[test]
    fn big_endian_layout() {
        assert_eq!(unsigned_be(0, false), vec![0]);
        assert_eq!(unsigned_be(0, true), vec![0x80]);
        assert_eq!(unsigned_be(63, false), vec![63]);
        assert_eq!(unsigned_be(64, false), vec![0x41, 0]);
        assert_eq!(unsigned_be(64, true), vec![0xc1, 0]);
        assert_eq!(unsigned_be(4096, false), vec![0x41, 0x40, 0]);
    }

    #[test]
    fn signed_zigzag() {
        let mut bytes = vec![];
        write_signed_le(&mut bytes, 0).unwrap();
        write_signed_le(&mut bytes, 1).unwrap();
        write_signed_le(&mut bytes, -1).unwrap();
        write_signed_le(&mut bytes, -40).unwrap();
        assert_eq!(bytes, vec![0, 2, 3, 0x40 | 17, 1]);

        let mut reader = &bytes[..];
        assert_eq!(read_signed_le(&mut reader).unwrap(), 0);
        assert_eq!(read_signed_le(&mut reader).unwrap(), 1);
        assert_eq!(read_signed_le(&mut reader).unwrap(), -1);
        assert_eq!(read_signed_le(&mut reader).unwrap(), -40);
        assert!(reader.is_empty());
    }

    // 100_000 takes three chunks and 1_000_000 takes four
    #[test]
    fn multi_chunk_values() {
        for (value, chunks) in [(100_000, 3), (1_000_000, 4)] {
            let le = unsigned_le(value);
            assert_eq!(le.len(), chunks);
            assert_eq!(read_unsigned_le(&mut &le[..]).unwrap(), value);

            let be = unsigned_be(value, true);
            assert_eq!(be.len(), chunks);
            assert_eq!(be[0] & RECORD_START, RECORD_START);
            assert_eq!(read_unsigned_be(&mut &be[..]).unwrap(), value);
        }
    }

    #[test]
    fn big_endian_truncated() {
        let bytes = unsigned_be(1_000_000, false);
        let err = read_unsigned_be(&mut &bytes[..2]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);

        let err = read_unsigned_be(&mut &[0u8; 0][..]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn values_past_32_bits() {
        let le = unsigned_le(u32::MAX);
        assert_eq!(le, vec![0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 3]);
        assert_eq!(read_unsigned_le(&mut &le[..]).unwrap(), u32::MAX);
        let be = unsigned_be(u32::MAX, true);
        assert_eq!(read_unsigned_be(&mut &be[..]).unwrap(), u32::MAX);

        // Too many chunks, then a last chunk with bits past the top
        let long_chain = [0x40, 0x40, 0x40, 0x40, 0x40, 0x40, 0x40, 1];
        let err = read_unsigned_le(&mut &long_chain[..]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        let wide_top = [0x40, 0x40, 0x40, 0x40, 0x40, 4];
        let err = read_unsigned_le(&mut &wide_top[..]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        let long_chain = [0xc1, 0x40, 0x40, 0x40, 0x40, 0x40, 0];
        let err = read_unsigned_be(&mut &long_chain[..]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        let wide_top = [0xc4, 0x40, 0x40, 0x40, 0x40, 0];
        let err = read_unsigned_be(&mut &wide_top[..]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}

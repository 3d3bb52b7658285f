use super::opcodes::py311::CACHE;
use super::Profile;
use crate::util::{Offset, Width};
use byteorder::WriteBytesExt;
use std::io::Result;

/// Maximum number of `EXTENDED_ARG` prefixes an operand may use (operands are 32 bits)
pub const MAX_EXTENDED_ARGS: usize = 3;

/// Decoded instruction
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Instruction {
    /// Start of the instruction, including its first `EXTENDED_ARG` prefix (if any)
    pub offset: Offset,

    /// Length in bytes, including prefixes and inline caches
    pub length: usize,

    pub opcode: u8,

    /// Operand, with the bits from `EXTENDED_ARG` prefixes merged in
    pub arg: u32,
}

impl Width for Instruction {
    fn width(&self) -> usize {
        self.length
    }
}

/// Decode an instruction stream
///
/// Decoding is a pure function of the bytes, so it can be restarted on a buffer any time it
/// changes. A trailing odd byte is ignored (code objects validate their length upfront).
pub fn instructions(code: &[u8], profile: Profile) -> Instructions<'_> {
    Instructions {
        code,
        position: 0,
        profile,
    }
}

/// Iterator returned by [`instructions`]
#[derive(Clone)]
pub struct Instructions<'a> {
    code: &'a [u8],
    position: usize,
    profile: Profile,
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Instruction;

    fn next(&mut self) -> Option<Instruction> {
        let start = self.position;
        let mut extended_arg: u32 = 0;
        while self.position + 1 < self.code.len() {
            let opcode = self.code[self.position];
            let arg_byte = self.code[self.position + 1] as u32;
            self.position += 2;

            if self.profile.is_extended_arg(opcode) {
                extended_arg = (extended_arg | arg_byte) << 8;
                continue;
            }

            let caches = self.profile.inline_cache_entries(opcode);
            let remaining_words = (self.code.len() - self.position) / 2;
            self.position += 2 * caches.min(remaining_words);

            return Some(Instruction {
                offset: Offset(start),
                length: self.position - start,
                opcode,
                arg: extended_arg | arg_byte,
            });
        }
        None
    }
}

/// Number of `EXTENDED_ARG` prefixes required to express an operand
pub fn arg_ext_needed(arg: u32) -> usize {
    match arg {
        0 => 0,
        _ => (u32::BITS - 1 - arg.leading_zeros()) as usize / 8,
    }
}

/// Length in bytes of an instruction with a given number of prefixes
pub fn instruction_length(profile: Profile, opcode: u8, extended_args: usize) -> usize {
    2 + 2 * extended_args + 2 * profile.inline_cache_entries(opcode)
}

/// Encode an instruction, its `EXTENDED_ARG` prefixes, and its inline caches
///
/// At least `min_extended_args` prefixes are emitted, even if the operand doesn't need them
/// (this is how a jump keeps the length it was given). Panics if more than
/// [`MAX_EXTENDED_ARGS`] prefixes would be needed.
pub fn write_instruction<W: WriteBytesExt>(
    writer: &mut W,
    profile: Profile,
    opcode: u8,
    arg: u32,
    min_extended_args: usize,
) -> Result<()> {
    let extended_args = arg_ext_needed(arg).max(min_extended_args);
    assert!(
        extended_args <= MAX_EXTENDED_ARGS,
        "operand {} of opcode {} needs {} extended args",
        arg,
        opcode,
        extended_args
    );
    for i in (1..=extended_args).rev() {
        writer.write_u8(super::opcodes::EXTENDED_ARG)?;
        writer.write_u8((arg >> (8 * i)) as u8)?;
    }
    writer.write_u8(opcode)?;
    writer.write_u8(arg as u8)?;
    for _ in 0..profile.inline_cache_entries(opcode) {
        writer.write_u8(CACHE)?;
        writer.write_u8(0)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bytecode::opcodes::*;

    fn encode(profile: Profile, opcode: u8, arg: u32, min_extended_args: usize) -> Vec<u8> {
        let mut code = vec![];
        write_instruction(&mut code, profile, opcode, arg, min_extended_args).unwrap();
        code
    }

    #[test]
    fn extended_args_needed() {
        assert_eq!(arg_ext_needed(0), 0);
        assert_eq!(arg_ext_needed(255), 0);
        assert_eq!(arg_ext_needed(256), 1);
        assert_eq!(arg_ext_needed(0xffff), 1);
        assert_eq!(arg_ext_needed(0x10000), 2);
        assert_eq!(arg_ext_needed(0x1000000), 3);
        assert_eq!(arg_ext_needed(u32::MAX), 3);
    }

    #[test]
    fn encode_with_prefixes() {
        assert_eq!(encode(Profile::Python39, LOAD_CONST, 3, 0), vec![LOAD_CONST, 3]);
        assert_eq!(
            encode(Profile::Python39, LOAD_CONST, 0x1234, 0),
            vec![EXTENDED_ARG, 0x12, LOAD_CONST, 0x34]
        );
        assert_eq!(
            encode(Profile::Python39, JUMP_FORWARD, 2, 2),
            vec![EXTENDED_ARG, 0, EXTENDED_ARG, 0, JUMP_FORWARD, 2]
        );
        assert_eq!(
            encode(Profile::Python311, LOAD_GLOBAL, 1, 0),
            vec![LOAD_GLOBAL, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    #[should_panic(expected = "extended args")]
    fn encode_too_many_prefixes() {
        encode(Profile::Python39, LOAD_CONST, 1, 4);
    }

    #[test]
    fn decode_merges_prefixes() {
        let code = [
            LOAD_CONST, 1, EXTENDED_ARG, 1, EXTENDED_ARG, 2, LOAD_FAST, 3, RETURN_VALUE, 0,
        ];
        let decoded: Vec<(usize, usize, u8, u32)> = instructions(&code, Profile::Python39)
            .map(|insn| (insn.offset.0, insn.length, insn.opcode, insn.arg))
            .collect();
        assert_eq!(
            decoded,
            vec![
                (0, 2, LOAD_CONST, 1),
                (2, 6, LOAD_FAST, 0x10203),
                (8, 2, RETURN_VALUE, 0),
            ]
        );
    }

    #[test]
    fn decode_merges_quick_prefixes() {
        let code = [py311::EXTENDED_ARG_QUICK, 1, LOAD_FAST, 2, RETURN_VALUE, 0];
        let decoded: Vec<(usize, usize, u8, u32)> = instructions(&code, Profile::Python311)
            .map(|insn| (insn.offset.0, insn.length, insn.opcode, insn.arg))
            .collect();
        assert_eq!(
            decoded,
            vec![(0, 4, LOAD_FAST, 0x102), (4, 2, RETURN_VALUE, 0)]
        );
    }

    #[test]
    fn decode_skips_inline_caches() {
        let mut code = vec![];
        write_instruction(&mut code, Profile::Python311, py311::RESUME, 0, 0).unwrap();
        write_instruction(&mut code, Profile::Python311, LOAD_GLOBAL, 0x101, 0).unwrap();
        write_instruction(&mut code, Profile::Python311, RETURN_VALUE, 0, 0).unwrap();

        let decoded: Vec<(usize, usize, u8, u32)> = instructions(&code, Profile::Python311)
            .map(|insn| (insn.offset.0, insn.length, insn.opcode, insn.arg))
            .collect();
        assert_eq!(
            decoded,
            vec![
                (0, 2, py311::RESUME, 0),
                (2, 14, LOAD_GLOBAL, 0x101),
                (16, 2, RETURN_VALUE, 0),
            ]
        );

        // Decoding is restartable and consumes the whole stream
        let restarted = instructions(&code, Profile::Python311);
        assert_eq!(restarted.map(|insn| insn.width()).sum::<usize>(), code.len());
    }
}

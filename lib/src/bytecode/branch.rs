use super::{arg_ext_needed, instruction_length, instructions, write_instruction};
use super::{Instruction, Profile, Serialize};
use crate::util::{Offset, Width};
use byteorder::WriteBytesExt;

/// Jump instruction in the code being edited
///
/// The target is always stored as an absolute offset, and the operand is recomputed from the
/// current `offset`/`length`/`target` whenever it is needed. That way, shifting any of the three
/// (see [`Branch::adjust`]) can never leave a stale operand behind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Branch {
    /// Start of the instruction, including its first `EXTENDED_ARG`
    pub offset: Offset,

    /// Length of the instruction, including any `EXTENDED_ARG` prefixes
    pub length: usize,

    pub opcode: u8,

    /// Absolute offset jumped to
    pub target: Offset,

    /// Is the operand relative to the next instruction (vs. absolute)?
    pub is_relative: bool,

    /// Is the relative operand counted backwards?
    pub is_backward: bool,

    profile: Profile,
}

impl Branch {
    /// Make a branch from a decoded jump instruction
    pub fn new(insn: &Instruction, profile: Profile) -> Branch {
        let is_relative = profile.is_relative_jump(insn.opcode);
        let is_backward = profile.is_backward_jump(insn.opcode);
        let distance = insn.arg as usize * profile.jump_unit();
        let next = insn.offset.plus(insn.length);
        let target = if !is_relative {
            Offset(distance)
        } else if is_backward {
            Offset(
                next.0
                    .checked_sub(distance)
                    .expect("backward jump before start of code"),
            )
        } else {
            next.plus(distance)
        };
        Branch {
            offset: insn.offset,
            length: insn.length,
            opcode: insn.opcode,
            target,
            is_relative,
            is_backward,
            profile,
        }
    }

    /// Find all of the branches in some code
    pub fn from_code(code: &[u8], profile: Profile) -> Vec<Branch> {
        instructions(code, profile)
            .filter(|insn| profile.is_jump(insn.opcode))
            .map(|insn| Branch::new(&insn, profile))
            .collect()
    }

    /// Operand that encodes the current target from the current position
    pub fn current_operand(&self) -> u32 {
        let distance = if self.is_relative {
            let next = self.offset.plus(self.length);
            (self.target - next).unsigned_abs()
        } else {
            self.target.0
        };
        let unit = self.profile.jump_unit();
        assert_eq!(distance % unit, 0, "jump distance is not a whole unit");
        u32::try_from(distance / unit).expect("jump operand overflow")
    }

    /// Account for `length` bytes having been inserted at `at` (or removed, if negative)
    ///
    /// An instruction starting exactly at `at` moves (the new code is placed before it), but a
    /// target exactly at `at` doesn't (jumping there now runs the new code first).
    pub fn adjust(&mut self, at: Offset, length: isize) {
        if self.offset >= at {
            self.offset.shift(length);
        }
        if self.target > at {
            self.target.shift(length);
        }
    }

    /// Grow the instruction if its operand now needs more `EXTENDED_ARG` prefixes
    ///
    /// The extra bytes are meant to be inserted at `offset` (before the opcode), so a forward
    /// target is moved along with them. Returns the number of bytes grown.
    pub fn grow_if_needed(&mut self) -> usize {
        let length_needed =
            instruction_length(self.profile, self.opcode, arg_ext_needed(self.current_operand()));
        if length_needed <= self.length {
            return 0;
        }
        let growth = length_needed - self.length;
        if self.target > self.offset {
            self.target = self.target.plus(growth);
        }
        self.length = length_needed;
        growth
    }

    /// Offset of the opcode byte (after the prefixes)
    pub fn opcode_offset(&self) -> Offset {
        let caches = self.profile.inline_cache_entries(self.opcode);
        self.offset.plus(self.length - 2 - 2 * caches)
    }

    fn extended_args(&self) -> usize {
        (self.length - instruction_length(self.profile, self.opcode, 0)) / 2
    }
}

impl Width for Branch {
    fn width(&self) -> usize {
        self.length
    }
}

/// Encodes the branch using exactly `length` bytes
impl Serialize for Branch {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let arg = self.current_operand();
        assert!(
            arg_ext_needed(arg) <= self.extended_args(),
            "branch at {:?} is too short for operand {}",
            self.offset,
            arg
        );
        write_instruction(writer, self.profile, self.opcode, arg, self.extended_args())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bytecode::opcodes::*;

    fn emit(branch: &Branch) -> Vec<u8> {
        let mut code = vec![];
        branch.serialize(&mut code).unwrap();
        code
    }

    fn jump(profile: Profile, offset: usize, opcode: u8, arg: u32) -> Branch {
        let mut code = vec![];
        write_instruction(&mut code, profile, opcode, arg, 0).unwrap();
        Branch::new(
            &Instruction {
                offset: Offset(offset),
                length: code.len(),
                opcode,
                arg,
            },
            profile,
        )
    }

    #[test]
    fn targets() {
        let forward = jump(Profile::Python39, 10, JUMP_FORWARD, 6);
        assert_eq!(forward.target, Offset(18));
        assert!(forward.is_relative && !forward.is_backward);

        let absolute = jump(Profile::Python39, 10, py39::JUMP_ABSOLUTE, 4);
        assert_eq!(absolute.target, Offset(4));
        assert!(!absolute.is_relative);

        let absolute = jump(Profile::Python310, 10, py39::POP_JUMP_IF_TRUE, 4);
        assert_eq!(absolute.target, Offset(8));

        let backward = jump(Profile::Python311, 20, py311::JUMP_BACKWARD, 5);
        assert_eq!(backward.target, Offset(12));
        assert!(backward.is_relative && backward.is_backward);

        let forward = jump(Profile::Python311, 20, py311::POP_JUMP_FORWARD_IF_NONE, 5);
        assert_eq!(forward.target, Offset(32));
    }

    #[test]
    fn operand_is_recomputed() {
        for branch in [
            jump(Profile::Python39, 10, JUMP_FORWARD, 6),
            jump(Profile::Python39, 10, py39::JUMP_ABSOLUTE, 300),
            jump(Profile::Python310, 10, FOR_ITER, 7),
            jump(Profile::Python311, 20, py311::JUMP_BACKWARD, 5),
        ] {
            let code = emit(&branch);
            let decoded: Vec<Instruction> = instructions(&code, branch.profile).collect();
            assert_eq!(decoded.len(), 1);
            assert_eq!(decoded[0].length, branch.length);
            assert_eq!(decoded[0].opcode, branch.opcode);
            assert_eq!(decoded[0].arg, branch.current_operand());
        }
    }

    #[test]
    fn adjust_boundaries() {
        // Jump at 10 to 18
        let mut branch = jump(Profile::Python39, 10, JUMP_FORWARD, 6);

        // Target exactly at the insertion point stays put
        branch.adjust(Offset(18), 4);
        assert_eq!((branch.offset, branch.target), (Offset(10), Offset(18)));

        // Instruction exactly at the insertion point moves
        branch.adjust(Offset(10), 4);
        assert_eq!((branch.offset, branch.target), (Offset(14), Offset(22)));
        assert_eq!(branch.current_operand(), 6);

        // Insertion before both
        branch.adjust(Offset(0), 2);
        assert_eq!((branch.offset, branch.target), (Offset(16), Offset(24)));

        // Insertion between the jump and its target
        branch.adjust(Offset(20), 100);
        assert_eq!(branch.current_operand(), 106);
    }

    #[test]
    fn growing_forward_jump() {
        let mut branch = jump(Profile::Python39, 10, JUMP_FORWARD, 200);
        assert_eq!(branch.grow_if_needed(), 0);

        // Insertion of 100 bytes between the jump and its target needs one prefix
        branch.adjust(Offset(20), 100);
        assert_eq!(branch.current_operand(), 300);
        assert_eq!(branch.grow_if_needed(), 2);
        assert_eq!(branch.length, 4);
        assert_eq!(branch.target, Offset(314));
        assert_eq!(branch.current_operand(), 300);
        assert_eq!(branch.grow_if_needed(), 0);

        let code = emit(&branch);
        assert_eq!(code, vec![EXTENDED_ARG, 1, JUMP_FORWARD, 44]);
        assert_eq!(code[branch.opcode_offset().0 - branch.offset.0], JUMP_FORWARD);
    }

    #[test]
    fn growing_backward_jump() {
        // Backward jump from 510 to 0 (operand 256 in words needs a prefix already)
        let mut branch = jump(Profile::Python311, 508, py311::JUMP_BACKWARD, 255);
        assert_eq!(branch.target, Offset(0));
        assert_eq!(branch.length, 2);

        branch.adjust(Offset(100), 2);
        assert_eq!(branch.current_operand(), 256);
        assert_eq!(branch.grow_if_needed(), 2);
        assert_eq!(branch.target, Offset(0));
        assert_eq!(branch.current_operand(), 257);

        let code = emit(&branch);
        let decoded: Vec<Instruction> = instructions(&code, Profile::Python311).collect();
        assert_eq!(decoded[0].length, 4);
        assert_eq!(decoded[0].arg, 257);
    }

    #[test]
    fn keeps_length_when_shrinking() {
        let mut branch = jump(Profile::Python39, 0, JUMP_FORWARD, 300);
        assert_eq!(branch.length, 4);
        branch.adjust(Offset(10), -200);
        assert_eq!(branch.grow_if_needed(), 0);
        assert_eq!(emit(&branch), vec![EXTENDED_ARG, 0, JUMP_FORWARD, 100]);
    }

    #[test]
    #[should_panic(expected = "too short")]
    fn emit_asserts_fit() {
        let mut branch = jump(Profile::Python39, 0, JUMP_FORWARD, 10);
        branch.target = Offset(1000);
        emit(&branch);
    }
}

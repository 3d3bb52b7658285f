use super::{instructions, Error, Profile};

/// Maximum operand stack depth reached by executing `code` from top to bottom
///
/// This assumes straight-line execution: jumps are treated as falling through and nothing is
/// carried around loops. That is exact for the loop-free call sequences the editor inserts,
/// which is what this is for. The result is relative to the depth on entry, and never negative.
pub fn max_stack_for(code: &[u8], profile: Profile) -> Result<u32, Error> {
    let mut max_stack: i64 = 0;
    let mut stack: i64 = 0;
    for insn in instructions(code, profile) {
        let effect = profile
            .stack_effect(insn.opcode, insn.arg)
            .ok_or(Error::UnknownStackEffect {
                opcode: insn.opcode,
                offset: insn.offset,
            })?;
        stack += effect as i64;
        max_stack = max_stack.max(stack);
    }
    Ok(max_stack as u32)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bytecode::opcodes::*;
    use crate::bytecode::write_instruction;
    use crate::util::Offset;

    fn assemble(profile: Profile, insns: &[(u8, u32)]) -> Vec<u8> {
        let mut code = vec![];
        for (opcode, arg) in insns {
            write_instruction(&mut code, profile, *opcode, *arg, 0).unwrap();
        }
        code
    }

    // push 3, pop 2 into a tuple, push 3 more, pop everything
    #[test]
    fn known_peak() {
        let code = assemble(
            Profile::Python39,
            &[
                (LOAD_CONST, 0),
                (LOAD_CONST, 1),
                (LOAD_CONST, 2),
                (BUILD_TUPLE, 3),
                (LOAD_FAST, 0),
                (LOAD_FAST, 1),
                (LOAD_FAST, 2),
                (BUILD_LIST, 4),
                (POP_TOP, 0),
            ],
        );
        assert_eq!(max_stack_for(&code, Profile::Python39).unwrap(), 4);
    }

    #[test]
    fn call_sequences() {
        let code = assemble(
            Profile::Python311,
            &[
                (NOP, 0),
                (py311::PUSH_NULL, 0),
                (LOAD_CONST, 300),
                (LOAD_CONST, 1),
                (LOAD_CONST, 2),
                (py311::PRECALL, 2),
                (py311::CALL, 2),
                (POP_TOP, 0),
            ],
        );
        assert_eq!(max_stack_for(&code, Profile::Python311).unwrap(), 4);

        let code = assemble(
            Profile::Python310,
            &[
                (LOAD_CONST, 0),
                (LOAD_CONST, 1),
                (py39::CALL_FUNCTION, 1),
                (POP_TOP, 0),
            ],
        );
        assert_eq!(max_stack_for(&code, Profile::Python310).unwrap(), 2);
    }

    #[test]
    fn never_negative() {
        let code = assemble(Profile::Python39, &[(POP_TOP, 0), (POP_TOP, 0)]);
        assert_eq!(max_stack_for(&code, Profile::Python39).unwrap(), 0);
    }

    #[test]
    fn unknown_opcode() {
        let code = [NOP, 0, 250, 0];
        match max_stack_for(&code, Profile::Python39) {
            Err(Error::UnknownStackEffect { opcode, offset }) => {
                assert_eq!(opcode, 250);
                assert_eq!(offset, Offset(2));
            }
            other => panic!("expected unknown stack effect, got {:?}", other),
        }
    }
}

//! Opcode numbers and per-generation opcode properties
//!
//! Only the opcodes that the editor needs to recognize or emit are listed, along with the usual
//! instructions that show up around them (so that stack analysis covers realistic sequences).
//! Stack effects are the larger of the "jumps" and "falls through" effects, which is what a
//! straight-line analysis needs.

/// Opcodes with the same number in every supported generation
pub const POP_TOP: u8 = 1;
pub const NOP: u8 = 9;
pub const GET_ITER: u8 = 68;
pub const RETURN_VALUE: u8 = 83;
pub const STORE_NAME: u8 = 90;
pub const FOR_ITER: u8 = 93;
pub const STORE_GLOBAL: u8 = 97;
pub const LOAD_CONST: u8 = 100;
pub const LOAD_NAME: u8 = 101;
pub const BUILD_TUPLE: u8 = 102;
pub const BUILD_LIST: u8 = 103;
pub const LOAD_ATTR: u8 = 106;
pub const COMPARE_OP: u8 = 107;
pub const IMPORT_NAME: u8 = 108;
pub const JUMP_FORWARD: u8 = 110;
pub const JUMP_IF_FALSE_OR_POP: u8 = 111;
pub const JUMP_IF_TRUE_OR_POP: u8 = 112;
pub const LOAD_GLOBAL: u8 = 116;
pub const LOAD_FAST: u8 = 124;
pub const STORE_FAST: u8 = 125;
pub const EXTENDED_ARG: u8 = 144;
pub const LOAD_METHOD: u8 = 160;

/// Effects shared by all generations
fn common_stack_effect(opcode: u8, arg: u32) -> Option<i32> {
    let effect = match opcode {
        NOP | EXTENDED_ARG | GET_ITER | LOAD_ATTR | JUMP_FORWARD => 0,
        JUMP_IF_FALSE_OR_POP | JUMP_IF_TRUE_OR_POP => 0,
        POP_TOP | RETURN_VALUE | STORE_NAME | STORE_GLOBAL | STORE_FAST => -1,
        COMPARE_OP | IMPORT_NAME => -1,
        LOAD_CONST | LOAD_NAME | LOAD_FAST | LOAD_METHOD | FOR_ITER => 1,
        BUILD_TUPLE | BUILD_LIST => 1 - arg as i32,
        _ => return None,
    };
    Some(effect)
}

/// CPython 3.9 and 3.10
pub mod py39 {
    pub use super::*;

    pub const ROT_TWO: u8 = 2;
    pub const ROT_THREE: u8 = 3;
    pub const DUP_TOP: u8 = 4;
    pub const BINARY_ADD: u8 = 23;
    pub const BINARY_SUBTRACT: u8 = 24;
    pub const BINARY_SUBSCR: u8 = 25;
    pub const POP_BLOCK: u8 = 87;
    pub const JUMP_ABSOLUTE: u8 = 113;
    pub const POP_JUMP_IF_FALSE: u8 = 114;
    pub const POP_JUMP_IF_TRUE: u8 = 115;
    pub const JUMP_IF_NOT_EXC_MATCH: u8 = 121;
    pub const SETUP_FINALLY: u8 = 122;
    pub const CALL_FUNCTION: u8 = 131;
    pub const LOAD_DEREF: u8 = 136;
    pub const SETUP_WITH: u8 = 143;
    pub const SETUP_ASYNC_WITH: u8 = 154;
    pub const CALL_METHOD: u8 = 161;

    pub fn is_relative_jump(opcode: u8) -> bool {
        matches!(
            opcode,
            FOR_ITER | JUMP_FORWARD | SETUP_FINALLY | SETUP_WITH | SETUP_ASYNC_WITH
        )
    }

    pub fn is_absolute_jump(opcode: u8) -> bool {
        matches!(
            opcode,
            JUMP_IF_FALSE_OR_POP
                | JUMP_IF_TRUE_OR_POP
                | JUMP_ABSOLUTE
                | POP_JUMP_IF_FALSE
                | POP_JUMP_IF_TRUE
                | JUMP_IF_NOT_EXC_MATCH
        )
    }

    pub fn stack_effect(opcode: u8, arg: u32) -> Option<i32> {
        let effect = match opcode {
            ROT_TWO | ROT_THREE | POP_BLOCK | JUMP_ABSOLUTE => 0,
            DUP_TOP | LOAD_GLOBAL | LOAD_DEREF => 1,
            BINARY_ADD | BINARY_SUBTRACT | BINARY_SUBSCR => -1,
            POP_JUMP_IF_FALSE | POP_JUMP_IF_TRUE => -1,
            JUMP_IF_NOT_EXC_MATCH => -2,
            SETUP_FINALLY | SETUP_WITH => 6,
            SETUP_ASYNC_WITH => 5,
            CALL_FUNCTION => -(arg as i32),
            CALL_METHOD => -(arg as i32) - 1,
            _ => return common_stack_effect(opcode, arg),
        };
        Some(effect)
    }
}

/// CPython 3.11
pub mod py311 {
    pub use super::*;

    pub const CACHE: u8 = 0;
    pub const PUSH_NULL: u8 = 2;
    pub const BINARY_SUBSCR: u8 = 25;
    /// Operand prefix the specializing interpreter swaps in for `EXTENDED_ARG`
    pub const EXTENDED_ARG_QUICK: u8 = 34;
    pub const STORE_SUBSCR: u8 = 60;
    pub const UNPACK_SEQUENCE: u8 = 92;
    pub const STORE_ATTR: u8 = 95;
    pub const SWAP: u8 = 99;
    pub const POP_JUMP_FORWARD_IF_FALSE: u8 = 114;
    pub const POP_JUMP_FORWARD_IF_TRUE: u8 = 115;
    pub const COPY: u8 = 120;
    pub const BINARY_OP: u8 = 122;
    pub const SEND: u8 = 123;
    pub const POP_JUMP_FORWARD_IF_NOT_NONE: u8 = 128;
    pub const POP_JUMP_FORWARD_IF_NONE: u8 = 129;
    pub const JUMP_BACKWARD_NO_INTERRUPT: u8 = 134;
    pub const LOAD_DEREF: u8 = 137;
    pub const JUMP_BACKWARD: u8 = 140;
    pub const RESUME: u8 = 151;
    pub const PRECALL: u8 = 166;
    pub const CALL: u8 = 171;
    pub const KW_NAMES: u8 = 172;
    pub const POP_JUMP_BACKWARD_IF_NOT_NONE: u8 = 173;
    pub const POP_JUMP_BACKWARD_IF_NONE: u8 = 174;
    pub const POP_JUMP_BACKWARD_IF_FALSE: u8 = 175;
    pub const POP_JUMP_BACKWARD_IF_TRUE: u8 = 176;

    /// Number of `CACHE` words following an opcode
    pub fn inline_cache_entries(opcode: u8) -> usize {
        match opcode {
            BINARY_SUBSCR | LOAD_ATTR | STORE_ATTR | CALL => 4,
            STORE_SUBSCR | UNPACK_SEQUENCE | BINARY_OP | PRECALL => 1,
            COMPARE_OP => 2,
            LOAD_GLOBAL => 5,
            LOAD_METHOD => 10,
            _ => 0,
        }
    }

    pub fn is_backward_jump(opcode: u8) -> bool {
        matches!(
            opcode,
            JUMP_BACKWARD_NO_INTERRUPT
                | JUMP_BACKWARD
                | POP_JUMP_BACKWARD_IF_NOT_NONE
                | POP_JUMP_BACKWARD_IF_NONE
                | POP_JUMP_BACKWARD_IF_FALSE
                | POP_JUMP_BACKWARD_IF_TRUE
        )
    }

    /// Every 3.11 jump is relative
    pub fn is_relative_jump(opcode: u8) -> bool {
        is_backward_jump(opcode)
            || matches!(
                opcode,
                FOR_ITER
                    | JUMP_FORWARD
                    | JUMP_IF_FALSE_OR_POP
                    | JUMP_IF_TRUE_OR_POP
                    | POP_JUMP_FORWARD_IF_FALSE
                    | POP_JUMP_FORWARD_IF_TRUE
                    | SEND
                    | POP_JUMP_FORWARD_IF_NOT_NONE
                    | POP_JUMP_FORWARD_IF_NONE
            )
    }

    pub fn stack_effect(opcode: u8, arg: u32) -> Option<i32> {
        let effect = match opcode {
            CACHE | SWAP | RESUME | KW_NAMES | SEND => 0,
            JUMP_BACKWARD | JUMP_BACKWARD_NO_INTERRUPT => 0,
            PUSH_NULL | COPY | LOAD_DEREF => 1,
            BINARY_SUBSCR | BINARY_OP | CALL => -1,
            STORE_SUBSCR => -3,
            STORE_ATTR => -2,
            UNPACK_SEQUENCE => arg as i32 - 1,
            POP_JUMP_FORWARD_IF_FALSE | POP_JUMP_FORWARD_IF_TRUE => -1,
            POP_JUMP_FORWARD_IF_NOT_NONE | POP_JUMP_FORWARD_IF_NONE => -1,
            POP_JUMP_BACKWARD_IF_NOT_NONE | POP_JUMP_BACKWARD_IF_NONE => -1,
            POP_JUMP_BACKWARD_IF_FALSE | POP_JUMP_BACKWARD_IF_TRUE => -1,
            LOAD_GLOBAL => 1 + (arg & 1) as i32,
            PRECALL => -(arg as i32),
            _ => return common_stack_effect(opcode, arg),
        };
        Some(effect)
    }
}

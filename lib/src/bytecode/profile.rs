use super::opcodes;

/// Bytecode encoding generation of the target runtime
///
/// Everything that differs between generations hangs off of this: how jump operands are scaled,
/// whether there are inline caches, whether there is an exception table, and which line table
/// format gets emitted.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Profile {
    /// CPython 3.9: jump operands in bytes, `co_lnotab`
    Python39,

    /// CPython 3.10: jump operands in words, `co_linetable`
    Python310,

    /// CPython 3.11: relative jumps only, inline caches, exception table, positions table
    Python311,
}

impl Profile {
    /// Profile for a runtime version, if it is supported
    pub fn from_version(major: u8, minor: u8) -> Option<Profile> {
        match (major, minor) {
            (3, 9) => Some(Profile::Python39),
            (3, 10) => Some(Profile::Python310),
            (3, 11) => Some(Profile::Python311),
            _ => None,
        }
    }

    /// Number of raw bytes represented by one unit of a jump operand
    pub fn jump_unit(self) -> usize {
        match self {
            Profile::Python39 => 1,
            Profile::Python310 | Profile::Python311 => 2,
        }
    }

    /// Are instructions followed by `CACHE` words?
    pub fn has_inline_caches(self) -> bool {
        matches!(self, Profile::Python311)
    }

    /// Do code objects carry an exception table?
    pub fn has_exception_table(self) -> bool {
        matches!(self, Profile::Python311)
    }

    pub fn line_table_format(self) -> LineTableFormat {
        match self {
            Profile::Python39 => LineTableFormat::Lnotab,
            Profile::Python310 => LineTableFormat::Linetable,
            Profile::Python311 => LineTableFormat::Positions,
        }
    }

    /// Number of `CACHE` words trailing an opcode
    pub fn inline_cache_entries(self, opcode: u8) -> usize {
        if self.has_inline_caches() {
            opcodes::py311::inline_cache_entries(opcode)
        } else {
            0
        }
    }

    /// Is this opcode an operand extension prefix?
    pub fn is_extended_arg(self, opcode: u8) -> bool {
        match self {
            Profile::Python39 | Profile::Python310 => opcode == opcodes::EXTENDED_ARG,
            Profile::Python311 => {
                opcode == opcodes::EXTENDED_ARG || opcode == opcodes::py311::EXTENDED_ARG_QUICK
            }
        }
    }

    /// Is this a jump whose operand is relative to the next instruction?
    pub fn is_relative_jump(self, opcode: u8) -> bool {
        match self {
            Profile::Python39 | Profile::Python310 => opcodes::py39::is_relative_jump(opcode),
            Profile::Python311 => opcodes::py311::is_relative_jump(opcode),
        }
    }

    /// Is this a jump whose operand is an absolute position?
    pub fn is_absolute_jump(self, opcode: u8) -> bool {
        match self {
            Profile::Python39 | Profile::Python310 => opcodes::py39::is_absolute_jump(opcode),
            Profile::Python311 => false,
        }
    }

    /// Is this a relative jump counting backwards from the next instruction?
    pub fn is_backward_jump(self, opcode: u8) -> bool {
        match self {
            Profile::Python39 | Profile::Python310 => false,
            Profile::Python311 => opcodes::py311::is_backward_jump(opcode),
        }
    }

    pub fn is_jump(self, opcode: u8) -> bool {
        self.is_relative_jump(opcode) || self.is_absolute_jump(opcode)
    }

    /// Stack effect of an instruction (the larger of the jumping and falling through effects)
    pub fn stack_effect(self, opcode: u8, arg: u32) -> Option<i32> {
        match self {
            Profile::Python39 | Profile::Python310 => opcodes::py39::stack_effect(opcode, arg),
            Profile::Python311 => opcodes::py311::stack_effect(opcode, arg),
        }
    }
}

/// Line table encodings, one per [`Profile`]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LineTableFormat {
    /// Pairs of unsigned offset delta and signed line delta (`co_lnotab`)
    Lnotab,

    /// Pairs of offset delta and line delta, where `-128` means "no line" (3.10 `co_linetable`)
    Linetable,

    /// Run-length table of code units to locations (3.11 `co_linetable`)
    Positions,
}

/// Configuration of an editing session
#[derive(Clone, Debug)]
pub struct Settings {
    /// Encoding generation of the code being edited (and emitted)
    pub profile: Profile,

    /// Start every inserted call with a `NOP` whose operand is the length of the rest of the
    /// call, so that it can later be turned into a `JUMP_FORWARD` that skips the probe
    pub deinstrument_slot: bool,
}

impl Settings {
    pub fn new(profile: Profile) -> Settings {
        Settings {
            profile,
            deinstrument_slot: true,
        }
    }
}

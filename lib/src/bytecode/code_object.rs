use super::{Error, ExceptionTableEntry, LineEntry, Profile};
use bitflags::bitflags;

bitflags! {
    /// Flags on code objects (`co_flags`)
    pub struct CodeFlags: u32 {
        const OPTIMIZED = 0x0001;
        const NEWLOCALS = 0x0002;
        const VARARGS = 0x0004;
        const VARKEYWORDS = 0x0008;
        const NESTED = 0x0010;
        const GENERATOR = 0x0020;
        const NOFREE = 0x0040;
        const COROUTINE = 0x0080;
        const ITERABLE_COROUTINE = 0x0100;
        const ASYNC_GENERATOR = 0x0200;
    }
}

/// Function body along with everything needed to run it
///
/// The constant type `C` is left to the caller, since constants can be anything the host runtime
/// can represent. Only `code`, `consts`, `stack_size`, `line_table`, and `exception_table` are
/// ever rewritten by the [`super::Editor`].
#[derive(Clone, Debug)]
pub struct CodeObject<C> {
    /// Instruction stream
    pub code: Vec<u8>,
    pub consts: Vec<C>,

    /// Names referred to by global and attribute lookups
    pub names: Vec<String>,

    /// Line of the first instruction, from which the line table counts
    pub first_line: u32,

    /// Encoded line table, in the format of the code's [`Profile`]
    pub line_table: Vec<u8>,

    /// Encoded exception table (always empty before 3.11)
    pub exception_table: Vec<u8>,

    /// Maximum operand stack depth
    pub stack_size: u32,

    pub name: String,
    pub qualified_name: String,
    pub filename: String,
    pub arg_count: u32,
    pub posonly_arg_count: u32,
    pub kwonly_arg_count: u32,
    pub local_count: u32,
    pub flags: CodeFlags,
    pub varnames: Vec<String>,
    pub freevars: Vec<String>,
    pub cellvars: Vec<String>,
}

impl<C> CodeObject<C> {
    /// Code object for a plain function with no arguments, names, or line information
    pub fn new(name: impl Into<String>, code: Vec<u8>, consts: Vec<C>) -> CodeObject<C> {
        let name = name.into();
        CodeObject {
            code,
            consts,
            names: vec![],
            first_line: 1,
            line_table: vec![],
            exception_table: vec![],
            stack_size: 0,
            qualified_name: name.clone(),
            name,
            filename: String::from("<unknown>"),
            arg_count: 0,
            posonly_arg_count: 0,
            kwonly_arg_count: 0,
            local_count: 0,
            flags: CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS | CodeFlags::NOFREE,
            varnames: vec![],
            freevars: vec![],
            cellvars: vec![],
        }
    }

    /// Check that the instruction stream is made of whole words
    pub fn validate(&self) -> Result<(), Error> {
        if self.code.len() % 2 != 0 {
            return Err(Error::OddCodeLength(self.code.len()));
        }
        Ok(())
    }

    /// Decode the line table
    pub fn line_entries(&self, profile: Profile) -> Result<Vec<LineEntry>, Error> {
        LineEntry::decode(
            profile.line_table_format(),
            self.first_line,
            &self.line_table,
            self.code.len(),
        )
    }

    /// Decode the exception table (empty for profiles without one)
    pub fn exception_entries(&self, profile: Profile) -> Result<Vec<ExceptionTableEntry>, Error> {
        if profile.has_exception_table() {
            ExceptionTableEntry::decode(&self.exception_table, profile)
        } else {
            Ok(vec![])
        }
    }
}

use super::opcodes::{self, py311, py39};
use super::{instructions, max_stack_for, write_instruction};
use super::{Branch, CodeObject, Error, ExceptionTableEntry, LineEntry, Serialize, Settings};
use crate::util::Offset;

/// Editing session over one code object
///
/// The editor owns a copy of the instruction stream (the "patch") along with decoded versions of
/// everything that points into it. Every change to the patch is immediately followed by an
/// adjustment of the branches, the exception table, and the line table, so that between
/// operations all four agree with each other. Offsets passed in always refer to the current
/// state of the patch, not to the original code.
///
/// Once [`Editor::finish`] has produced the new code object, the editor can't be used again.
pub struct Editor<'a, C> {
    original: &'a CodeObject<C>,
    settings: Settings,

    /// Instruction stream being edited
    code: Vec<u8>,

    /// Constant pool (the original constants followed by any added ones)
    consts: Vec<C>,

    branches: Vec<Branch>,
    exception_table: Vec<ExceptionTableEntry>,
    lines: Vec<LineEntry>,

    /// Largest stack depth needed by any inserted sequence
    max_additional_stack: u32,

    finished: bool,
}

impl<'a, C: Clone> Editor<'a, C> {
    /// Start editing a code object
    pub fn new(original: &'a CodeObject<C>, settings: Settings) -> Result<Editor<'a, C>, Error> {
        original.validate()?;
        let profile = settings.profile;
        let branches = Branch::from_code(&original.code, profile);
        let exception_table = original.exception_entries(profile)?;
        let lines = original.line_entries(profile)?;
        log::trace!(
            "Editing {} ({} bytes, {} branches, {} exception entries, {} line entries)",
            original.qualified_name,
            original.code.len(),
            branches.len(),
            exception_table.len(),
            lines.len()
        );

        Ok(Editor {
            original,
            code: original.code.clone(),
            consts: original.consts.clone(),
            settings,
            branches,
            exception_table,
            lines,
            max_additional_stack: 0,
            finished: false,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current state of the instruction stream
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn exception_table(&self) -> &[ExceptionTableEntry] {
        &self.exception_table
    }

    pub fn lines(&self) -> &[LineEntry] {
        &self.lines
    }

    /// Append a constant, returning its index (equal constants are not merged)
    pub fn add_const(&mut self, value: C) -> usize {
        self.assert_not_finished();
        self.consts.push(value);
        self.consts.len() - 1
    }

    /// Insert a call to the constant `function` with constant arguments `args` at `offset`
    ///
    /// The call's result is discarded, so the inserted code leaves the stack as it found it. If
    /// enabled in the settings, the call starts with a `NOP` whose operand is the distance to the
    /// end of the call (so that the `NOP` can later be turned into a jump over the call). Returns
    /// the number of bytes inserted.
    pub fn insert_call(
        &mut self,
        offset: usize,
        function: usize,
        args: &[usize],
    ) -> Result<usize, Error> {
        self.assert_not_finished();
        assert!(
            function < self.consts.len(),
            "function {} is not a constant",
            function
        );
        for arg in args {
            assert!(*arg < self.consts.len(), "argument {} is not a constant", arg);
        }
        self.assert_instruction_boundary(offset);

        let call = self.call_sequence(function, args)?;
        let additional_stack = max_stack_for(&call, self.settings.profile)?;
        self.max_additional_stack = self.max_additional_stack.max(additional_stack);

        self.code.splice(offset..offset, call.iter().copied());
        self.adjust(Offset(offset), call.len() as isize);
        log::trace!(
            "Inserted {} byte call to constant {} at {}",
            call.len(),
            function,
            offset
        );
        Ok(call.len())
    }

    fn call_sequence(&self, function: usize, args: &[usize]) -> Result<Vec<u8>, Error> {
        let profile = self.settings.profile;
        let arg_count = u32::try_from(args.len()).expect("too many call arguments");
        let load_const = |code: &mut Vec<u8>, index: usize| {
            let index = u32::try_from(index).expect("constant index overflow");
            write_instruction(code, profile, opcodes::LOAD_CONST, index, 0)
        };

        let mut call = vec![];
        if profile.has_inline_caches() {
            write_instruction(&mut call, profile, py311::PUSH_NULL, 0, 0)?;
            load_const(&mut call, function)?;
            for arg in args {
                load_const(&mut call, *arg)?;
            }
            write_instruction(&mut call, profile, py311::PRECALL, arg_count, 0)?;
            write_instruction(&mut call, profile, py311::CALL, arg_count, 0)?;
        } else {
            load_const(&mut call, function)?;
            for arg in args {
                load_const(&mut call, *arg)?;
            }
            write_instruction(&mut call, profile, py39::CALL_FUNCTION, arg_count, 0)?;
        }
        write_instruction(&mut call, profile, opcodes::POP_TOP, 0, 0)?;

        if !self.settings.deinstrument_slot {
            return Ok(call);
        }
        let skip = call.len() / profile.jump_unit();
        assert!(
            skip <= u8::MAX as usize,
            "jump over {} units doesn't fit in a deinstrument slot",
            skip
        );
        let mut slotted = Vec::with_capacity(call.len() + 2);
        write_instruction(&mut slotted, profile, opcodes::NOP, skip as u32, 0)?;
        slotted.extend(call);
        Ok(slotted)
    }

    /// Replace every global lookup of `name` with a load of the constant `const_index`
    ///
    /// Lookups are found in the current state of the code, so anything inserted earlier is
    /// included. On 3.11, a lookup that also pushes `NULL` (for a call) becomes a `PUSH_NULL`
    /// followed by the constant load. Returns the number of lookups replaced.
    pub fn replace_name_lookup_with_const(
        &mut self,
        name: &str,
        const_index: usize,
    ) -> Result<usize, Error> {
        self.assert_not_finished();
        assert!(
            const_index < self.consts.len(),
            "replacement {} is not a constant",
            const_index
        );
        let name_index = match self.original.names.iter().position(|n| n == name) {
            Some(idx) => idx as u32,
            None => return Ok(0),
        };

        let profile = self.settings.profile;
        let lookups: Vec<_> = instructions(&self.code, profile)
            .filter(|insn| insn.opcode == opcodes::LOAD_GLOBAL)
            .filter(|insn| {
                if profile.has_inline_caches() {
                    insn.arg >> 1 == name_index
                } else {
                    insn.arg == name_index
                }
            })
            .collect();

        let const_index = u32::try_from(const_index).expect("constant index overflow");
        let mut delta: isize = 0;
        for lookup in &lookups {
            let mut replacement = vec![];
            if profile.has_inline_caches() && lookup.arg & 1 != 0 {
                write_instruction(&mut replacement, profile, py311::PUSH_NULL, 0, 0)?;
            }
            write_instruction(&mut replacement, profile, opcodes::LOAD_CONST, const_index, 0)?;

            let mut start = lookup.offset;
            start.shift(delta);
            let change = replacement.len() as isize - lookup.length as isize;
            self.code
                .splice(start.0..start.0 + lookup.length, replacement.iter().copied());

            // Resize from inside the replaced instruction: anything pointing at its start stays,
            // everything after it moves
            if change != 0 {
                self.adjust(start.plus(1), change);
            }
            delta += change;
        }

        log::trace!(
            "Replaced {} lookups of {} with constant {}",
            lookups.len(),
            name,
            const_index
        );
        Ok(lookups.len())
    }

    /// Resolve branch sizes and produce the edited code object
    ///
    /// Jumps whose operands no longer fit in their `EXTENDED_ARG` prefixes are widened one at a
    /// time, until a full pass over the branches doesn't widen anything (widening one jump may
    /// push another one's target out of range). Branches are then re-encoded in place, and both
    /// side tables are re-encoded for the profile.
    pub fn finish(&mut self) -> Result<CodeObject<C>, Error> {
        self.assert_not_finished();

        let mut passes = 0;
        let mut changed = true;
        while changed {
            changed = false;
            passes += 1;
            for idx in 0..self.branches.len() {
                let growth = self.branches[idx].grow_if_needed();
                if growth == 0 {
                    continue;
                }
                let at = self.branches[idx].offset;
                log::trace!("Widening branch at {:?} by {} bytes", at, growth);

                self.code
                    .splice(at.0..at.0, std::iter::repeat(0).take(growth));
                for (other_idx, other) in self.branches.iter_mut().enumerate() {
                    if other_idx != idx {
                        other.adjust(at, growth as isize);
                    }
                }
                self.adjust_tables(at, growth as isize);
                changed = true;
            }
        }

        for branch in &self.branches {
            assert_eq!(
                self.code[branch.opcode_offset().0],
                branch.opcode,
                "branch at {:?} is out of sync with the code",
                branch.offset
            );
            let mut slot = &mut self.code[branch.offset.0..branch.offset.0 + branch.length];
            branch.serialize(&mut slot)?;
        }

        let profile = self.settings.profile;
        let line_table = LineEntry::encode(
            profile.line_table_format(),
            self.original.first_line,
            &self.lines,
        )?;
        let exception_table = if profile.has_exception_table() {
            ExceptionTableEntry::encode(&self.exception_table)?
        } else {
            self.original.exception_table.clone()
        };
        let stack_size = self.original.stack_size + self.max_additional_stack;
        self.finished = true;

        log::debug!(
            "Finished {}: {} -> {} bytes, stack size {} -> {}, {} branch passes",
            self.original.qualified_name,
            self.original.code.len(),
            self.code.len(),
            self.original.stack_size,
            stack_size,
            passes
        );

        Ok(CodeObject {
            code: self.code.clone(),
            consts: self.consts.clone(),
            line_table,
            exception_table,
            stack_size,
            ..self.original.clone()
        })
    }

    /// Shift everything that points into the code after `length` bytes were inserted at `at`
    fn adjust(&mut self, at: Offset, length: isize) {
        for branch in &mut self.branches {
            branch.adjust(at, length);
        }
        self.adjust_tables(at, length);
    }

    fn adjust_tables(&mut self, at: Offset, length: isize) {
        for entry in &mut self.exception_table {
            entry.adjust(at, length);
        }
        for line in &mut self.lines {
            line.adjust(at, length);
        }
    }

    fn assert_not_finished(&self) {
        assert!(!self.finished, "editor was already finished");
    }

    fn assert_instruction_boundary(&self, offset: usize) {
        let at_boundary = offset == self.code.len()
            || instructions(&self.code, self.settings.profile).any(|insn| insn.offset.0 == offset);
        assert!(at_boundary, "offset {} is not an instruction boundary", offset);
    }
}

//! Instrument CPython bytecode in place
//!
//! A function body is an instruction stream plus three side tables (jump operands, the exception
//! table, and the line table), all of which refer to byte offsets in the stream. The
//! [`bytecode::Editor`] splices probe calls into the stream and keeps every one of those offsets
//! consistent, including the operand growth of jumps whose targets moved too far away.
//!
//! ```
//! use bytepatch::bytecode::*;
//!
//! # fn instrument(code: &CodeObject<String>) -> Result<CodeObject<String>, Error> {
//! let mut editor = Editor::new(code, Settings::new(Profile::Python311))?;
//! let probe = editor.add_const(String::from("<probe>"));
//! let line = editor.add_const(String::from("line 3"));
//! editor.insert_call(0, probe, &[line])?;
//! editor.finish()
//! # }
//! ```

pub mod bytecode;
pub mod util;

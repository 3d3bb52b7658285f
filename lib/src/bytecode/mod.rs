//! Edit CPython bytecode while keeping its side tables consistent
//!
//! ### Structure
//!
//! A code object body is a stream of 2-byte words: an opcode and an operand byte. Operands that
//! don't fit in a byte are widened by `EXTENDED_ARG` prefixes, and since CPython 3.11 some
//! opcodes are followed by a fixed number of `CACHE` words. Three other structures point into
//! the stream by byte offset:
//!
//!   - jump operands ([`Branch`]), either relative to the next instruction or absolute
//!   - the exception table ([`ExceptionTableEntry`]), 3.11 onwards
//!   - the line table ([`LineEntry`]), in one of three [`LineTableFormat`]s
//!
//! ### Editing
//!
//! [`Editor`] owns a patch buffer and all three structures. Every splice into the buffer is
//! followed by an `adjust` of every structure, and [`Editor::finish`] resolves the jumps that
//! now need more `EXTENDED_ARG` prefixes before re-encoding all the tables. What gets emitted is
//! decided once by the [`Profile`] chosen in the editor's [`Settings`].

mod binary_format;
mod branch;
mod code_object;
mod editor;
mod errors;
mod exception_table;
mod instructions;
mod line_table;
pub mod opcodes;
mod profile;
mod stack;

pub use binary_format::*;
pub use branch::*;
pub use code_object::*;
pub use editor::*;
pub use errors::*;
pub use exception_table::*;
pub use instructions::*;
pub use line_table::*;
pub use profile::*;
pub use stack::*;

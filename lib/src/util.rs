mod offset;
pub mod varint;

pub use offset::*;

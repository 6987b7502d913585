//! ROM image handling: the eight-chip ROM set, cross-ROM pointers, and the
//! opcode pattern matcher used to fingerprint ROM software versions.

pub mod pattern;
pub mod pointer;
pub mod set;

pub use pattern::{Captures, Pattern};
pub use pointer::RomPointer;
pub use set::{RomSet, checksum};

//! On-chain formats of the serum-style order book program: account layouts,
//! the critbit slab that stores each side of the book, and instruction encoding.

pub mod instruction;
pub mod layout;
pub mod slab;

pub use instruction::*;
pub use layout::*;
pub use slab::*;

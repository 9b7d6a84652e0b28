//! Lazy containers over shared backing buffers.

mod array;
mod structure;

pub use array::Array;
pub use structure::Struct;

//! asciicast v2 header handling.

pub mod header;
pub mod normalize;

//! Read-only view over a project directory: scenes and the recordings inside them.

pub mod layout;
pub mod recordings;
pub mod scene;

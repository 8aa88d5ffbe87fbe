//! Core data types: canonical events, subscription identity, link state,
//! and symbol helpers.

pub mod events;
pub mod subscription;
pub mod symbol;

pub use events::*;
pub use subscription::*;
pub use symbol::*;

//! Identity newtypes, provider kinds, and token material handled by the engine.

pub mod id;
pub mod token;

pub use id::*;
pub use token::*;

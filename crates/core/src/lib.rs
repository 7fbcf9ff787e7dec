//! Tweaker Core - Shared types for the script build pipeline

mod actions;
mod error;
mod types;

pub use actions::*;
pub use error::*;
pub use types::*;

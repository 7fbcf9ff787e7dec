//! # Tweaker Scripting
//!
//! Reference script language for the tweaker build pipeline.
//!
//! ## Pipeline
//! - [`parser`] turns a unit's source into a [`ParsedFile`], resolving
//!   bracket expressions and declaring globals in the group's
//!   [`GlobalEnvironment`]
//! - [`compiler`] checks symbols and emits a group's artifacts
//! - [`vm`] loads the artifacts and runs them
//!
//! ## Artifacts
//! - `__init__`: global initialisers
//! - one artifact per unit: body and functions
//! - `__main__`: entry point listing the units in order

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod environment;
pub mod error;
pub mod host;
pub mod lexer;
pub mod parser;
pub mod vm;

pub use ast::ParsedFile;
pub use bytecode::Value;
pub use compiler::{compile_group, CompiledUnit, EntryPoint, INIT_ARTIFACT, MAIN_ARTIFACT};
pub use environment::{BracketHandler, BracketRegistry, GlobalEnvironment, NamespaceBrackets};
pub use error::{Result, ScriptError};
pub use host::{Native, Natives};
pub use parser::{parse_reader, parse_source};
pub use vm::{Program, Vm};

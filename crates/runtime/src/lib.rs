//! # Tweaker Runtime
//!
//! The script build pipeline: sources, the directive preprocessor, the
//! backend seam and the [`Tweaker`] orchestrator that ties them together.

mod backend;
mod error;
mod preprocessor;
mod report;
mod script_backend;
mod source;
mod tweaker;

pub use backend::Backend;
pub use error::{BuildStage, Failure, FrontendError, GroupBuildError, ScanError, UnitError};
pub use preprocessor::{DirectiveScanner, Directives, Preprocessor};
pub use report::RunReport;
pub use script_backend::{ScriptBackend, DEFAULT_BRACKET_NAMESPACES};
pub use source::{
    CascadeSource, DirectorySource, FileUnit, MemorySource, MemoryUnit, ScriptGroup, ScriptSource,
    ScriptUnit,
};
pub use tweaker::{Tweaker, DEFAULT_LOADER};

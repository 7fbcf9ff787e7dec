//! Failure taxonomy of a build run
//!
//! Unit-level failures never leave the unit loop and group-level failures
//! never leave the group loop; both end up in the run report.

use std::fmt;
use std::io;

/// Failure while processing one script unit
#[derive(thiserror::Error, Debug)]
pub enum UnitError {
    /// The unit's stream could not be opened or read
    #[error("Could not load script {unit}: {source}")]
    SourceIo {
        unit: String,
        #[source]
        source: io::Error,
    },

    /// The front-end rejected the unit
    #[error("Error parsing {file}:{line} -- {explanation}")]
    Parse {
        file: String,
        line: usize,
        explanation: String,
    },

    /// Anything else, including preprocessor failures and panics
    #[error("Error loading {unit}: {message}")]
    Unclassified { unit: String, message: String },
}

impl UnitError {
    /// Name of the unit the failure is scoped to
    pub fn unit(&self) -> &str {
        match self {
            UnitError::SourceIo { unit, .. } | UnitError::Unclassified { unit, .. } => unit,
            UnitError::Parse { file, .. } => file,
        }
    }
}

/// Stage of a group build that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Compile,
    Execute,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStage::Compile => f.write_str("compiling"),
            BuildStage::Execute => f.write_str("executing"),
        }
    }
}

/// Compilation or execution failure of a whole group
#[derive(thiserror::Error, Debug)]
#[error("Error {stage} {group}: {message}")]
pub struct GroupBuildError {
    pub group: String,
    pub stage: BuildStage,
    pub message: String,
}

/// One recorded failure
#[derive(thiserror::Error, Debug)]
pub enum Failure {
    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Group(#[from] GroupBuildError),
}

/// Directive scanning failure
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("line {line}: {message}")]
    Directive { line: usize, message: String },
}

/// Front-end failure as seen by the orchestrator
#[derive(thiserror::Error, Debug)]
pub enum FrontendError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{file}:{line}: {explanation}")]
    Parse {
        file: String,
        line: usize,
        explanation: String,
    },

    #[error("{0}")]
    Other(String),
}

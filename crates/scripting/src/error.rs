//! Error types for the scripting crate

/// Script-specific error types
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// Script source could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error in {file} at line {line}: {message}")]
    ParseError {
        file: String,
        line: usize,
        message: String,
    },

    /// Symbol or semantic error found while compiling
    #[error("Compile error in {file} at line {line}: {message}")]
    CompileError {
        file: String,
        line: usize,
        message: String,
    },

    /// Artifact missing or undecodable
    #[error("Invalid artifact {name}: {message}")]
    InvalidArtifact { name: String, message: String },

    /// Runtime error
    #[error("Runtime error: {0}")]
    RuntimeError(String),

    /// Invalid function call
    #[error("Invalid function call: {0}")]
    InvalidFunctionCall(String),

    /// Call depth exceeded
    #[error("Stack overflow")]
    StackOverflow,

    /// Runtime error tagged with where it happened
    #[error("{source} (at {location})")]
    Located {
        location: String,
        #[source]
        source: Box<ScriptError>,
    },
}

impl ScriptError {
    /// Attach a location unless the error already carries one
    pub fn at(self, location: impl FnOnce() -> String) -> Self {
        match self {
            located @ ScriptError::Located { .. } => located,
            other => ScriptError::Located {
                location: location(),
                source: Box::new(other),
            },
        }
    }
}

/// Result type for scripting operations
pub type Result<T> = std::result::Result<T, ScriptError>;

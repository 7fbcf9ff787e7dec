//! Collaborators the orchestrator drives
//!
//! A [`Backend`] bundles the front-end, the per-group environment factory,
//! the compiler and the loader/executor of one script language.

use crate::error::FrontendError;
use std::io::Read;
use tweaker_core::ArtifactSet;

pub trait Backend {
    /// Symbol environment shared by the units of one group
    type Environment;

    /// Parse result of one unit
    type Parsed;

    /// Fresh environment for a group
    fn new_environment(&self, group: &str) -> Self::Environment;

    /// Parse one unit against the group's environment
    fn parse(
        &self,
        reader: &mut dyn Read,
        env: &mut Self::Environment,
        unit: &str,
        artifact_name: &str,
        ignore_bracket_errors: bool,
    ) -> Result<Self::Parsed, FrontendError>;

    /// Compile the successfully parsed units of a group into `artifacts`.
    ///
    /// The environment is consumed; it does not outlive compilation.
    fn compile(
        &self,
        parsed: Vec<Self::Parsed>,
        env: Self::Environment,
        debug: bool,
        artifacts: &mut ArtifactSet,
    ) -> anyhow::Result<()>;

    /// Load the artifacts and run the group's entry point
    fn execute(&self, artifacts: &ArtifactSet) -> anyhow::Result<()>;
}

//! [`Backend`] for the tweaker script language

use crate::backend::Backend;
use crate::error::FrontendError;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;
use tweaker_core::ArtifactSet;
use tweaker_scripting::{
    compile_group, parse_reader, BracketRegistry, GlobalEnvironment, Natives, ParsedFile, Program,
    ScriptError, Vm,
};

/// Bracket namespaces resolved when none are configured
pub const DEFAULT_BRACKET_NAMESPACES: [&str; 3] = ["item", "liquid", "ore"];

/// Script language backend
#[derive(Debug, Clone)]
pub struct ScriptBackend {
    natives: Arc<Natives>,
    brackets: Arc<BracketRegistry>,
}

impl ScriptBackend {
    /// Create a new backend
    pub fn new(natives: Natives, brackets: BracketRegistry) -> Self {
        Self {
            natives: Arc::new(natives),
            brackets: Arc::new(brackets),
        }
    }

    pub fn natives(&self) -> &Natives {
        &self.natives
    }
}

impl Default for ScriptBackend {
    fn default() -> Self {
        Self::new(
            Natives::with_defaults(),
            BracketRegistry::with_namespaces(DEFAULT_BRACKET_NAMESPACES),
        )
    }
}

impl Backend for ScriptBackend {
    type Environment = GlobalEnvironment;
    type Parsed = ParsedFile;

    fn new_environment(&self, group: &str) -> GlobalEnvironment {
        GlobalEnvironment::new(group, self.natives.clone(), self.brackets.clone())
    }

    fn parse(
        &self,
        reader: &mut dyn Read,
        env: &mut GlobalEnvironment,
        unit: &str,
        artifact_name: &str,
        ignore_bracket_errors: bool,
    ) -> Result<ParsedFile, FrontendError> {
        Ok(parse_reader(reader, env, unit, artifact_name, ignore_bracket_errors)?)
    }

    fn compile(
        &self,
        parsed: Vec<ParsedFile>,
        env: GlobalEnvironment,
        debug: bool,
        artifacts: &mut ArtifactSet,
    ) -> anyhow::Result<()> {
        compile_group(&parsed, &env, debug, artifacts)?;
        debug!(
            "Compiled {} ({} globals, {} functions) into {} artifacts, {} bytes",
            env.group(),
            env.global_count(),
            env.function_count(),
            artifacts.len(),
            artifacts.payload_size()
        );
        Ok(())
    }

    fn execute(&self, artifacts: &ArtifactSet) -> anyhow::Result<()> {
        let program = Program::load(artifacts)?;
        Vm::new(&program, &self.natives).run()?;
        Ok(())
    }
}

impl From<ScriptError> for FrontendError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::Io(err) => FrontendError::Io(err),
            ScriptError::ParseError { file, line, message } => FrontendError::Parse {
                file,
                line,
                explanation: message,
            },
            other => FrontendError::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compile_execute() {
        let backend = ScriptBackend::default();
        let mut env = backend.new_environment("group");

        let first = backend
            .parse(&mut "global base = 2;".as_bytes(), &mut env, "a.zs", "a", false)
            .unwrap();
        let second = backend
            .parse(&mut "print(base ~ <ore:ingotIron>);".as_bytes(), &mut env, "b.zs", "b", false)
            .unwrap();

        let mut artifacts = ArtifactSet::new();
        backend.compile(vec![first, second], env, true, &mut artifacts).unwrap();
        assert!(artifacts.contains("a"));
        assert!(artifacts.contains("b"));
        backend.execute(&artifacts).unwrap();
    }

    #[test]
    fn test_runtime_error_reaches_caller() {
        let backend = ScriptBackend::default();
        let mut env = backend.new_environment("group");
        let parsed = backend
            .parse(&mut "print(1 / 0);".as_bytes(), &mut env, "div.zs", "div", false)
            .unwrap();

        let mut artifacts = ArtifactSet::new();
        backend.compile(vec![parsed], env, false, &mut artifacts).unwrap();
        let err = backend.execute(&artifacts).unwrap_err();
        assert_eq!(err.to_string(), "Runtime error: Division by zero (at div.zs)");
    }

    #[test]
    fn test_parse_error_conversion() {
        let backend = ScriptBackend::default();
        let mut env = backend.new_environment("group");

        let err = backend
            .parse(&mut "var x = ;".as_bytes(), &mut env, "bad.zs", "bad", false)
            .unwrap_err();
        match err {
            FrontendError::Parse { file, line, .. } => {
                assert_eq!(file, "bad.zs");
                assert_eq!(line, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

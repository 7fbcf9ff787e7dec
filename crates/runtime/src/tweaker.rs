//! Compilation orchestrator
//!
//! Drives every group of a source through preprocessing, parsing,
//! compilation and execution. Failures are recorded at the unit or group
//! they belong to; the run always continues with the next unit or group.

use crate::backend::Backend;
use crate::error::{BuildStage, FrontendError, GroupBuildError, UnitError};
use crate::preprocessor::{DirectiveScanner, Preprocessor};
use crate::report::RunReport;
use crate::source::{ScriptGroup, ScriptSource, ScriptUnit};
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info};
use tweaker_core::{artifact_name, Action, ActionLog, ArtifactSet, BuildSettings, Result};

/// Loader name units are checked against by `#loader`
pub const DEFAULT_LOADER: &str = "tweaker";

enum UnitOutcome<P> {
    Parsed { parsed: P, debug: bool },
    Skipped(&'static str),
}

/// The script build orchestrator
pub struct Tweaker<B: Backend> {
    backend: B,
    preprocessor: Box<dyn Preprocessor>,
    settings: BuildSettings,
    loader: String,
    actions: ActionLog,
}

impl<B: Backend> Tweaker<B> {
    /// Create a new orchestrator
    pub fn new(backend: B, settings: BuildSettings) -> Self {
        Self {
            backend,
            preprocessor: Box::new(DirectiveScanner),
            settings,
            loader: DEFAULT_LOADER.to_string(),
            actions: ActionLog::new(),
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: impl Preprocessor + 'static) -> Self {
        self.preprocessor = Box::new(preprocessor);
        self
    }

    pub fn with_loader(mut self, loader: impl Into<String>) -> Self {
        self.loader = loader.into();
        self
    }

    /// Record applied actions into an existing log
    pub fn with_action_log(mut self, actions: ActionLog) -> Self {
        self.actions = actions;
        self
    }

    /// Compile every following group with debug artifacts
    pub fn enable_debug(&mut self) {
        self.settings.enable_debug();
    }

    /// Tolerate bracket errors in units with exactly this name
    pub fn suppress_bracket_errors(&mut self, unit_name: impl Into<String>) {
        self.settings.suppress_bracket_errors(unit_name);
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn loader(&self) -> &str {
        &self.loader
    }

    /// Apply an action and record it in the action log
    pub fn apply(&self, action: Box<dyn Action>) {
        self.actions.apply(action);
    }

    pub fn actions(&self) -> &ActionLog {
        &self.actions
    }

    /// Build and execute every group of `source`
    pub fn load(&self, source: &dyn ScriptSource) -> Result<RunReport> {
        self.run(source, true)
    }

    /// Build every group of `source`, executing each when `execute` is set.
    ///
    /// Only a failure to enumerate the source is returned as an error.
    /// Everything else ends up in the report.
    pub fn run(&self, source: &dyn ScriptSource, execute: bool) -> Result<RunReport> {
        let groups = source.groups()?;
        let mut report = RunReport::default();
        let mut seen = HashSet::new();

        for group in &groups {
            if !seen.insert(group.name.as_str()) {
                debug!("Skipping duplicate group {}", group.name);
                report.groups_skipped += 1;
                continue;
            }

            log_loading(&group.name);
            self.build_group(group, execute, &mut report);
        }

        report.log_summary();
        Ok(report)
    }

    fn build_group(&self, group: &ScriptGroup, execute: bool, report: &mut RunReport) {
        let mut env = self.backend.new_environment(&group.name);
        let mut parsed = Vec::with_capacity(group.units.len());
        let mut debug = self.settings.debug();

        for unit in &group.units {
            match self.process_unit(unit.as_ref(), &mut env) {
                Ok(UnitOutcome::Parsed { parsed: file, debug: wants_debug }) => {
                    debug |= wants_debug;
                    parsed.push(file);
                    report.units_parsed += 1;
                }
                Ok(UnitOutcome::Skipped(reason)) => {
                    info!("Skipping {} ({})", unit.name(), reason);
                    report.units_skipped += 1;
                }
                Err(err) => report.record(err),
            }
        }

        let mut artifacts = ArtifactSet::new();
        let built = guard(&group.name, BuildStage::Compile, || {
            self.backend.compile(parsed, env, debug, &mut artifacts)
        })
        .and_then(|()| {
            if execute {
                guard(&group.name, BuildStage::Execute, || self.backend.execute(&artifacts))
            } else {
                Ok(())
            }
        });

        match built {
            Ok(()) => report.groups_built += 1,
            Err(err) => report.record(err),
        }
    }

    /// Preprocess and parse one unit, turning panics into unit errors
    fn process_unit(
        &self,
        unit: &dyn ScriptUnit,
        env: &mut B::Environment,
    ) -> std::result::Result<UnitOutcome<B::Parsed>, UnitError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.parse_unit(unit, env))).unwrap_or_else(|panic| {
            Err(UnitError::Unclassified {
                unit: unit.name().to_string(),
                message: panic_message(panic.as_ref()),
            })
        })
    }

    fn parse_unit(
        &self,
        unit: &dyn ScriptUnit,
        env: &mut B::Environment,
    ) -> std::result::Result<UnitOutcome<B::Parsed>, UnitError> {
        let name = unit.name();
        let io_error = |source| UnitError::SourceIo {
            unit: name.to_string(),
            source,
        };

        let directives = {
            let mut reader = unit.open().map_err(io_error)?;
            self.preprocessor
                .scan(name, &mut reader)
                .map_err(|err| UnitError::Unclassified {
                    unit: name.to_string(),
                    message: err.to_string(),
                })?
        };

        if directives.norun {
            return Ok(UnitOutcome::Skipped("#norun"));
        }
        if !directives.runs_under(&self.loader) {
            return Ok(UnitOutcome::Skipped("other loader"));
        }

        let ignore_bracket_errors =
            directives.ignore_bracket_errors || self.settings.ignores_bracket_errors(name);

        // The stream is dropped on every path out of this block
        let parsed = {
            let mut reader = unit.open().map_err(io_error)?;
            self.backend.parse(
                &mut reader,
                env,
                name,
                &artifact_name(name),
                ignore_bracket_errors,
            )
        };

        match parsed {
            Ok(parsed) => Ok(UnitOutcome::Parsed {
                parsed,
                debug: directives.debug,
            }),
            Err(FrontendError::Io(source)) => Err(io_error(source)),
            Err(FrontendError::Parse { file, line, explanation }) => {
                Err(UnitError::Parse { file, line, explanation })
            }
            Err(FrontendError::Other(message)) => Err(UnitError::Unclassified {
                unit: name.to_string(),
                message,
            }),
        }
    }
}

/// Run one group stage, converting errors and panics into a group failure
fn guard(
    group: &str,
    stage: BuildStage,
    f: impl FnOnce() -> anyhow::Result<()>,
) -> std::result::Result<(), GroupBuildError> {
    let message = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => err.to_string(),
        Err(panic) => panic_message(panic.as_ref()),
    };

    Err(GroupBuildError {
        group: group.to_string(),
        stage,
        message,
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

fn log_loading(group: &str) {
    let lower = group.to_ascii_lowercase();
    if lower.ends_with(".zs") {
        info!("Loading file {}", group);
    } else if lower.ends_with(".zip") {
        info!("Loading zip {}", group);
    } else {
        info!("Loading group {}", group);
    }
}

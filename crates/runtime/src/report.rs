//! Aggregate outcome of one run

use crate::error::{Failure, GroupBuildError, UnitError};
use tracing::{error, info};

/// Outcome of [`Tweaker::run`](crate::Tweaker::run)
#[derive(Debug, Default)]
pub struct RunReport {
    /// Every failure, in the order it happened
    pub failures: Vec<Failure>,
    /// Groups compiled (and executed, when requested) without error
    pub groups_built: usize,
    /// Groups skipped as duplicates
    pub groups_skipped: usize,
    pub units_parsed: usize,
    /// Units left out by a directive
    pub units_skipped: usize,
}

impl RunReport {
    /// True iff nothing failed
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn unit_failures(&self) -> impl Iterator<Item = &UnitError> {
        self.failures.iter().filter_map(|failure| match failure {
            Failure::Unit(err) => Some(err),
            Failure::Group(_) => None,
        })
    }

    pub fn group_failures(&self) -> impl Iterator<Item = &GroupBuildError> {
        self.failures.iter().filter_map(|failure| match failure {
            Failure::Group(err) => Some(err),
            Failure::Unit(_) => None,
        })
    }

    /// Diagnostic messages in order
    pub fn messages(&self) -> Vec<String> {
        self.failures.iter().map(ToString::to_string).collect()
    }

    pub(crate) fn record(&mut self, failure: impl Into<Failure>) {
        let failure = failure.into();
        error!("{}", failure);
        self.failures.push(failure);
    }

    pub(crate) fn log_summary(&self) {
        let summary = format!(
            "{} groups built, {} duplicates skipped, {} units parsed, {} units skipped",
            self.groups_built, self.groups_skipped, self.units_parsed, self.units_skipped
        );

        if self.success() {
            info!("Scripts loaded: {}", summary);
        } else {
            error!("Scripts loaded with {} error(s): {}", self.failures.len(), summary);
        }
    }
}

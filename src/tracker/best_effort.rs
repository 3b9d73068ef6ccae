//! Runner for external steps that must never abort their caller.
//!
//! Every platform call made while publishing or reconciling goes through a
//! `BestEffort`. A failure is logged once, recorded, and turned into `None`
//! so the remaining steps still run; the next event retries the whole
//! reconciliation.

use crate::error::Result;
use std::future::Future;

/// A step that did not happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: &'static str,
    pub error: String,
}

/// Collects failures for one unit of work (a publish, a reconcile).
#[derive(Debug)]
pub struct BestEffort {
    scope: &'static str,
    failures: Vec<StepFailure>,
}

impl BestEffort {
    pub fn new(scope: &'static str) -> Self {
        Self {
            scope,
            failures: Vec::new(),
        }
    }

    /// Await a step; on error log it, record it and return `None`.
    pub async fn run<T>(
        &mut self,
        step: &'static str,
        future: impl Future<Output = Result<T>>,
    ) -> Option<T> {
        match future.await {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(scope = self.scope, step, %error, "best-effort step failed");
                self.failures.push(StepFailure {
                    step,
                    error: error.to_string(),
                });
                None
            }
        }
    }

    /// Like `run`, but a missing target counts as success.
    pub async fn run_tolerating_missing(
        &mut self,
        step: &'static str,
        future: impl Future<Output = Result<()>>,
    ) -> bool {
        match future.await {
            Ok(()) => true,
            Err(error) if error.is_not_found() => {
                tracing::debug!(scope = self.scope, step, "target already gone");
                true
            }
            Err(error) => {
                tracing::warn!(scope = self.scope, step, %error, "best-effort step failed");
                self.failures.push(StepFailure {
                    step,
                    error: error.to_string(),
                });
                false
            }
        }
    }

    pub fn failures(&self) -> &[StepFailure] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<StepFailure> {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurfaceError;

    #[tokio::test]
    async fn failures_are_collected_without_aborting() {
        let mut steps = BestEffort::new("test");

        let first = steps.run("ok", async { Ok(1) }).await;
        let second: Option<u8> = steps
            .run("broken", async {
                Err(SurfaceError::Request("boom".into()).into())
            })
            .await;
        let third = steps.run("after", async { Ok("still runs") }).await;

        assert_eq!(first, Some(1));
        assert_eq!(second, None);
        assert_eq!(third, Some("still runs"));
        assert_eq!(steps.failures().len(), 1);
        assert_eq!(steps.failures()[0].step, "broken");
        assert!(steps.failures()[0].error.contains("boom"));
    }

    #[tokio::test]
    async fn missing_targets_are_not_failures() {
        let mut steps = BestEffort::new("test");

        let gone = steps
            .run_tolerating_missing("delete", async {
                Err(SurfaceError::NotFound {
                    what: "message".into(),
                }
                .into())
            })
            .await;

        assert!(gone);
        assert!(steps.into_failures().is_empty());
    }
}

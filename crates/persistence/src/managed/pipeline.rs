//! Ordered write stages with per-stage failure policy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One stage of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteStage {
    /// Durable write to the table store.
    Store,
    /// Search index update.
    Index,
    /// Cache population.
    Cache,
}

impl WriteStage {
    /// Stage name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteStage::Store => "store",
            WriteStage::Index => "index",
            WriteStage::Cache => "cache",
        }
    }
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a failing stage does to the rest of the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageFailurePolicy {
    /// Stop the write and report the error.
    Abort,
    /// Log the error and run the remaining stages.
    Continue,
}

/// A stage and its failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStep {
    /// The stage.
    pub stage: WriteStage,
    /// Applied when the stage fails.
    pub policy: StageFailurePolicy,
}

/// The ordered stages of every write.
///
/// The default pipeline stores, then indexes, then caches. Only the store
/// stage aborts; side-store failures leave the durable write in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePipeline {
    steps: Vec<PipelineStep>,
}

impl Default for WritePipeline {
    fn default() -> Self {
        Self {
            steps: vec![
                PipelineStep {
                    stage: WriteStage::Store,
                    policy: StageFailurePolicy::Abort,
                },
                PipelineStep {
                    stage: WriteStage::Index,
                    policy: StageFailurePolicy::Continue,
                },
                PipelineStep {
                    stage: WriteStage::Cache,
                    policy: StageFailurePolicy::Continue,
                },
            ],
        }
    }
}

impl WritePipeline {
    /// Returns the steps in execution order.
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Returns the policy of a stage, if the stage is part of the pipeline.
    pub fn policy(&self, stage: WriteStage) -> Option<StageFailurePolicy> {
        self.steps
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.policy)
    }

    /// Changes the policy of a side-store stage.
    ///
    /// The store stage always aborts, since later stages depend on its result.
    pub fn with_policy(mut self, stage: WriteStage, policy: StageFailurePolicy) -> Self {
        if stage == WriteStage::Store {
            return self;
        }
        for step in self.steps.iter_mut().filter(|s| s.stage == stage) {
            step.policy = policy;
        }
        self
    }
}

//! Branch conditions: named boolean predicates over pipeline input.
//!
//! Conditions are evaluated by the execution engine against live instance
//! input, once per instance at the point the branch is reached. The assembler
//! treats them as opaque routing data; [`BranchCondition::evaluate`] mirrors
//! the engine's semantics for tests and the CLI `trace` command.

use pipewright_types::PipelineInput;

/// The job type that routes to automated scoring. Case-sensitive.
pub const AUTOMATED_JOB_TYPE: &str = "Automated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchCondition {
    /// The instance declares a customer network-isolation configuration.
    HasVpcConfig,
    /// The skip flag is present and explicitly true.
    ShouldSkipInference,
    /// `jobType` equals `"Automated"` exactly.
    JobTypeAutomated,
    /// An evaluator model is present and explicitly configured.
    HasEvaluatorModelConfig,
}

impl BranchCondition {
    /// The input-payload path the engine reads for this condition.
    pub fn input_path(&self) -> &'static str {
        match self {
            BranchCondition::HasVpcConfig => "$.hasVpcConfig",
            BranchCondition::ShouldSkipInference => "$.shouldSkipInference",
            BranchCondition::JobTypeAutomated => "$.jobType",
            BranchCondition::HasEvaluatorModelConfig => "$.hasEvaluatorModelConfig",
        }
    }

    /// Mirror of the engine's evaluation. Optional flags absent from the
    /// payload evaluate to false.
    pub fn evaluate(&self, input: &PipelineInput) -> bool {
        match self {
            BranchCondition::HasVpcConfig => input.has_vpc_config,
            BranchCondition::ShouldSkipInference => input.skip_inference(),
            BranchCondition::JobTypeAutomated => input.job_type == AUTOMATED_JOB_TYPE,
            BranchCondition::HasEvaluatorModelConfig => input.evaluator_model_configured(),
        }
    }
}

//! Shared types for the Pipewright workflow assembler.
//!
//! This crate provides the foundation used across the other Pipewright crates:
//! - `PipewrightError`: unified error taxonomy
//! - `PipelineInput`: the branch-relevant slice of a pipeline instance's input
//! - `duration_serde`: human-readable duration (de)serialization

use serde::{Deserialize, Serialize};

pub mod duration_serde;

/// Unified error type for all Pipewright subsystems.
///
/// Build-time failures only. Runtime faults (backend errors, capacity
/// exhaustion) are encoded as retry-rule error classes in the assembled
/// graph and never surface as values of this type.
#[derive(Debug, thiserror::Error)]
pub enum PipewrightError {
    /// Malformed timeout/retry configuration. Fatal at build time.
    #[error("Invalid policy for task '{kind}': {reason}")]
    InvalidPolicy { kind: String, reason: String },

    /// A task kind requested that the active family does not define.
    #[error("Unknown task kind '{kind}' for family '{family}'")]
    UnknownTaskKind { kind: String, family: String },

    /// An assembled graph violated a structural invariant.
    #[error("Workflow validation failed: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenience alias for `Result<T, PipewrightError>`.
pub type Result<T> = std::result::Result<T, PipewrightError>;

// ---------------------------------------------------------------------------
// PipelineInput: the branch-relevant slice of the instance payload
// ---------------------------------------------------------------------------

/// The fields of a pipeline instance's input payload that branch conditions
/// read. The execution engine evaluates each condition against this payload
/// once, at the point the branch is reached.
///
/// Field names follow the engine's wire contract (camelCase). Absent optional
/// flags are treated as `false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineInput {
    pub has_vpc_config: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_skip_inference: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_evaluator_model_config: Option<bool>,
    /// Compared case-sensitively to `"Automated"` by the scoring branch.
    pub job_type: String,
}

impl PipelineInput {
    pub fn skip_inference(&self) -> bool {
        self.should_skip_inference.unwrap_or(false)
    }

    pub fn evaluator_model_configured(&self) -> bool {
        self.has_evaluator_model_config.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_policy() {
        let err = PipewrightError::InvalidPolicy {
            kind: "PrepareDatasetTask".into(),
            reason: "maxAttempts must be >= 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid policy for task 'PrepareDatasetTask': maxAttempts must be >= 1"
        );
    }

    #[test]
    fn error_display_unknown_task_kind() {
        let err = PipewrightError::UnknownTaskKind {
            kind: "PrepareRAGDatasetTask".into(),
            family: "ModelEvaluation".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown task kind 'PrepareRAGDatasetTask' for family 'ModelEvaluation'"
        );
    }

    #[test]
    fn error_display_validation() {
        let err = PipewrightError::ValidationError("catch cycle detected".into());
        assert_eq!(
            err.to_string(),
            "Workflow validation failed: catch cycle detected"
        );
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: PipewrightError = json_err.into();
        assert!(matches!(err, PipewrightError::Json(_)));
    }

    #[test]
    fn input_deserializes_from_camel_case() {
        let input: PipelineInput = serde_json::from_str(
            r#"{"hasVpcConfig": true, "shouldSkipInference": true, "jobType": "Automated"}"#,
        )
        .unwrap();
        assert!(input.has_vpc_config);
        assert!(input.skip_inference());
        assert!(!input.evaluator_model_configured());
        assert_eq!(input.job_type, "Automated");
    }

    #[test]
    fn absent_optional_flags_are_false() {
        let input: PipelineInput =
            serde_json::from_str(r#"{"hasVpcConfig": false, "jobType": "Human"}"#).unwrap();
        assert!(!input.skip_inference());
        assert!(!input.evaluator_model_configured());
    }

    #[test]
    fn optional_flags_omitted_when_serializing() {
        let input = PipelineInput {
            has_vpc_config: false,
            job_type: "Automated".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&input).unwrap();
        assert!(!json.contains("shouldSkipInference"));
        assert!(!json.contains("hasEvaluatorModelConfig"));
    }
}

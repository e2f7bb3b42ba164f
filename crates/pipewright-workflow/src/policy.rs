//! Per-kind timeout, retry, and completion-mode policy.
//!
//! The catalog is fixed data: the assembler never computes policy, it looks it
//! up here. Retry rules are evaluated by the execution engine in declaration
//! order, each tracking its own attempt budget for the error classes it
//! matches. An empty rule list means the platform default retry only.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::kind::TaskKind;

/// Runtime error classes matched by retry rules. The engine compares these
/// against the fault class reported for a failed node.
pub mod error_class {
    /// Transient backend-side server fault.
    pub const BACKEND_SERVER_ERROR: &str = "Backend.ServerError";
    /// The platform marked the task failed without a more specific class.
    pub const PLATFORM_TASK_FAILED: &str = "Platform.TaskFailed";
    /// Backend resource exhaustion; retried with longer backoff and jitter.
    pub const BACKEND_CAPACITY_ERROR: &str = "Backend.CapacityError";
}

/// How a node signals completion to the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompletionMode {
    /// Complete when the backend job exits.
    FireAndForget,
    /// Pending until an external caller reports completion with the token
    /// issued at launch.
    WaitForCallbackToken,
}

/// Backoff jitter strategy, applied by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Jitter {
    None,
    /// Randomize the delay across `[0, computed delay]` to desynchronize
    /// concurrent instances' retries.
    Full,
}

/// One retry rule: which error classes it matches and how it backs off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRule {
    pub error_classes: Vec<String>,
    #[serde(with = "pipewright_types::duration_serde")]
    pub initial_interval: Duration,
    pub max_attempts: u32,
    #[serde(
        default,
        with = "pipewright_types::duration_serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_delay: Option<Duration>,
    pub jitter: Jitter,
}

/// Resolved policy for one task kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPolicy {
    #[serde(with = "pipewright_types::duration_serde")]
    pub timeout: Duration,
    /// Empty means platform default retry only.
    pub retry_rules: Vec<RetryRule>,
    pub completion_mode: CompletionMode,
}

impl TaskPolicy {
    fn new(timeout: Duration, completion_mode: CompletionMode) -> Self {
        Self {
            timeout,
            retry_rules: Vec::new(),
            completion_mode,
        }
    }

    fn with_retry(mut self, rules: Vec<RetryRule>) -> Self {
        self.retry_rules = rules;
        self
    }
}

const HOUR: Duration = Duration::from_secs(3600);
const DAY: Duration = Duration::from_secs(86400);

/// The broadened backend retry applied to non-billed preparatory tasks.
/// Inference is deliberately excluded: it is billed per invocation, and a
/// duplicate run on a transient fault would double-charge.
pub fn broadened_backend_retry() -> Vec<RetryRule> {
    vec![
        RetryRule {
            error_classes: vec![
                error_class::BACKEND_SERVER_ERROR.to_string(),
                error_class::PLATFORM_TASK_FAILED.to_string(),
            ],
            initial_interval: Duration::from_secs(5),
            max_attempts: 3,
            max_delay: None,
            jitter: Jitter::None,
        },
        RetryRule {
            // Capacity issue, retry as much as possible with longer initial delay.
            error_classes: vec![error_class::BACKEND_CAPACITY_ERROR.to_string()],
            initial_interval: Duration::from_secs(60),
            max_attempts: 10,
            max_delay: Some(Duration::from_secs(120)),
            jitter: Jitter::Full,
        },
    ]
}

/// Fixed policy catalog, keyed by task kind.
pub fn policy_for(kind: TaskKind) -> TaskPolicy {
    match kind {
        TaskKind::RunInference | TaskKind::RunRagInference => {
            TaskPolicy::new(12 * HOUR, CompletionMode::FireAndForget)
        }
        TaskKind::PrepareDataset => TaskPolicy::new(HOUR, CompletionMode::FireAndForget)
            .with_retry(broadened_backend_retry()),
        TaskKind::PostProcessOutput
        | TaskKind::PostProcessRagOutput
        | TaskKind::PrepareRagDataset => TaskPolicy::new(HOUR, CompletionMode::FireAndForget),
        TaskKind::InvokePrepareDataset | TaskKind::InvokePostProcessOutput => {
            TaskPolicy::new(HOUR, CompletionMode::WaitForCallbackToken)
        }
        TaskKind::CleanUp | TaskKind::CleanUpRag | TaskKind::CleanUpAgent => {
            TaskPolicy::new(HOUR, CompletionMode::FireAndForget)
        }
        TaskKind::OrchestrateMetricsComputation
        | TaskKind::PrepareAutomatedEvaluation
        | TaskKind::PrepareRagAutomatedEvaluation => {
            TaskPolicy::new(DAY, CompletionMode::WaitForCallbackToken)
        }
        TaskKind::PrepareHumanEvaluation | TaskKind::PrepareRagHumanEvaluation => {
            TaskPolicy::new(30 * DAY, CompletionMode::WaitForCallbackToken)
        }
        TaskKind::PrepareAgentDataset => TaskPolicy::new(HOUR, CompletionMode::FireAndForget),
    }
}

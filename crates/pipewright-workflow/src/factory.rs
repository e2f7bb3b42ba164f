//! Task node factory: builds one executable graph node per task kind.
//!
//! The factory owns the deployment-time environment (account/region identity,
//! compute-backend coordinates, knowledge-base artifact location) and injects
//! it into each node's context record. It performs no I/O; the result is an
//! immutable node descriptor the assembler wires into a graph.

use tracing::debug;

use pipewright_types::{PipewrightError, Result};

use crate::graph::{ContextField, ContextValue, TaskNode};
use crate::kind::{PipelineFamily, TaskKind};
use crate::policy::{policy_for, CompletionMode, TaskPolicy};

// Environment record field names, as the compute backend reads them.
pub const TASK_INPUT: &str = "TASK_INPUT";
pub const TASK_NAME: &str = "TASK_NAME";
pub const MODEL_METADATA_MAP: &str = "MODEL_METADATA_MAP";
pub const SERVICE_ACCOUNT_ID: &str = "SERVICE_ACCOUNT_ID";
pub const ROUTING_CODE: &str = "ROUTING_CODE";
pub const ARN_PARTITION: &str = "ARN_PARTITION";
pub const ERROR: &str = "ERROR";
pub const TASK_TOKEN: &str = "TASK_TOKEN";
pub const IMAGE_URI: &str = "IMAGE_URI";
pub const EXECUTION_ROLE_ARN: &str = "EXECUTION_ROLE_ARN";
pub const LOG_GROUP_NAME: &str = "LOG_GROUP_NAME";
pub const CREDENTIAL_ROLE_ARN: &str = "CREDENTIAL_ROLE_ARN";
pub const SERVICE_SUBNETS: &str = "SERVICE_SUBNETS";
pub const SERVICE_SECURITY_GROUPS: &str = "SERVICE_SECURITY_GROUPS";
pub const KNOWLEDGE_BASE_RUNTIME_ACCOUNT_ID: &str = "KNOWLEDGE_BASE_RUNTIME_ACCOUNT_ID";
pub const KNOWLEDGE_BASE_ARTIFACTS_BUCKET: &str = "KNOWLEDGE_BASE_ARTIFACTS_BUCKET";

/// Deployment stage of the pipeline registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dev,
    Beta,
    Gamma,
    Prod,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Dev => "Dev",
            Stage::Beta => "Beta",
            Stage::Gamma => "Gamma",
            Stage::Prod => "Prod",
        }
    }

    fn lowercase(&self) -> &'static str {
        match self {
            Stage::Dev => "dev",
            Stage::Beta => "beta",
            Stage::Gamma => "gamma",
            Stage::Prod => "prod",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account/region identity of the deployment, shared by every node.
#[derive(Debug, Clone)]
pub struct DeployContext {
    pub stage: Stage,
    pub account_id: String,
    pub region: String,
    pub partition: String,
    pub routing_code: String,
    pub kb_account_id: String,
}

/// Compute-backend coordinates consumed by the isolated-network invoke
/// variants and by the registry's invocation grants.
#[derive(Debug, Clone)]
pub struct BackendTarget {
    pub task_definition: String,
    pub image_uri: String,
    pub execution_role: String,
    pub log_group: String,
    pub credential_role: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
}

/// Knowledge-base artifact coordinates for the retrieval-augmented inference
/// node.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    pub runtime_account_id: String,
    pub artifacts_bucket: String,
}

/// Pre-production stages share a fixed gamma knowledge-base deployment.
const PREPROD_KB_ACCOUNT_ID: &str = "556304931934";

fn artifacts_bucket(stage: Stage, region: &str, account_id: &str) -> String {
    format!(
        "evaluation-data-{}-{}-{}",
        stage.lowercase(),
        region.to_lowercase(),
        account_id
    )
}

impl KnowledgeBase {
    pub fn resolve(deploy: &DeployContext) -> Self {
        match deploy.stage {
            Stage::Beta | Stage::Dev => Self {
                runtime_account_id: PREPROD_KB_ACCOUNT_ID.to_string(),
                artifacts_bucket: artifacts_bucket(Stage::Gamma, "us-east-1", PREPROD_KB_ACCOUNT_ID),
            },
            Stage::Gamma | Stage::Prod => Self {
                runtime_account_id: deploy.kb_account_id.clone(),
                artifacts_bucket: artifacts_bucket(
                    deploy.stage,
                    &deploy.region,
                    &deploy.kb_account_id,
                ),
            },
        }
    }
}

/// Builds task nodes for one pipeline family.
#[derive(Debug, Clone)]
pub struct NodeFactory {
    family: PipelineFamily,
    deploy: DeployContext,
    backend: BackendTarget,
    knowledge_base: Option<KnowledgeBase>,
}

impl NodeFactory {
    pub fn new(family: PipelineFamily, deploy: DeployContext, backend: BackendTarget) -> Self {
        let knowledge_base = match family {
            PipelineFamily::RagEvaluation => Some(KnowledgeBase::resolve(&deploy)),
            _ => None,
        };
        Self {
            family,
            deploy,
            backend,
            knowledge_base,
        }
    }

    pub fn family(&self) -> PipelineFamily {
        self.family
    }

    pub fn deploy(&self) -> &DeployContext {
        &self.deploy
    }

    pub fn backend(&self) -> &BackendTarget {
        &self.backend
    }

    /// Build a node with the catalog policy for `kind`.
    ///
    /// The returned node's `next` edge is unset; the assembler wires forward
    /// edges after every node exists. `catch_target` is final.
    pub fn node_for(
        &self,
        kind: TaskKind,
        catch_target: Option<crate::graph::NodeId>,
    ) -> Result<TaskNode> {
        self.build_node(kind, policy_for(kind), catch_target)
    }

    /// Build a node with an explicit policy.
    pub fn build_node(
        &self,
        kind: TaskKind,
        policy: TaskPolicy,
        catch_target: Option<crate::graph::NodeId>,
    ) -> Result<TaskNode> {
        if !self.family.contains(kind) {
            return Err(PipewrightError::UnknownTaskKind {
                kind: kind.task_name().to_string(),
                family: self.family.to_string(),
            });
        }
        self.check_policy(kind, &policy)?;

        let mut context = vec![
            ContextField::input_path(TASK_INPUT, "$.taskInput"),
            ContextField::literal(TASK_NAME, kind.task_name()),
            ContextField::input_path(MODEL_METADATA_MAP, "$.modelMetadataMap"),
            ContextField::literal(SERVICE_ACCOUNT_ID, &self.deploy.account_id),
            ContextField::literal(ROUTING_CODE, &self.deploy.routing_code),
            ContextField::literal(ARN_PARTITION, &self.deploy.partition),
        ];

        // Only the terminal runs without a catch target; it surfaces the
        // upstream failure to the backend for diagnostic reporting.
        if catch_target.is_none() {
            context.push(ContextField {
                name: ERROR.to_string(),
                value: ContextValue::ErrorDetail,
            });
        }

        if policy.completion_mode == CompletionMode::WaitForCallbackToken {
            context.push(ContextField {
                name: TASK_TOKEN.to_string(),
                value: ContextValue::CallbackToken,
            });
        }

        if kind.is_invoke_variant() {
            context.extend([
                ContextField::literal(IMAGE_URI, &self.backend.image_uri),
                ContextField::literal(EXECUTION_ROLE_ARN, &self.backend.execution_role),
                ContextField::literal(LOG_GROUP_NAME, &self.backend.log_group),
                ContextField::literal(CREDENTIAL_ROLE_ARN, &self.backend.credential_role),
                ContextField::literal(SERVICE_SUBNETS, self.backend.subnets.join(",")),
                ContextField::literal(
                    SERVICE_SECURITY_GROUPS,
                    self.backend.security_groups.join(","),
                ),
            ]);
        }

        if kind.is_rag_inference() {
            if let Some(kb) = &self.knowledge_base {
                context.extend([
                    ContextField::literal(KNOWLEDGE_BASE_RUNTIME_ACCOUNT_ID, &kb.runtime_account_id),
                    ContextField::literal(KNOWLEDGE_BASE_ARTIFACTS_BUCKET, &kb.artifacts_bucket),
                ]);
            }
        }

        debug!(
            kind = %kind,
            timeout_s = policy.timeout.as_secs(),
            retry_rules = policy.retry_rules.len(),
            has_catch = catch_target.is_some(),
            "built task node"
        );

        Ok(TaskNode {
            name: kind.task_name().to_string(),
            kind,
            timeout: policy.timeout,
            retry_rules: policy.retry_rules,
            completion_mode: policy.completion_mode,
            context,
            next: None,
            catch_target,
        })
    }

    fn check_policy(&self, kind: TaskKind, policy: &TaskPolicy) -> Result<()> {
        if policy.timeout.is_zero() {
            return Err(PipewrightError::InvalidPolicy {
                kind: kind.task_name().to_string(),
                reason: "timeout must be positive".to_string(),
            });
        }
        for rule in &policy.retry_rules {
            if rule.max_attempts < 1 {
                return Err(PipewrightError::InvalidPolicy {
                    kind: kind.task_name().to_string(),
                    reason: "retry maxAttempts must be >= 1".to_string(),
                });
            }
            if rule.initial_interval.is_zero() {
                return Err(PipewrightError::InvalidPolicy {
                    kind: kind.task_name().to_string(),
                    reason: "retry initialInterval must be positive".to_string(),
                });
            }
        }
        Ok(())
    }
}

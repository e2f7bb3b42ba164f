//! Rendering a [`Workflow`] into the execution-engine definition document.
//!
//! The engine consumes a `{name, startAt, states}` JSON object. Task states
//! carry the resolved timeout/retry/catch attributes and the environment
//! record for the compute backend; choice states carry one condition arm and
//! a default. State names are the node names, unique within a workflow.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::condition::{BranchCondition, AUTOMATED_JOB_TYPE};
use crate::graph::{ContextValue, Node, Workflow};
use crate::policy::{CompletionMode, Jitter, RetryRule};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub name: String,
    pub start_at: String,
    pub states: BTreeMap<String, StateDefinition>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum StateDefinition {
    #[serde(rename_all = "camelCase")]
    Task {
        /// The backend task definition every node launches.
        resource: String,
        timeout_seconds: u64,
        completion_mode: CompletionMode,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        retry: Vec<RetryDefinition>,
        #[serde(skip_serializing_if = "Option::is_none")]
        catch: Option<CatchDefinition>,
        environment: Vec<EnvironmentEntry>,
        #[serde(skip_serializing_if = "Option::is_none")]
        next: Option<String>,
        #[serde(skip_serializing_if = "is_false")]
        end: bool,
    },
    #[serde(rename_all = "camelCase")]
    Choice {
        choices: Vec<ChoiceRule>,
        default: String,
    },
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryDefinition {
    pub error_equals: Vec<String>,
    pub interval_seconds: u64,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_strategy: Option<&'static str>,
}

impl From<&RetryRule> for RetryDefinition {
    fn from(rule: &RetryRule) -> Self {
        Self {
            error_equals: rule.error_classes.clone(),
            interval_seconds: rule.initial_interval.as_secs(),
            max_attempts: rule.max_attempts,
            max_delay_seconds: rule.max_delay.map(|d| d.as_secs()),
            jitter_strategy: match rule.jitter {
                Jitter::Full => Some("FULL"),
                Jitter::None => None,
            },
        }
    }
}

/// Catch-all failure edge: routes any unretried or exhausted failure.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchDefinition {
    pub next: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceRule {
    pub variable: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_present: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boolean_equals: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_equals: Option<String>,
    pub next: String,
}

impl ChoiceRule {
    fn for_condition(condition: BranchCondition, next: String) -> Self {
        let mut rule = Self {
            variable: condition.input_path().to_string(),
            is_present: None,
            boolean_equals: None,
            string_equals: None,
            next,
        };
        match condition {
            BranchCondition::HasVpcConfig => {
                rule.boolean_equals = Some(true);
            }
            // Optional flags must be present and explicitly true.
            BranchCondition::ShouldSkipInference | BranchCondition::HasEvaluatorModelConfig => {
                rule.is_present = Some(true);
                rule.boolean_equals = Some(true);
            }
            BranchCondition::JobTypeAutomated => {
                rule.string_equals = Some(AUTOMATED_JOB_TYPE.to_string());
            }
        }
        rule
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentEntry {
    pub name: String,
    #[serde(flatten)]
    pub source: EnvironmentSource,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvironmentSource {
    /// Fixed at deployment time.
    Value(String),
    /// Resolved by the engine against the instance input.
    Path(String),
    /// The engine injects the callback token issued at launch.
    CallbackToken(bool),
    /// The engine injects the upstream failure's message/class.
    ErrorDetail(bool),
}

impl From<&ContextValue> for EnvironmentSource {
    fn from(value: &ContextValue) -> Self {
        match value {
            ContextValue::Literal(s) => EnvironmentSource::Value(s.clone()),
            ContextValue::InputPath(p) => EnvironmentSource::Path(p.clone()),
            ContextValue::CallbackToken => EnvironmentSource::CallbackToken(true),
            ContextValue::ErrorDetail => EnvironmentSource::ErrorDetail(true),
        }
    }
}

impl WorkflowDefinition {
    /// Render `workflow` against the backend task definition every node
    /// launches.
    pub fn from_workflow(workflow: &Workflow, resource: &str) -> Self {
        let name_of = |id| {
            workflow
                .node(id)
                .map(Node::name)
                .unwrap_or_default()
                .to_string()
        };

        let mut states = BTreeMap::new();
        for (_, node) in workflow.all_nodes() {
            let state = match node {
                Node::Task(t) => StateDefinition::Task {
                    resource: resource.to_string(),
                    timeout_seconds: t.timeout.as_secs(),
                    completion_mode: t.completion_mode,
                    retry: t.retry_rules.iter().map(RetryDefinition::from).collect(),
                    catch: t.catch_target.map(|target| CatchDefinition {
                        next: name_of(target),
                    }),
                    environment: t
                        .context
                        .iter()
                        .map(|f| EnvironmentEntry {
                            name: f.name.clone(),
                            source: EnvironmentSource::from(&f.value),
                        })
                        .collect(),
                    next: t.next.map(|id| name_of(id)),
                    end: t.next.is_none(),
                },
                Node::Branch(b) => StateDefinition::Choice {
                    choices: vec![ChoiceRule::for_condition(b.condition, name_of(b.on_true))],
                    default: name_of(b.on_false),
                },
            };
            states.insert(node.name().to_string(), state);
        }

        Self {
            name: workflow.name.clone(),
            start_at: name_of(workflow.entry()),
            states,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::factory::{BackendTarget, DeployContext, NodeFactory, Stage};
    use crate::kind::PipelineFamily;

    fn rendered(family: PipelineFamily) -> serde_json::Value {
        let deploy = DeployContext {
            stage: Stage::Prod,
            account_id: "123456789012".into(),
            region: "us-east-1".into(),
            partition: "aws".into(),
            routing_code: "IAD".into(),
            kb_account_id: "210987654321".into(),
        };
        let backend = BackendTarget {
            task_definition: "evaluation-runner".into(),
            image_uri: "registry/evaluation-runner:9".into(),
            execution_role: "role/exec".into(),
            log_group: "/evaluation/runner".into(),
            credential_role: "role/cred".into(),
            subnets: vec!["subnet-a".into()],
            security_groups: vec!["sg-1".into()],
        };
        let factory = NodeFactory::new(family, deploy, backend);
        let workflow = assemble(&factory).unwrap();
        let definition = WorkflowDefinition::from_workflow(&workflow, "evaluation-runner");
        serde_json::to_value(&definition).unwrap()
    }

    #[test]
    fn start_at_is_entry_name() {
        let doc = rendered(PipelineFamily::ModelEvaluation);
        assert_eq!(doc["startAt"], "HasVpcConfigBeforeEval?");
        assert_eq!(doc["states"].as_object().unwrap().len(), 14);
    }

    #[test]
    fn prepare_dataset_retry_rendered_verbatim() {
        let doc = rendered(PipelineFamily::ModelEvaluation);
        let retry = &doc["states"]["PrepareDatasetTask"]["retry"];
        assert_eq!(
            retry[0]["errorEquals"],
            serde_json::json!(["Backend.ServerError", "Platform.TaskFailed"])
        );
        assert_eq!(retry[0]["intervalSeconds"], 5);
        assert_eq!(retry[0]["maxAttempts"], 3);
        assert!(retry[0].get("maxDelaySeconds").is_none());
        assert!(retry[0].get("jitterStrategy").is_none());

        assert_eq!(retry[1]["errorEquals"], serde_json::json!(["Backend.CapacityError"]));
        assert_eq!(retry[1]["intervalSeconds"], 60);
        assert_eq!(retry[1]["maxAttempts"], 10);
        assert_eq!(retry[1]["maxDelaySeconds"], 120);
        assert_eq!(retry[1]["jitterStrategy"], "FULL");
    }

    #[test]
    fn inference_has_no_retry_block() {
        let doc = rendered(PipelineFamily::ModelEvaluation);
        let state = &doc["states"]["RunInferenceTask"];
        assert!(state.get("retry").is_none());
        assert_eq!(state["timeoutSeconds"], 12 * 3600);
        assert_eq!(state["completionMode"], "fireAndForget");
    }

    #[test]
    fn choice_states_have_one_arm_and_default() {
        let doc = rendered(PipelineFamily::ModelEvaluation);
        let state = &doc["states"]["ShouldSkipInference?"];
        assert_eq!(state["type"], "choice");
        let choices = state["choices"].as_array().unwrap();
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0]["variable"], "$.shouldSkipInference");
        assert_eq!(choices[0]["isPresent"], true);
        assert_eq!(choices[0]["booleanEquals"], true);
        assert_eq!(choices[0]["next"], "ScoringMode?");
        assert_eq!(state["default"], "RunInferenceTask");
        // Choice states carry no catch or timeout.
        assert!(state.get("catch").is_none());
        assert!(state.get("timeoutSeconds").is_none());
    }

    #[test]
    fn scoring_choice_compares_job_type_string() {
        let doc = rendered(PipelineFamily::ModelEvaluation);
        let choices = doc["states"]["ScoringMode?"]["choices"].as_array().unwrap();
        assert_eq!(choices[0]["variable"], "$.jobType");
        assert_eq!(choices[0]["stringEquals"], "Automated");
        assert!(choices[0].get("isPresent").is_none());
    }

    #[test]
    fn terminal_state_ends_with_error_detail() {
        let doc = rendered(PipelineFamily::ModelEvaluation);
        let state = &doc["states"]["CleanUpTask"];
        assert_eq!(state["end"], true);
        assert!(state.get("next").is_none());
        assert!(state.get("catch").is_none());
        let env = state["environment"].as_array().unwrap();
        assert!(env
            .iter()
            .any(|e| e["name"] == "ERROR" && e["errorDetail"] == true));
    }

    #[test]
    fn non_terminal_states_catch_to_cleanup() {
        let doc = rendered(PipelineFamily::RagEvaluation);
        for name in [
            "PrepareRAGDatasetTask",
            "RunRAGInferenceTask",
            "PrepareRAGAutomatedEvaluationTask",
            "PrepareRAGHumanEvaluationTask",
            "PostProcessRAGOutputTask",
        ] {
            assert_eq!(
                doc["states"][name]["catch"]["next"], "CleanUpRAGTask",
                "{name} should catch to cleanup"
            );
        }
    }

    #[test]
    fn callback_nodes_render_token_marker() {
        let doc = rendered(PipelineFamily::ModelEvaluation);
        let state = &doc["states"]["PrepareHumanEvaluationTask"];
        assert_eq!(state["completionMode"], "waitForCallbackToken");
        let env = state["environment"].as_array().unwrap();
        assert!(env
            .iter()
            .any(|e| e["name"] == "TASK_TOKEN" && e["callbackToken"] == true));
    }

    #[test]
    fn rag_definition_starts_at_dataset_preparation() {
        let doc = rendered(PipelineFamily::RagEvaluation);
        assert_eq!(doc["startAt"], "PrepareRAGDatasetTask");
        assert_eq!(doc["states"].as_object().unwrap().len(), 8);
    }

    #[test]
    fn environment_paths_render_as_path_entries() {
        let doc = rendered(PipelineFamily::AgentEvaluation);
        let env = doc["states"]["PrepareAgentDatasetTask"]["environment"]
            .as_array()
            .unwrap();
        assert!(env
            .iter()
            .any(|e| e["name"] == "TASK_INPUT" && e["path"] == "$.taskInput"));
        assert!(env
            .iter()
            .any(|e| e["name"] == "TASK_NAME" && e["value"] == "PrepareAgentDatasetTask"));
    }
}

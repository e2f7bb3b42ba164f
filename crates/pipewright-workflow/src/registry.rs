//! Pipeline registry: one assembled, validated workflow per family, plus the
//! authorization edges the deployment layer must grant so the execution
//! engine can launch the compute backend for every node.

use serde::Serialize;
use tracing::info;

use pipewright_types::Result;

use crate::assembler::assemble;
use crate::factory::{BackendTarget, DeployContext, NodeFactory};
use crate::graph::Workflow;
use crate::kind::PipelineFamily;
use crate::validation::validate_or_raise;

/// Permission for one workflow to launch the backend's task definition.
///
/// The resource covers every revision of the task definition, not just the
/// latest: the deployed identifier is versioned, and latest-version-only
/// grants have been observed to reject execution against a pinned revision.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationGrant {
    pub workflow: String,
    pub action: String,
    pub resource: String,
}

impl InvocationGrant {
    fn for_workflow(workflow: &str, deploy: &DeployContext, backend: &BackendTarget) -> Self {
        Self {
            workflow: workflow.to_string(),
            action: "backend:RunTask".to_string(),
            resource: format!(
                "arn:{}:backend:{}:{}:task-definition/{}:*",
                deploy.partition, deploy.region, deploy.account_id, backend.task_definition
            ),
        }
    }
}

/// All assembled workflows for one deployment.
#[derive(Debug, Clone)]
pub struct PipelineRegistry {
    workflows: Vec<(PipelineFamily, Workflow)>,
    grants: Vec<InvocationGrant>,
}

impl PipelineRegistry {
    /// Assemble and validate every pipeline family's workflow.
    pub fn build(deploy: DeployContext, backend: BackendTarget) -> Result<Self> {
        let mut workflows = Vec::new();
        let mut grants = Vec::new();
        for family in PipelineFamily::ALL {
            let factory = NodeFactory::new(*family, deploy.clone(), backend.clone());
            let workflow = assemble(&factory)?;
            validate_or_raise(&workflow)?;
            grants.push(InvocationGrant::for_workflow(&workflow.name, &deploy, &backend));
            workflows.push((*family, workflow));
        }
        info!(
            workflows = workflows.len(),
            stage = %deploy.stage,
            "built pipeline registry"
        );
        Ok(Self { workflows, grants })
    }

    pub fn workflows(&self) -> impl Iterator<Item = &Workflow> {
        self.workflows.iter().map(|(_, w)| w)
    }

    pub fn workflow(&self, family: PipelineFamily) -> Option<&Workflow> {
        self.workflows
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, w)| w)
    }

    pub fn grants(&self) -> &[InvocationGrant] {
        &self.grants
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::Stage;

    fn deploy() -> DeployContext {
        DeployContext {
            stage: Stage::Prod,
            account_id: "123456789012".into(),
            region: "us-west-2".into(),
            partition: "aws".into(),
            routing_code: "PDX".into(),
            kb_account_id: "210987654321".into(),
        }
    }

    fn backend() -> BackendTarget {
        BackendTarget {
            task_definition: "evaluation-runner".into(),
            image_uri: "registry/evaluation-runner:42".into(),
            execution_role: "role/exec".into(),
            log_group: "/evaluation/runner".into(),
            credential_role: "role/cred".into(),
            subnets: vec!["subnet-a".into()],
            security_groups: vec!["sg-1".into()],
        }
    }

    #[test]
    fn builds_one_workflow_per_family() {
        let registry = PipelineRegistry::build(deploy(), backend()).unwrap();
        assert_eq!(registry.workflows().count(), 3);
        for family in PipelineFamily::ALL {
            let workflow = registry.workflow(*family).unwrap();
            assert!(workflow.name.starts_with(family.workflow_name()));
            assert!(workflow.name.ends_with("-Prod"));
        }
    }

    #[test]
    fn one_grant_per_workflow_covering_all_revisions() {
        let registry = PipelineRegistry::build(deploy(), backend()).unwrap();
        let grants = registry.grants();
        assert_eq!(grants.len(), 3);
        for grant in grants {
            assert_eq!(grant.action, "backend:RunTask");
            assert_eq!(
                grant.resource,
                "arn:aws:backend:us-west-2:123456789012:task-definition/evaluation-runner:*"
            );
            assert!(
                grant.resource.ends_with(":*"),
                "grant must cover all task-definition revisions"
            );
        }
        let names: Vec<_> = registry.workflows().map(|w| w.name.as_str()).collect();
        for grant in grants {
            assert!(names.contains(&grant.workflow.as_str()));
        }
    }

    #[test]
    fn grant_serializes_camel_case() {
        let registry = PipelineRegistry::build(deploy(), backend()).unwrap();
        let json = serde_json::to_value(&registry.grants()[0]).unwrap();
        assert!(json.get("workflow").is_some());
        assert!(json.get("action").is_some());
        assert!(json.get("resource").is_some());
    }
}

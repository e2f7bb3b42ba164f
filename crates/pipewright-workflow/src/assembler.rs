//! Workflow assembly: one parameterized template, three pipeline families.
//!
//! Build order is leaf-first: the terminal cleanup node exists before any
//! predecessor, so catch edges can reference it immediately. Forward edges
//! are wired afterwards, top-down, through the arena builder. Branching is
//! structural: the assembler never evaluates a condition; it only produces
//! the two arms the engine chooses between at run time.

use tracing::info;

use pipewright_types::Result;

use crate::condition::BranchCondition;
use crate::factory::NodeFactory;
use crate::graph::{BranchNode, Node, NodeId, TaskNode, Workflow};
use crate::kind::{PipelineFamily, TaskKind};

/// Owned-arena builder. Does not enforce graph invariants; run
/// [`crate::validation::validate`] on the finished workflow.
#[derive(Debug, Default)]
pub struct WorkflowBuilder {
    nodes: Vec<Node>,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, node: TaskNode) -> NodeId {
        self.nodes.push(Node::Task(node));
        NodeId(self.nodes.len() - 1)
    }

    pub fn add_branch(
        &mut self,
        name: impl Into<String>,
        condition: BranchCondition,
        on_true: NodeId,
        on_false: NodeId,
    ) -> NodeId {
        self.nodes.push(Node::Branch(BranchNode {
            name: name.into(),
            condition,
            on_true,
            on_false,
        }));
        NodeId(self.nodes.len() - 1)
    }

    /// Wire a task node's forward edge. No-op for branch nodes; their arms
    /// are fixed at creation.
    pub fn set_next(&mut self, from: NodeId, to: NodeId) {
        if let Some(Node::Task(t)) = self.nodes.get_mut(from.0) {
            t.next = Some(to);
        }
    }

    pub fn finish(self, name: impl Into<String>, entry: NodeId, terminal: NodeId) -> Workflow {
        Workflow::new(name.into(), entry, self.nodes, terminal)
    }
}

/// Assemble the workflow for the factory's family.
pub fn assemble(factory: &NodeFactory) -> Result<Workflow> {
    let workflow = match factory.family() {
        PipelineFamily::ModelEvaluation => assemble_model_evaluation(factory),
        PipelineFamily::RagEvaluation => assemble_rag_evaluation(factory),
        PipelineFamily::AgentEvaluation => assemble_agent_evaluation(factory),
    }?;
    info!(
        workflow = %workflow.name,
        nodes = workflow.node_count(),
        "assembled workflow"
    );
    Ok(workflow)
}

fn workflow_name(factory: &NodeFactory) -> String {
    format!(
        "{}-{}",
        factory.family().workflow_name(),
        factory.deploy().stage
    )
}

/// Standard family: network-isolation branches around dataset preparation and
/// post-processing, an inference-skip branch, and a two-level scoring branch.
fn assemble_model_evaluation(f: &NodeFactory) -> Result<Workflow> {
    let mut b = WorkflowBuilder::new();

    let clean_up = b.add_task(f.node_for(TaskKind::CleanUp, None)?);
    let prepare_dataset = b.add_task(f.node_for(TaskKind::PrepareDataset, Some(clean_up))?);
    let run_inference = b.add_task(f.node_for(TaskKind::RunInference, Some(clean_up))?);
    let orchestrate_metrics =
        b.add_task(f.node_for(TaskKind::OrchestrateMetricsComputation, Some(clean_up))?);
    let prepare_automated =
        b.add_task(f.node_for(TaskKind::PrepareAutomatedEvaluation, Some(clean_up))?);
    let prepare_human =
        b.add_task(f.node_for(TaskKind::PrepareHumanEvaluation, Some(clean_up))?);
    let post_process = b.add_task(f.node_for(TaskKind::PostProcessOutput, Some(clean_up))?);
    let invoke_prepare_dataset =
        b.add_task(f.node_for(TaskKind::InvokePrepareDataset, Some(clean_up))?);
    let invoke_post_process =
        b.add_task(f.node_for(TaskKind::InvokePostProcessOutput, Some(clean_up))?);

    // Post-processing: isolated-network variant when the customer declares a
    // VPC config. Both arms converge on cleanup.
    b.set_next(invoke_post_process, clean_up);
    b.set_next(post_process, clean_up);
    let vpc_after_eval = b.add_branch(
        "HasVpcConfigAfterEval?",
        BranchCondition::HasVpcConfig,
        invoke_post_process,
        post_process,
    );

    // Scoring. Automated jobs sub-branch on whether an evaluator model is
    // configured; everything else goes to human evaluation.
    b.set_next(orchestrate_metrics, vpc_after_eval);
    b.set_next(prepare_automated, vpc_after_eval);
    let evaluator_model = b.add_branch(
        "HasEvaluatorModelConfig?",
        BranchCondition::HasEvaluatorModelConfig,
        orchestrate_metrics,
        prepare_automated,
    );
    b.set_next(prepare_human, vpc_after_eval);
    let scoring = b.add_branch(
        "ScoringMode?",
        BranchCondition::JobTypeAutomated,
        evaluator_model,
        prepare_human,
    );

    b.set_next(run_inference, scoring);
    let skip_inference = b.add_branch(
        "ShouldSkipInference?",
        BranchCondition::ShouldSkipInference,
        scoring,
        run_inference,
    );

    b.set_next(invoke_prepare_dataset, skip_inference);
    b.set_next(prepare_dataset, skip_inference);
    let entry = b.add_branch(
        "HasVpcConfigBeforeEval?",
        BranchCondition::HasVpcConfig,
        invoke_prepare_dataset,
        prepare_dataset,
    );

    Ok(b.finish(workflow_name(f), entry, clean_up))
}

/// Retrieval-augmented family: same template without network-isolation
/// branching and without the evaluator-model sub-branch; post-processing runs
/// after scoring on both arms.
fn assemble_rag_evaluation(f: &NodeFactory) -> Result<Workflow> {
    let mut b = WorkflowBuilder::new();

    let clean_up = b.add_task(f.node_for(TaskKind::CleanUpRag, None)?);
    let prepare_dataset = b.add_task(f.node_for(TaskKind::PrepareRagDataset, Some(clean_up))?);
    let run_inference = b.add_task(f.node_for(TaskKind::RunRagInference, Some(clean_up))?);
    let prepare_automated =
        b.add_task(f.node_for(TaskKind::PrepareRagAutomatedEvaluation, Some(clean_up))?);
    let prepare_human =
        b.add_task(f.node_for(TaskKind::PrepareRagHumanEvaluation, Some(clean_up))?);
    let post_process = b.add_task(f.node_for(TaskKind::PostProcessRagOutput, Some(clean_up))?);

    b.set_next(post_process, clean_up);
    b.set_next(prepare_automated, post_process);
    b.set_next(prepare_human, post_process);
    let scoring = b.add_branch(
        "RagScoringMode?",
        BranchCondition::JobTypeAutomated,
        prepare_automated,
        prepare_human,
    );

    b.set_next(run_inference, scoring);
    let skip_inference = b.add_branch(
        "ShouldSkipRagInference?",
        BranchCondition::ShouldSkipInference,
        scoring,
        run_inference,
    );

    b.set_next(prepare_dataset, skip_inference);

    Ok(b.finish(workflow_name(f), prepare_dataset, clean_up))
}

/// Agent family: the degenerate zero-branch form, terminal plus one task
/// whose catch and forward edges both reach it.
fn assemble_agent_evaluation(f: &NodeFactory) -> Result<Workflow> {
    let mut b = WorkflowBuilder::new();

    let clean_up = b.add_task(f.node_for(TaskKind::CleanUpAgent, None)?);
    let prepare_dataset = b.add_task(f.node_for(TaskKind::PrepareAgentDataset, Some(clean_up))?);
    b.set_next(prepare_dataset, clean_up);

    Ok(b.finish(workflow_name(f), prepare_dataset, clean_up))
}

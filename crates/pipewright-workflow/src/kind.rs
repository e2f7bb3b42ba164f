//! Task kinds and pipeline families.
//!
//! A [`TaskKind`] is the immutable identity of one unit of work. A
//! [`PipelineFamily`] names one of the three top-level evaluation workflows
//! and owns the set of kinds that may appear in its graph.

/// Identity of a unit of work across all pipeline families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    // Standard model-evaluation family
    PrepareDataset,
    RunInference,
    PrepareAutomatedEvaluation,
    PrepareHumanEvaluation,
    OrchestrateMetricsComputation,
    PostProcessOutput,
    CleanUp,
    InvokePrepareDataset,
    InvokePostProcessOutput,

    // Retrieval-augmented family
    PrepareRagDataset,
    RunRagInference,
    PrepareRagAutomatedEvaluation,
    PrepareRagHumanEvaluation,
    PostProcessRagOutput,
    CleanUpRag,

    // Agent family
    PrepareAgentDataset,
    CleanUpAgent,
}

impl TaskKind {
    /// Wire name of the task, as passed to the compute backend in `TASK_NAME`
    /// and used as the node's unique name within its workflow.
    pub fn task_name(&self) -> &'static str {
        match self {
            TaskKind::PrepareDataset => "PrepareDatasetTask",
            TaskKind::RunInference => "RunInferenceTask",
            TaskKind::PrepareAutomatedEvaluation => "PrepareAutomatedEvaluationTask",
            TaskKind::PrepareHumanEvaluation => "PrepareHumanEvaluationTask",
            TaskKind::OrchestrateMetricsComputation => "OrchestrateMetricsComputationTask",
            TaskKind::PostProcessOutput => "PostProcessOutputTask",
            TaskKind::CleanUp => "CleanUpTask",
            TaskKind::InvokePrepareDataset => "InvokePrepareDatasetTask",
            TaskKind::InvokePostProcessOutput => "InvokePostProcessOutputTask",
            TaskKind::PrepareRagDataset => "PrepareRAGDatasetTask",
            TaskKind::RunRagInference => "RunRAGInferenceTask",
            TaskKind::PrepareRagAutomatedEvaluation => "PrepareRAGAutomatedEvaluationTask",
            TaskKind::PrepareRagHumanEvaluation => "PrepareRAGHumanEvaluationTask",
            TaskKind::PostProcessRagOutput => "PostProcessRAGOutputTask",
            TaskKind::CleanUpRag => "CleanUpRAGTask",
            TaskKind::PrepareAgentDataset => "PrepareAgentDatasetTask",
            TaskKind::CleanUpAgent => "CleanUpAgentTask",
        }
    }

    /// The two kinds that run in an isolated network context and receive
    /// backend image/network placement parameters.
    pub fn is_invoke_variant(&self) -> bool {
        matches!(
            self,
            TaskKind::InvokePrepareDataset | TaskKind::InvokePostProcessOutput
        )
    }

    /// The retrieval-augmented inference kind, which receives knowledge-base
    /// account/bucket coordinates.
    pub fn is_rag_inference(&self) -> bool {
        matches!(self, TaskKind::RunRagInference)
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.task_name())
    }
}

/// One of the three top-level evaluation workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineFamily {
    ModelEvaluation,
    RagEvaluation,
    AgentEvaluation,
}

const MODEL_EVALUATION_KINDS: &[TaskKind] = &[
    TaskKind::PrepareDataset,
    TaskKind::RunInference,
    TaskKind::PrepareAutomatedEvaluation,
    TaskKind::PrepareHumanEvaluation,
    TaskKind::OrchestrateMetricsComputation,
    TaskKind::PostProcessOutput,
    TaskKind::CleanUp,
    TaskKind::InvokePrepareDataset,
    TaskKind::InvokePostProcessOutput,
];

const RAG_EVALUATION_KINDS: &[TaskKind] = &[
    TaskKind::PrepareRagDataset,
    TaskKind::RunRagInference,
    TaskKind::PrepareRagAutomatedEvaluation,
    TaskKind::PrepareRagHumanEvaluation,
    TaskKind::PostProcessRagOutput,
    TaskKind::CleanUpRag,
];

const AGENT_EVALUATION_KINDS: &[TaskKind] = &[TaskKind::PrepareAgentDataset, TaskKind::CleanUpAgent];

impl PipelineFamily {
    pub const ALL: &'static [PipelineFamily] = &[
        PipelineFamily::ModelEvaluation,
        PipelineFamily::RagEvaluation,
        PipelineFamily::AgentEvaluation,
    ];

    /// The kinds that may appear in this family's graph.
    pub fn kinds(&self) -> &'static [TaskKind] {
        match self {
            PipelineFamily::ModelEvaluation => MODEL_EVALUATION_KINDS,
            PipelineFamily::RagEvaluation => RAG_EVALUATION_KINDS,
            PipelineFamily::AgentEvaluation => AGENT_EVALUATION_KINDS,
        }
    }

    pub fn contains(&self, kind: TaskKind) -> bool {
        self.kinds().contains(&kind)
    }

    /// The family's terminal cleanup kind.
    pub fn terminal_kind(&self) -> TaskKind {
        match self {
            PipelineFamily::ModelEvaluation => TaskKind::CleanUp,
            PipelineFamily::RagEvaluation => TaskKind::CleanUpRag,
            PipelineFamily::AgentEvaluation => TaskKind::CleanUpAgent,
        }
    }

    /// Base workflow name; the assembler appends the deployment stage.
    pub fn workflow_name(&self) -> &'static str {
        match self {
            PipelineFamily::ModelEvaluation => "ModelEvaluationWorkflow",
            PipelineFamily::RagEvaluation => "RagEvaluationWorkflow",
            PipelineFamily::AgentEvaluation => "AgentEvaluationWorkflow",
        }
    }
}

impl std::fmt::Display for PipelineFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineFamily::ModelEvaluation => "ModelEvaluation",
            PipelineFamily::RagEvaluation => "RagEvaluation",
            PipelineFamily::AgentEvaluation => "AgentEvaluation",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_names_are_unique() {
        let all: Vec<&str> = PipelineFamily::ALL
            .iter()
            .flat_map(|f| f.kinds())
            .map(|k| k.task_name())
            .collect();
        let mut deduped = all.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(all.len(), deduped.len());
    }

    #[test]
    fn families_contain_their_terminal() {
        for family in PipelineFamily::ALL {
            assert!(family.contains(family.terminal_kind()));
        }
    }

    #[test]
    fn families_do_not_share_kinds() {
        assert!(!PipelineFamily::ModelEvaluation.contains(TaskKind::PrepareRagDataset));
        assert!(!PipelineFamily::RagEvaluation.contains(TaskKind::PrepareDataset));
        assert!(!PipelineFamily::AgentEvaluation.contains(TaskKind::CleanUp));
    }

    #[test]
    fn invoke_variants_flagged() {
        assert!(TaskKind::InvokePrepareDataset.is_invoke_variant());
        assert!(TaskKind::InvokePostProcessOutput.is_invoke_variant());
        assert!(!TaskKind::PrepareDataset.is_invoke_variant());
        assert!(!TaskKind::RunRagInference.is_invoke_variant());
    }

    #[test]
    fn rag_wire_names_keep_rag_uppercase() {
        assert_eq!(TaskKind::PrepareRagDataset.task_name(), "PrepareRAGDatasetTask");
        assert_eq!(TaskKind::CleanUpRag.task_name(), "CleanUpRAGTask");
    }

    #[test]
    fn agent_family_is_minimal() {
        assert_eq!(PipelineFamily::AgentEvaluation.kinds().len(), 2);
        assert_eq!(
            PipelineFamily::AgentEvaluation.terminal_kind(),
            TaskKind::CleanUpAgent
        );
    }
}

//! Workflow validation: structural invariant rules and diagnostics.
//!
//! The builder does not enforce invariants, so every assembled workflow is
//! checked here before it leaves the registry. Call [`validate`] for advisory
//! diagnostics or [`validate_or_raise`] to fail on the first `Error`-severity
//! issue.

use std::collections::{HashSet, VecDeque};

use crate::graph::{Node, NodeId, Workflow};

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub node: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

// ---------------------------------------------------------------------------
// GraphRule trait
// ---------------------------------------------------------------------------

pub trait GraphRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, workflow: &Workflow) -> Vec<Diagnostic>;
}

fn error(rule: &dyn GraphRule, message: String, node: Option<String>) -> Diagnostic {
    Diagnostic {
        rule: rule.name().to_string(),
        severity: Severity::Error,
        message,
        node,
    }
}

/// Nodes reachable from the entry along forward edges.
fn reachable_forward(workflow: &Workflow) -> HashSet<NodeId> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert(workflow.entry());
    queue.push_back(workflow.entry());
    while let Some(current) = queue.pop_front() {
        for next in workflow.successors(current) {
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
    }
    visited
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Every referenced node id (entry, terminal, forward edges, catch edges,
/// branch arms) must resolve to a node in the arena.
struct EdgeTargetExistsRule;
impl GraphRule for EdgeTargetExistsRule {
    fn name(&self) -> &str {
        "edge_target_exists"
    }
    fn apply(&self, workflow: &Workflow) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        let mut check = |from: &str, label: &str, id: NodeId| {
            if workflow.node(id).is_none() {
                diags.push(error(
                    self,
                    format!("Node '{from}' has {label} edge to non-existent node {}", id.index()),
                    Some(from.to_string()),
                ));
            }
        };
        for (_, node) in workflow.all_nodes() {
            match node {
                Node::Task(t) => {
                    if let Some(next) = t.next {
                        check(&t.name, "forward", next);
                    }
                    if let Some(catch) = t.catch_target {
                        check(&t.name, "catch", catch);
                    }
                }
                Node::Branch(b) => {
                    check(&b.name, "true-arm", b.on_true);
                    check(&b.name, "false-arm", b.on_false);
                }
            }
        }
        if workflow.node(workflow.entry()).is_none() {
            diags.push(error(
                self,
                format!("Entry id {} does not exist", workflow.entry().index()),
                None,
            ));
        }
        if workflow.node(workflow.terminal()).is_none() {
            diags.push(error(
                self,
                format!("Terminal id {} does not exist", workflow.terminal().index()),
                None,
            ));
        }
        diags
    }
}

/// Every reachable non-terminal task node has a catch edge.
struct CatchCoverageRule;
impl GraphRule for CatchCoverageRule {
    fn name(&self) -> &str {
        "catch_coverage"
    }
    fn apply(&self, workflow: &Workflow) -> Vec<Diagnostic> {
        let reachable = reachable_forward(workflow);
        workflow
            .all_nodes()
            .filter(|(id, _)| *id != workflow.terminal() && reachable.contains(id))
            .filter_map(|(_, node)| node.as_task())
            .filter(|t| t.catch_target.is_none())
            .map(|t| {
                error(
                    self,
                    format!("Non-terminal node '{}' has no catch edge", t.name),
                    Some(t.name.clone()),
                )
            })
            .collect()
    }
}

/// Following catch edges from any node reaches the terminal
/// within a bound equal to the node count, so catch cycles are impossible.
struct CatchTerminationRule;
impl GraphRule for CatchTerminationRule {
    fn name(&self) -> &str {
        "catch_termination"
    }
    fn apply(&self, workflow: &Workflow) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for (id, node) in workflow.all_nodes() {
            let Some(task) = node.as_task() else { continue };
            if task.catch_target.is_none() {
                continue;
            }
            let mut current = id;
            let mut hops = 0;
            loop {
                if current == workflow.terminal() {
                    break;
                }
                if hops > workflow.node_count() {
                    diags.push(error(
                        self,
                        format!(
                            "Catch chain from '{}' does not reach the terminal within {} hops",
                            task.name,
                            workflow.node_count()
                        ),
                        Some(task.name.clone()),
                    ));
                    break;
                }
                match workflow.task(current).and_then(|t| t.catch_target) {
                    Some(next) => {
                        current = next;
                        hops += 1;
                    }
                    None => {
                        diags.push(error(
                            self,
                            format!(
                                "Catch chain from '{}' dead-ends at '{}' before the terminal",
                                task.name,
                                workflow.node(current).map(Node::name).unwrap_or("?")
                            ),
                            Some(task.name.clone()),
                        ));
                        break;
                    }
                }
            }
        }
        diags
    }
}

/// The graph is acyclic along forward (success) edges.
struct ForwardAcyclicRule;
impl GraphRule for ForwardAcyclicRule {
    fn name(&self) -> &str {
        "forward_acyclic"
    }
    fn apply(&self, workflow: &Workflow) -> Vec<Diagnostic> {
        // Iterative DFS with a three-color marking.
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Gray,
            Black,
        }
        let mut marks = vec![Mark::White; workflow.node_count()];
        let mut diags = Vec::new();

        for (start, _) in workflow.all_nodes() {
            if marks[start.index()] != Mark::White {
                continue;
            }
            let mut stack = vec![(start, 0usize)];
            marks[start.index()] = Mark::Gray;
            while let Some((current, edge)) = stack.pop() {
                let succs = workflow.successors(current);
                if edge < succs.len() {
                    stack.push((current, edge + 1));
                    let next = succs[edge];
                    if next.index() >= marks.len() {
                        continue; // dangling edge; EdgeTargetExistsRule reports it
                    }
                    match marks[next.index()] {
                        Mark::White => {
                            marks[next.index()] = Mark::Gray;
                            stack.push((next, 0));
                        }
                        Mark::Gray => {
                            diags.push(error(
                                self,
                                format!(
                                    "Forward cycle through '{}'",
                                    workflow.node(next).map(Node::name).unwrap_or("?")
                                ),
                                workflow.node(next).map(|n| n.name().to_string()),
                            ));
                        }
                        Mark::Black => {}
                    }
                } else {
                    marks[current.index()] = Mark::Black;
                }
            }
        }
        diags
    }
}

/// The terminal is reachable from every node via a success or catch path.
struct TerminalReachableRule;
impl GraphRule for TerminalReachableRule {
    fn name(&self) -> &str {
        "terminal_reachable"
    }
    fn apply(&self, workflow: &Workflow) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for (start, node) in workflow.all_nodes() {
            let mut visited = HashSet::new();
            let mut queue = VecDeque::new();
            visited.insert(start);
            queue.push_back(start);
            let mut found = start == workflow.terminal();
            while let Some(current) = queue.pop_front() {
                if current == workflow.terminal() {
                    found = true;
                    break;
                }
                let mut targets = workflow.successors(current);
                if let Some(catch) = workflow.task(current).and_then(|t| t.catch_target) {
                    targets.push(catch);
                }
                for next in targets {
                    if visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
            if !found {
                diags.push(error(
                    self,
                    format!("Terminal is not reachable from '{}'", node.name()),
                    Some(node.name().to_string()),
                ));
            }
        }
        diags
    }
}

/// The terminal has no outgoing success edge (and no catch of its own).
struct TerminalNoOutgoingRule;
impl GraphRule for TerminalNoOutgoingRule {
    fn name(&self) -> &str {
        "terminal_no_outgoing"
    }
    fn apply(&self, workflow: &Workflow) -> Vec<Diagnostic> {
        let Some(terminal) = workflow.node(workflow.terminal()) else {
            return vec![]; // EdgeTargetExistsRule reports this
        };
        let mut diags = Vec::new();
        match terminal {
            Node::Task(t) => {
                if t.next.is_some() {
                    diags.push(error(
                        self,
                        format!("Terminal '{}' has an outgoing success edge", t.name),
                        Some(t.name.clone()),
                    ));
                }
                if t.catch_target.is_some() {
                    diags.push(error(
                        self,
                        format!("Terminal '{}' has a catch edge", t.name),
                        Some(t.name.clone()),
                    ));
                }
            }
            Node::Branch(b) => {
                diags.push(error(
                    self,
                    format!("Terminal '{}' is a branch node", b.name),
                    Some(b.name.clone()),
                ));
            }
        }
        diags
    }
}

/// Branch nodes are pure routing. Two arms is structural in this model;
/// warn when both arms point at the same node, since such a branch routes
/// nothing.
struct BranchShapeRule;
impl GraphRule for BranchShapeRule {
    fn name(&self) -> &str {
        "branch_shape"
    }
    fn apply(&self, workflow: &Workflow) -> Vec<Diagnostic> {
        workflow
            .all_nodes()
            .filter_map(|(_, n)| n.as_branch())
            .filter(|b| b.on_true == b.on_false)
            .map(|b| Diagnostic {
                rule: self.name().to_string(),
                severity: Severity::Warning,
                message: format!("Branch '{}' has identical true/false arms", b.name),
                node: Some(b.name.clone()),
            })
            .collect()
    }
}

/// The entry is the single way into the graph; nothing may point back at it.
struct EntryNoIncomingRule;
impl GraphRule for EntryNoIncomingRule {
    fn name(&self) -> &str {
        "entry_no_incoming"
    }
    fn apply(&self, workflow: &Workflow) -> Vec<Diagnostic> {
        let entry = workflow.entry();
        let has_incoming = workflow.all_nodes().any(|(_, node)| {
            let mut targets = node.successors();
            if let Some(catch) = node.as_task().and_then(|t| t.catch_target) {
                targets.push(catch);
            }
            targets.contains(&entry)
        });
        if has_incoming {
            let name = workflow
                .node(entry)
                .map(|n| n.name().to_string())
                .unwrap_or_default();
            vec![error(
                self,
                format!("Entry '{name}' has incoming edges"),
                Some(name),
            )]
        } else {
            vec![]
        }
    }
}

/// Every node is reachable from the entry along forward edges.
struct ForwardReachabilityRule;
impl GraphRule for ForwardReachabilityRule {
    fn name(&self) -> &str {
        "reachability"
    }
    fn apply(&self, workflow: &Workflow) -> Vec<Diagnostic> {
        let reachable = reachable_forward(workflow);
        workflow
            .all_nodes()
            .filter(|(id, _)| !reachable.contains(id) && *id != workflow.terminal())
            .map(|(_, node)| {
                error(
                    self,
                    format!("Node '{}' is not reachable from the entry", node.name()),
                    Some(node.name().to_string()),
                )
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all invariant rules and return collected diagnostics.
pub fn validate(workflow: &Workflow) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn GraphRule>> = vec![
        Box::new(EdgeTargetExistsRule),
        Box::new(CatchCoverageRule),
        Box::new(CatchTerminationRule),
        Box::new(ForwardAcyclicRule),
        Box::new(TerminalReachableRule),
        Box::new(TerminalNoOutgoingRule),
        Box::new(BranchShapeRule),
        Box::new(EntryNoIncomingRule),
        Box::new(ForwardReachabilityRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(workflow));
    }
    diagnostics
}

/// Run all rules; return `Err` if any `Error`-severity diagnostic was found.
pub fn validate_or_raise(workflow: &Workflow) -> pipewright_types::Result<Vec<Diagnostic>> {
    let diagnostics = validate(workflow);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    if !errors.is_empty() {
        let messages: Vec<_> = errors.iter().map(|d| d.message.clone()).collect();
        return Err(pipewright_types::PipewrightError::ValidationError(
            messages.join("; "),
        ));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::WorkflowBuilder;
    use crate::condition::BranchCondition;
    use crate::graph::TaskNode;
    use crate::kind::TaskKind;
    use crate::policy::policy_for;

    fn task(kind: TaskKind, catch_target: Option<NodeId>) -> TaskNode {
        let policy = policy_for(kind);
        TaskNode {
            name: kind.task_name().to_string(),
            kind,
            timeout: policy.timeout,
            retry_rules: policy.retry_rules,
            completion_mode: policy.completion_mode,
            context: Vec::new(),
            next: None,
            catch_target,
        }
    }

    /// prepare -> branch(skip?) -> [cleanup | inference -> cleanup]
    fn valid_workflow() -> Workflow {
        let mut b = WorkflowBuilder::new();
        let clean_up = b.add_task(task(TaskKind::CleanUp, None));
        let inference = b.add_task(task(TaskKind::RunInference, Some(clean_up)));
        b.set_next(inference, clean_up);
        let skip = b.add_branch(
            "ShouldSkipInference?",
            BranchCondition::ShouldSkipInference,
            clean_up,
            inference,
        );
        let prepare = b.add_task(task(TaskKind::PrepareDataset, Some(clean_up)));
        b.set_next(prepare, skip);
        b.finish("test", prepare, clean_up)
    }

    fn errors(diags: &[Diagnostic]) -> Vec<&Diagnostic> {
        diags.iter().filter(|d| d.severity == Severity::Error).collect()
    }

    #[test]
    fn valid_workflow_passes() {
        let diags = validate(&valid_workflow());
        assert!(errors(&diags).is_empty(), "expected no errors: {diags:?}");
    }

    #[test]
    fn validate_or_raise_ok_for_valid_workflow() {
        assert!(validate_or_raise(&valid_workflow()).is_ok());
    }

    #[test]
    fn missing_catch_edge_is_error() {
        let mut b = WorkflowBuilder::new();
        let clean_up = b.add_task(task(TaskKind::CleanUp, None));
        let prepare = b.add_task(task(TaskKind::PrepareDataset, None)); // no catch
        b.set_next(prepare, clean_up);
        let wf = b.finish("test", prepare, clean_up);

        let diags = validate(&wf);
        assert!(diags
            .iter()
            .any(|d| d.rule == "catch_coverage" && d.severity == Severity::Error));
        assert!(validate_or_raise(&wf).is_err());
    }

    #[test]
    fn unreachable_task_not_flagged_for_catch() {
        // An orphan with no catch is a reachability error, not a catch error.
        let mut b = WorkflowBuilder::new();
        let clean_up = b.add_task(task(TaskKind::CleanUp, None));
        let prepare = b.add_task(task(TaskKind::PrepareDataset, Some(clean_up)));
        b.set_next(prepare, clean_up);
        let _orphan = b.add_task(task(TaskKind::RunInference, None));
        let wf = b.finish("test", prepare, clean_up);

        let diags = validate(&wf);
        assert!(!diags.iter().any(|d| d.rule == "catch_coverage"));
        assert!(diags
            .iter()
            .any(|d| d.rule == "reachability" && d.message.contains("RunInferenceTask")));
    }

    #[test]
    fn catch_chain_dead_end_is_error() {
        // prepare catches to inference, which has no catch and is not the terminal.
        let mut b = WorkflowBuilder::new();
        let clean_up = b.add_task(task(TaskKind::CleanUp, None));
        let inference = b.add_task(task(TaskKind::RunInference, None));
        b.set_next(inference, clean_up);
        let prepare = b.add_task(task(TaskKind::PrepareDataset, Some(inference)));
        b.set_next(prepare, inference);
        let wf = b.finish("test", prepare, clean_up);

        let diags = validate(&wf);
        assert!(diags
            .iter()
            .any(|d| d.rule == "catch_termination" && d.message.contains("dead-ends")));
    }

    #[test]
    fn catch_cycle_is_error() {
        // prepare and inference catch to each other; neither chain reaches
        // the terminal.
        let mut b = WorkflowBuilder::new();
        let clean_up = b.add_task(task(TaskKind::CleanUp, None));
        let mut prepare = task(TaskKind::PrepareDataset, Some(NodeId(2)));
        prepare.next = Some(clean_up);
        let prepare_id = b.add_task(prepare);
        let mut inference = task(TaskKind::RunInference, Some(prepare_id));
        inference.next = Some(clean_up);
        b.add_task(inference);
        let wf = b.finish("test", prepare_id, clean_up);

        let diags = validate(&wf);
        assert!(
            diags.iter().any(|d| d.rule == "catch_termination"),
            "expected catch_termination error: {diags:?}"
        );
    }

    #[test]
    fn forward_cycle_is_error() {
        let mut b = WorkflowBuilder::new();
        let clean_up = b.add_task(task(TaskKind::CleanUp, None));
        let a = b.add_task(task(TaskKind::PrepareDataset, Some(clean_up)));
        let c = b.add_task(task(TaskKind::RunInference, Some(clean_up)));
        b.set_next(a, c);
        b.set_next(c, a); // cycle a -> c -> a
        let wf = b.finish("test", a, clean_up);

        let diags = validate(&wf);
        assert!(diags
            .iter()
            .any(|d| d.rule == "forward_acyclic" && d.severity == Severity::Error));
    }

    #[test]
    fn terminal_with_outgoing_edge_is_error() {
        let mut b = WorkflowBuilder::new();
        let clean_up = b.add_task(task(TaskKind::CleanUp, None));
        let extra = b.add_task(task(TaskKind::PrepareDataset, Some(clean_up)));
        b.set_next(clean_up, extra);
        b.set_next(extra, clean_up);
        let wf = b.finish("test", extra, clean_up);

        let diags = validate(&wf);
        assert!(diags
            .iter()
            .any(|d| d.rule == "terminal_no_outgoing" && d.severity == Severity::Error));
    }

    #[test]
    fn terminal_unreachable_from_island_is_error() {
        let mut b = WorkflowBuilder::new();
        let clean_up = b.add_task(task(TaskKind::CleanUp, None));
        let entry = b.add_task(task(TaskKind::PrepareDataset, Some(clean_up)));
        b.set_next(entry, clean_up);
        // Island: forward self-loop and no catch; can never reach the terminal.
        let island = b.add_task(task(TaskKind::RunInference, None));
        b.set_next(island, island);
        let wf = b.finish("test", entry, clean_up);

        let diags = validate(&wf);
        assert!(diags
            .iter()
            .any(|d| d.rule == "terminal_reachable" && d.message.contains("RunInferenceTask")));
    }

    #[test]
    fn edge_to_missing_node_is_error() {
        let mut b = WorkflowBuilder::new();
        let clean_up = b.add_task(task(TaskKind::CleanUp, None));
        let mut prepare = task(TaskKind::PrepareDataset, Some(clean_up));
        prepare.next = Some(NodeId(99));
        let entry = b.add_task(prepare);
        let wf = b.finish("test", entry, clean_up);

        let diags = validate(&wf);
        assert!(diags
            .iter()
            .any(|d| d.rule == "edge_target_exists" && d.message.contains("99")));
    }

    #[test]
    fn entry_with_incoming_edge_is_error() {
        let mut b = WorkflowBuilder::new();
        let clean_up = b.add_task(task(TaskKind::CleanUp, None));
        let entry = b.add_task(task(TaskKind::PrepareDataset, Some(clean_up)));
        let second = b.add_task(task(TaskKind::RunInference, Some(clean_up)));
        b.set_next(entry, second);
        b.set_next(second, entry); // loops back into the entry
        let wf = b.finish("test", entry, clean_up);

        let diags = validate(&wf);
        assert!(diags.iter().any(|d| d.rule == "entry_no_incoming"));
    }

    #[test]
    fn identical_branch_arms_is_warning() {
        let mut b = WorkflowBuilder::new();
        let clean_up = b.add_task(task(TaskKind::CleanUp, None));
        let branch = b.add_branch(
            "ShouldSkipInference?",
            BranchCondition::ShouldSkipInference,
            clean_up,
            clean_up,
        );
        let wf = b.finish("test", branch, clean_up);

        let diags = validate(&wf);
        let warning = diags.iter().find(|d| d.rule == "branch_shape").unwrap();
        assert_eq!(warning.severity, Severity::Warning);
        // A warning alone does not fail validate_or_raise.
        assert!(validate_or_raise(&wf).is_ok());
    }
}

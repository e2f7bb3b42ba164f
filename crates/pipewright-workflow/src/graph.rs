//! The workflow graph model: task nodes, branch nodes, and the owned arena.
//!
//! Nodes live in a `Vec` and reference each other by [`NodeId`], so the
//! assembler can build leaf-first (terminal before its predecessors) and wire
//! edges without forward references. A built [`Workflow`] is immutable.

use std::time::Duration;

use pipewright_types::PipelineInput;

use crate::condition::BranchCondition;
use crate::kind::TaskKind;
use crate::policy::{CompletionMode, RetryRule};

/// Index of a node within its workflow's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// How one context field's value is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextValue {
    /// Fixed at build time.
    Literal(String),
    /// Resolved by the engine against the instance input, e.g. `$.taskInput`.
    InputPath(String),
    /// The engine-issued callback token, available only to
    /// `WaitForCallbackToken` nodes.
    CallbackToken,
    /// The upstream failure's message/class. Only the terminal node, which
    /// has no catch target of its own, receives this.
    ErrorDetail,
}

/// One named entry in the environment record handed to the compute backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextField {
    pub name: String,
    pub value: ContextValue,
}

impl ContextField {
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: ContextValue::Literal(value.into()),
        }
    }

    pub fn input_path(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: ContextValue::InputPath(path.into()),
        }
    }
}

/// One executable unit of work.
///
/// `catch_target` is decided at graph-build time and immutable afterwards;
/// every non-terminal node has one, which validation enforces.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub name: String,
    pub kind: TaskKind,
    pub timeout: Duration,
    pub retry_rules: Vec<RetryRule>,
    pub completion_mode: CompletionMode,
    pub context: Vec<ContextField>,
    pub next: Option<NodeId>,
    pub catch_target: Option<NodeId>,
}

/// Pure routing: two outgoing arms, no catch edge, no executable work.
#[derive(Debug, Clone)]
pub struct BranchNode {
    pub name: String,
    pub condition: BranchCondition,
    pub on_true: NodeId,
    pub on_false: NodeId,
}

#[derive(Debug, Clone)]
pub enum Node {
    Task(TaskNode),
    Branch(BranchNode),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Task(t) => &t.name,
            Node::Branch(b) => &b.name,
        }
    }

    pub fn as_task(&self) -> Option<&TaskNode> {
        match self {
            Node::Task(t) => Some(t),
            Node::Branch(_) => None,
        }
    }

    pub fn as_branch(&self) -> Option<&BranchNode> {
        match self {
            Node::Branch(b) => Some(b),
            Node::Task(_) => None,
        }
    }

    /// Forward (success) successors. Catch edges are not included.
    pub fn successors(&self) -> Vec<NodeId> {
        match self {
            Node::Task(t) => t.next.into_iter().collect(),
            Node::Branch(b) => vec![b.on_true, b.on_false],
        }
    }
}

/// An assembled pipeline graph: single entry, shared terminal cleanup sink.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,
    entry: NodeId,
    nodes: Vec<Node>,
    terminal: NodeId,
}

impl Workflow {
    pub(crate) fn new(name: String, entry: NodeId, nodes: Vec<Node>, terminal: NodeId) -> Self {
        Self {
            name,
            entry,
            nodes,
            terminal,
        }
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn terminal(&self) -> NodeId {
        self.terminal
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn task(&self, id: NodeId) -> Option<&TaskNode> {
        self.node(id).and_then(Node::as_task)
    }

    /// Find the task node for a kind. Each kind appears at most once per
    /// workflow.
    pub fn find_task(&self, kind: TaskKind) -> Option<NodeId> {
        self.all_nodes()
            .find(|(_, n)| n.as_task().is_some_and(|t| t.kind == kind))
            .map(|(id, _)| id)
    }

    /// Forward successors of a node; empty for unknown ids.
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).map(Node::successors).unwrap_or_default()
    }

    /// The success path the engine would take for `input`: from the entry,
    /// following branch arms per the condition's evaluation, until a node with
    /// no forward edge. Returns every visited node, branches included.
    ///
    /// Bounded by twice the node count so a malformed (unvalidated) graph
    /// cannot loop forever.
    pub fn trace(&self, input: &PipelineInput) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = Some(self.entry);
        let mut steps = 0;
        while let Some(id) = current {
            if steps > self.nodes.len() * 2 {
                break;
            }
            steps += 1;
            path.push(id);
            current = match self.node(id) {
                Some(Node::Task(t)) => t.next,
                Some(Node::Branch(b)) => {
                    if b.condition.evaluate(input) {
                        Some(b.on_true)
                    } else {
                        Some(b.on_false)
                    }
                }
                None => None,
            };
        }
        path
    }

    /// Task kinds along the success path for `input`, branch nodes elided.
    pub fn trace_kinds(&self, input: &PipelineInput) -> Vec<TaskKind> {
        self.trace(input)
            .into_iter()
            .filter_map(|id| self.task(id).map(|t| t.kind))
            .collect()
    }
}

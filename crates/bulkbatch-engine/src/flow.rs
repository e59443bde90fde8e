//! Execution graph: steps as nodes, exit-status patterns as edges.
//!
//! Edges are registered in declaration order: a step's transitions, then
//! its `next` as a `*` edge. Every step without a `*` edge of its own then
//! gets `step --*--> END`, so an uncaught exit status ends the flow instead
//! of stalling it.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use regex::Regex;
use tracing::{info, warn};

use crate::config::descriptor::JobDescriptor;
use crate::error::{AssemblyError, AssemblyResult};
use crate::step::ExecutableStep;

/// Exit-status pattern: `*` matches any run of characters, `?` exactly one.
#[derive(Debug, Clone)]
pub struct ExitPattern {
    raw: String,
    regex: Regex,
}

impl ExitPattern {
    pub const WILDCARD: &'static str = "*";

    pub fn new(raw: &str) -> AssemblyResult<Self> {
        let raw = raw.trim();
        let mut expr = String::with_capacity(raw.len() + 2);
        expr.push('^');
        for c in raw.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');
        let regex = Regex::new(&expr)
            .map_err(|e| AssemblyError::config("onCondition", format!("invalid pattern '{raw}': {e}")))?;
        Ok(Self {
            raw: raw.to_string(),
            regex,
        })
    }

    pub fn wildcard() -> AssemblyResult<Self> {
        Self::new(Self::WILDCARD)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `*`, `**` and so on: matches every exit status.
    pub fn is_wildcard(&self) -> bool {
        !self.raw.is_empty() && self.raw.chars().all(|c| c == '*')
    }

    pub fn matches(&self, exit_status: &str) -> bool {
        self.regex.is_match(exit_status)
    }

    /// Sort key; lower is more specific.
    fn specificity(&self) -> (usize, usize, Reverse<usize>) {
        if self.is_wildcard() {
            return (1, 0, Reverse(1));
        }
        let stars = self.raw.matches('*').count();
        let singles = self.raw.matches('?').count();
        (stars, singles, Reverse(self.raw.len()))
    }
}

impl PartialEq for ExitPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for ExitPattern {}

impl fmt::Display for ExitPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FlowTarget {
    Step(String),
    End,
}

impl fmt::Display for FlowTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowTarget::Step(name) => f.write_str(name),
            FlowTarget::End => f.write_str("END"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEdge {
    pub from: String,
    pub pattern: ExitPattern,
    pub target: FlowTarget,
    /// The flow ends once `target` has run.
    pub ends_flow: bool,
}

impl fmt::Display for FlowEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --{}--> {}", self.from, self.pattern, self.target)?;
        if self.ends_flow {
            write!(f, " (end)")?;
        }
        Ok(())
    }
}

/// Immutable step graph of one job.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    pub name: String,
    pub start: String,
    steps: Vec<ExecutableStep>,
    edges: Vec<FlowEdge>,
}

impl ExecutionGraph {
    /// Steps in declaration order.
    pub fn steps(&self) -> &[ExecutableStep] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&ExecutableStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Edges in registration order.
    pub fn edges(&self) -> &[FlowEdge] {
        &self.edges
    }

    /// Edge taken when `step` finishes with `exit_status`: the most specific
    /// matching pattern, earliest registered on ties.
    pub fn next(&self, step: &str, exit_status: &str) -> Option<&FlowEdge> {
        self.edges
            .iter()
            .filter(|e| e.from == step && e.pattern.matches(exit_status))
            .min_by_key(|e| e.pattern.specificity())
    }

    /// Edge set as `(from, pattern, target)` triples, for comparisons.
    pub fn edge_set(&self) -> BTreeSet<(String, String, FlowTarget)> {
        self.edges
            .iter()
            .map(|e| (e.from.clone(), e.pattern.as_str().to_string(), e.target.clone()))
            .collect()
    }

    pub fn cursor(&self) -> FlowCursor<'_> {
        FlowCursor {
            graph: self,
            current: Some(self.start.clone()),
            end_after_current: false,
        }
    }
}

/// Build the execution graph of `job` over its assembled `steps`.
pub fn build_flow(job: &JobDescriptor, steps: Vec<ExecutableStep>) -> AssemblyResult<ExecutionGraph> {
    let start = steps
        .first()
        .map(|s| s.name.clone())
        .ok_or_else(|| AssemblyError::config("steps", "job must contain at least one step"))?;
    let known: HashSet<&str> = steps.iter().map(|s| s.name.as_str()).collect();

    let mut edges = Vec::new();
    for step in &job.steps {
        for transition in &step.transitions {
            let from = transition.source(&step.name).trim();
            let to = transition.to_step.trim();
            if !known.contains(from) || !known.contains(to) {
                return Err(AssemblyError::UnresolvedTransitionReference {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
            let edge = FlowEdge {
                from: from.to_string(),
                pattern: ExitPattern::new(&transition.on_condition)?,
                target: FlowTarget::Step(to.to_string()),
                ends_flow: transition.is_ended,
            };
            info!(job = %job.name, edge = %edge, "Adding conditional transition");
            edges.push(edge);
        }

        if let Some(next) = step.next_step() {
            if !known.contains(next) {
                return Err(AssemblyError::UnresolvedTransitionReference {
                    from: step.name.clone(),
                    to: next.to_string(),
                });
            }
            let edge = FlowEdge {
                from: step.name.clone(),
                pattern: ExitPattern::wildcard()?,
                target: FlowTarget::Step(next.to_string()),
                ends_flow: false,
            };
            info!(job = %job.name, edge = %edge, "Adding linear transition");
            edges.push(edge);
        }
    }

    for step in &steps {
        let has_wildcard = edges
            .iter()
            .any(|e| e.from == step.name && e.pattern.is_wildcard());
        if !has_wildcard {
            edges.push(FlowEdge {
                from: step.name.clone(),
                pattern: ExitPattern::wildcard()?,
                target: FlowTarget::End,
                ends_flow: true,
            });
        }
    }

    reject_static_loops(&edges)?;
    warn_on_shadowed_edges(&job.name, &edges);

    Ok(ExecutionGraph {
        name: job.name.clone(),
        start,
        steps,
        edges,
    })
}

/// A self edge `X --p--> X` loops forever when `p` is `*`, or when `X` is
/// entered from another step under the same `p`.
fn reject_static_loops(edges: &[FlowEdge]) -> AssemblyResult<()> {
    for edge in edges {
        let FlowTarget::Step(target) = &edge.target else {
            continue;
        };
        if *target != edge.from {
            continue;
        }
        let entered_same_way = edges.iter().any(|other| {
            other.from != edge.from
                && other.target == edge.target
                && other.pattern == edge.pattern
        });
        if edge.pattern.is_wildcard() || entered_same_way {
            return Err(AssemblyError::StaticLoop {
                step: edge.from.clone(),
                pattern: edge.pattern.to_string(),
            });
        }
    }
    Ok(())
}

/// Only the first of two edges with the same source and pattern is ever taken.
fn warn_on_shadowed_edges(job: &str, edges: &[FlowEdge]) {
    let mut seen = HashSet::new();
    for edge in edges {
        if !seen.insert((edge.from.as_str(), edge.pattern.as_str())) {
            warn!(job = %job, edge = %edge, "Transition is shadowed by an earlier one with the same pattern");
        }
    }
}

/// Outcome of advancing a [`FlowCursor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowDecision {
    /// Run this step next.
    Continue(String),
    /// The flow is over; carries the last step's exit status.
    End { exit_status: String },
    /// No edge of `step` matches `exit_status`.
    NoRoute { step: String, exit_status: String },
}

/// Walks an [`ExecutionGraph`] one finished step at a time.
#[derive(Debug, Clone)]
pub struct FlowCursor<'g> {
    graph: &'g ExecutionGraph,
    current: Option<String>,
    end_after_current: bool,
}

impl FlowCursor<'_> {
    /// Step to run now; `None` once the flow is over.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Record that the current step finished with `exit_status`.
    pub fn advance(&mut self, exit_status: &str) -> FlowDecision {
        let Some(step) = self.current.take() else {
            return FlowDecision::End {
                exit_status: exit_status.to_string(),
            };
        };
        if self.end_after_current {
            return FlowDecision::End {
                exit_status: exit_status.to_string(),
            };
        }

        let graph = self.graph;
        match graph.next(&step, exit_status) {
            None => FlowDecision::NoRoute {
                step,
                exit_status: exit_status.to_string(),
            },
            Some(FlowEdge {
                target: FlowTarget::End,
                ..
            }) => FlowDecision::End {
                exit_status: exit_status.to_string(),
            },
            Some(FlowEdge {
                target: FlowTarget::Step(next),
                ends_flow,
                ..
            }) => {
                self.current = Some(next.clone());
                self.end_after_current = *ends_flow;
                FlowDecision::Continue(next.clone())
            }
        }
    }
}

#![allow(clippy::result_large_err)] // Graph operations return AppError to keep node ids and codes in failures.

//! The strategy graph: dataset states connected by transformations.
//!
//! Each child has at most one incoming edge, which records how its dataset is
//! derived. Editing an edge or re-deriving a node invalidates everything
//! downstream; `run` re-derives dirty nodes in topological order.

use crate::core::config::RunConfig;
use crate::core::error::AppError;
use crate::core::strategy::cancel::CancelToken;
use crate::core::strategy::edge::run_transition;
use crate::core::strategy::engine::RegistrationEngine;
use crate::core::strategy::node::StrategyNode;
use crate::core::strategy::status::StatusReporter;
use crate::core::strategy::transformation::Transformation;
use crate::core::types::ErrorCategory;
use indexmap::IndexMap;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::{Bfs, EdgeRef};
use petgraph::Direction;
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub(crate) struct GraphNode {
    pub(crate) id: String,
    pub(crate) node: StrategyNode,
}

/// What `run` does after an edge fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPolicy {
    /// Stop at the first failure.
    #[default]
    StopOnFailure,
    /// Skip descendants of the failed node and keep going with the rest.
    ContinueIndependent,
}

impl From<&RunConfig> for RunPolicy {
    fn from(config: &RunConfig) -> Self {
        if config.continue_independent {
            RunPolicy::ContinueIndependent
        } else {
            RunPolicy::StopOnFailure
        }
    }
}

#[derive(Debug)]
pub struct NodeFailure {
    pub node: String,
    pub error: AppError,
}

/// Outcome of `StrategyGraph::run`.
#[derive(Debug, Default)]
pub struct RunReport {
    pub executed: Vec<String>,
    pub failures: Vec<NodeFailure>,
    /// Dirty nodes not attempted because an ancestor failed.
    pub skipped: Vec<String>,
    /// Dirty nodes not reached because the run stopped early.
    pub not_run: Vec<String>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    pub fn first_failure(&self) -> Option<&NodeFailure> {
        self.failures.first()
    }
}

/// Borrowed view of one edge.
#[derive(Debug, Clone, Copy)]
pub struct EdgeView<'a> {
    pub parent: &'a str,
    pub child: &'a str,
    pub transformation: &'a Transformation,
}

#[derive(Debug, Clone, Default)]
pub struct StrategyGraph {
    graph: StableDiGraph<GraphNode, Transformation>,
    ids: IndexMap<String, NodeIndex>,
}

impl StrategyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn add_node<T: Into<String>>(&mut self, id: T, node: StrategyNode) -> Result<(), AppError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AppError::new(ErrorCategory::ValidationError, "node id cannot be empty")
                .with_code("RS-GRAPH-001"));
        }
        if self.ids.contains_key(&id) {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!("duplicate node id '{}'", id),
            )
            .with_code("RS-GRAPH-001"));
        }
        let index = self.graph.add_node(GraphNode {
            id: id.clone(),
            node,
        });
        self.ids.insert(id, index);
        Ok(())
    }

    /// Remove a node and its edges. Former children become dirty roots.
    pub fn remove_node(&mut self, id: &str) -> Result<StrategyNode, AppError> {
        let index = self.index(id)?;
        let children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        for child in children {
            self.invalidate_from(child);
        }
        self.ids.shift_remove(id);
        self.graph
            .remove_node(index)
            .map(|entry| entry.node)
            .ok_or_else(|| unknown_node(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Result<&StrategyNode, AppError> {
        let index = self.index(id)?;
        Ok(&self.graph[index].node)
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.ids.keys().map(String::as_str)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &StrategyNode)> {
        self.ids
            .iter()
            .map(move |(id, index)| (id.as_str(), &self.graph[*index].node))
    }

    pub fn edges(&self) -> Vec<EdgeView<'_>> {
        self.ids
            .values()
            .filter_map(|&index| self.incoming_edge(index))
            .map(|edge| {
                let (source, target) = self
                    .graph
                    .edge_endpoints(edge)
                    .expect("edge index from live graph");
                EdgeView {
                    parent: &self.graph[source].id,
                    child: &self.graph[target].id,
                    transformation: &self.graph[edge],
                }
            })
            .collect()
    }

    /// Connect `parent -> child` and invalidate the child's subtree.
    pub fn connect(
        &mut self,
        parent: &str,
        child: &str,
        transformation: Transformation,
    ) -> Result<(), AppError> {
        let parent_index = self.index(parent)?;
        let child_index = self.index(child)?;
        if self.incoming_edge(child_index).is_some() {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!("node '{}' already has an incoming transformation", child),
            )
            .with_code("RS-GRAPH-002"));
        }
        if parent_index == child_index
            || has_path_connecting(&self.graph, child_index, parent_index, None)
        {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!("connecting '{}' -> '{}' would create a cycle", parent, child),
            )
            .with_code("RS-GRAPH-003"));
        }
        self.graph.add_edge(parent_index, child_index, transformation);
        self.invalidate_from(child_index);
        Ok(())
    }

    /// Detach `child` from its parent, returning the transformation.
    pub fn disconnect(&mut self, child: &str) -> Result<Transformation, AppError> {
        let child_index = self.index(child)?;
        let edge = self
            .incoming_edge(child_index)
            .ok_or_else(|| no_incoming_edge(child))?;
        let transformation = self
            .graph
            .remove_edge(edge)
            .ok_or_else(|| no_incoming_edge(child))?;
        self.invalidate_from(child_index);
        Ok(transformation)
    }

    /// Parent id and transformation deriving `child`, if any.
    pub fn incoming(&self, child: &str) -> Result<Option<(&str, &Transformation)>, AppError> {
        let child_index = self.index(child)?;
        Ok(self.incoming_edge(child_index).map(|edge| {
            let (source, _) = self
                .graph
                .edge_endpoints(edge)
                .expect("edge index from live graph");
            (self.graph[source].id.as_str(), &self.graph[edge])
        }))
    }

    pub fn children(&self, id: &str) -> Result<Vec<&str>, AppError> {
        let index = self.index(id)?;
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        children.sort();
        Ok(children
            .into_iter()
            .map(|child| self.graph[child].id.as_str())
            .collect())
    }

    pub fn transformation(&self, child: &str) -> Result<&Transformation, AppError> {
        self.incoming(child)?
            .map(|(_, transformation)| transformation)
            .ok_or_else(|| no_incoming_edge(child))
    }

    /// Replace the transformation deriving `child`; returns the ids marked dirty.
    pub fn set_transformation(
        &mut self,
        child: &str,
        transformation: Transformation,
    ) -> Result<Vec<String>, AppError> {
        let child_index = self.index(child)?;
        let edge = self
            .incoming_edge(child_index)
            .ok_or_else(|| no_incoming_edge(child))?;
        self.graph[edge] = transformation;
        Ok(self.invalidate_from(child_index))
    }

    /// Edit one parameter of the transformation deriving `child`.
    pub fn set_parameter(
        &mut self,
        child: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<String>, AppError> {
        let child_index = self.index(child)?;
        let edge = self
            .incoming_edge(child_index)
            .ok_or_else(|| no_incoming_edge(child))?;
        self.graph[edge].set_parameter(key, value)?;
        Ok(self.invalidate_from(child_index))
    }

    /// Assign a dataset directly, as for source data.
    ///
    /// The node is clean only when the file exists. Descendants become dirty.
    pub fn set_dataset<P: Into<PathBuf>>(
        &mut self,
        id: &str,
        dataset: P,
    ) -> Result<Vec<String>, AppError> {
        let index = self.index(id)?;
        let dataset = dataset.into();
        let exists = dataset.is_file();
        let node = &mut self.graph[index].node;
        node.dataset = Some(dataset);
        node.dirty = !exists;
        Ok(self.invalidate_descendants(index))
    }

    pub fn set_fixed_data<P: Into<PathBuf>>(
        &mut self,
        id: &str,
        fixed_data: P,
    ) -> Result<Vec<String>, AppError> {
        let index = self.index(id)?;
        self.graph[index].node.fixed_data = Some(fixed_data.into());
        Ok(self.invalidate_descendants(index))
    }

    /// Move a node's output folder. A derived node must be produced again.
    pub fn set_output_folder<P: Into<PathBuf>>(
        &mut self,
        id: &str,
        output_folder: P,
    ) -> Result<Vec<String>, AppError> {
        let index = self.index(id)?;
        self.graph[index].node.output_folder = Some(output_folder.into());
        if self.incoming_edge(index).is_some() {
            Ok(self.invalidate_from(index))
        } else {
            Ok(Vec::new())
        }
    }

    /// Mark `id` and every node reachable from it dirty.
    ///
    /// Returns the ids visited, `id` first, in breadth-first order.
    pub fn mark_dirty(&mut self, id: &str) -> Result<Vec<String>, AppError> {
        let index = self.index(id)?;
        Ok(self.invalidate_from(index))
    }

    /// Node ids with every parent before its children.
    pub fn topological_order(&self) -> Result<Vec<String>, AppError> {
        Ok(self
            .topological_indices()?
            .into_iter()
            .map(|index| self.graph[index].id.clone())
            .collect())
    }

    /// Execute the edge deriving `child`, then invalidate its descendants.
    pub async fn execute_edge(
        &mut self,
        child: &str,
        engine: &RegistrationEngine,
        reporter: &dyn StatusReporter,
        cancel: &CancelToken,
    ) -> Result<PathBuf, AppError> {
        let child_index = self.index(child)?;
        let edge = self
            .incoming_edge(child_index)
            .ok_or_else(|| no_incoming_edge(child))?;
        self.execute_incoming(child_index, edge, engine, reporter, cancel)
            .await
    }

    /// Re-derive every dirty node in topological order.
    ///
    /// Roots are never executed. A node whose ancestor failed or was skipped is
    /// skipped as well; with `RunPolicy::StopOnFailure` nothing runs after the
    /// first failure. Cancellation always stops the walk.
    pub async fn run(
        &mut self,
        engine: &RegistrationEngine,
        reporter: &dyn StatusReporter,
        cancel: &CancelToken,
        policy: RunPolicy,
    ) -> Result<RunReport, AppError> {
        let order = self.topological_indices()?;
        let mut report = RunReport::default();
        let mut blocked: HashSet<NodeIndex> = HashSet::new();
        let mut stopped = false;

        for index in order {
            let Some(edge) = self.incoming_edge(index) else {
                continue;
            };
            if !self.graph[index].node.dirty {
                continue;
            }
            let id = self.graph[index].id.clone();
            if stopped {
                report.not_run.push(id);
                continue;
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                stopped = true;
                report.not_run.push(id);
                continue;
            }
            let parent = self
                .graph
                .edge_endpoints(edge)
                .map(|(source, _)| source)
                .expect("edge index from live graph");
            if blocked.contains(&parent) {
                tracing::debug!(node = %id, "skipping node below a failed ancestor");
                blocked.insert(index);
                report.skipped.push(id);
                continue;
            }

            match self
                .execute_incoming(index, edge, engine, reporter, cancel)
                .await
            {
                Ok(_) => report.executed.push(id),
                Err(error) => {
                    let cancelled = error.category == ErrorCategory::Cancelled;
                    blocked.insert(index);
                    report.failures.push(NodeFailure { node: id, error });
                    if cancelled {
                        report.cancelled = true;
                        stopped = true;
                    } else if policy == RunPolicy::StopOnFailure {
                        stopped = true;
                    }
                }
            }
        }

        tracing::info!(
            executed = report.executed.len(),
            failed = report.failures.len(),
            skipped = report.skipped.len(),
            not_run = report.not_run.len(),
            cancelled = report.cancelled,
            "strategy run finished"
        );
        Ok(report)
    }

    async fn execute_incoming(
        &mut self,
        child_index: NodeIndex,
        edge: EdgeIndex,
        engine: &RegistrationEngine,
        reporter: &dyn StatusReporter,
        cancel: &CancelToken,
    ) -> Result<PathBuf, AppError> {
        let (parent_index, _) = self
            .graph
            .edge_endpoints(edge)
            .expect("edge index from live graph");
        let parent = self.graph[parent_index].node.clone();
        let parent_id = self.graph[parent_index].id.clone();
        let transformation = self.graph[edge].clone();
        let child_id = self.graph[child_index].id.clone();

        reporter.edge_started(&parent_id, &child_id);
        let result = run_transition(
            &parent,
            &mut self.graph[child_index].node,
            &transformation,
            engine,
            cancel,
        )
        .await;

        match result {
            Ok(dataset) => {
                reporter.edge_finished(&child_id, &dataset);
                for id in self.invalidate_descendants(child_index) {
                    reporter.node_invalidated(&id);
                }
                Ok(dataset)
            }
            Err(mut err) => {
                err.add_context("node", &child_id);
                reporter.edge_failed(&child_id, &err);
                Err(err)
            }
        }
    }

    /// Direct access without invalidation, for restoring persisted state.
    pub(crate) fn node_mut_unpropagated(&mut self, id: &str) -> Result<&mut StrategyNode, AppError> {
        let index = self.index(id)?;
        Ok(&mut self.graph[index].node)
    }

    fn index(&self, id: &str) -> Result<NodeIndex, AppError> {
        self.ids.get(id).copied().ok_or_else(|| unknown_node(id))
    }

    fn incoming_edge(&self, index: NodeIndex) -> Option<EdgeIndex> {
        self.graph
            .edges_directed(index, Direction::Incoming)
            .next()
            .map(|edge| edge.id())
    }

    fn topological_indices(&self) -> Result<Vec<NodeIndex>, AppError> {
        toposort(&self.graph, None).map_err(|cycle| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!(
                    "strategy graph contains a cycle through '{}'",
                    self.graph[cycle.node_id()].id
                ),
            )
            .with_code("RS-GRAPH-003")
        })
    }

    /// Mark `start` and everything reachable from it dirty, each node once.
    fn invalidate_from(&mut self, start: NodeIndex) -> Vec<String> {
        let mut marked = Vec::new();
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(index) = bfs.next(&self.graph) {
            let entry = &mut self.graph[index];
            entry.node.mark_dirty();
            marked.push(entry.id.clone());
        }
        marked
    }

    fn invalidate_descendants(&mut self, index: NodeIndex) -> Vec<String> {
        let children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        let mut marked = Vec::new();
        let mut seen = HashSet::new();
        for child in children {
            let mut bfs = Bfs::new(&self.graph, child);
            while let Some(next) = bfs.next(&self.graph) {
                if seen.insert(next) {
                    let entry = &mut self.graph[next];
                    entry.node.mark_dirty();
                    marked.push(entry.id.clone());
                }
            }
        }
        marked
    }
}

fn unknown_node(id: &str) -> AppError {
    AppError::new(
        ErrorCategory::KeyNotFound,
        format!("unknown node '{}'", id),
    )
    .with_code("RS-KEY-002")
    .with_context("node", id)
}

fn no_incoming_edge(id: &str) -> AppError {
    AppError::new(
        ErrorCategory::InvalidEdgeState,
        format!("node '{}' has no incoming transformation", id),
    )
    .with_code("RS-EDGE-002")
}

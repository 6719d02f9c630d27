#![allow(clippy::result_large_err)] // Edge execution surfaces AppError directly so callers see engine diagnostics.

use crate::core::error::AppError;
use crate::core::strategy::cancel::CancelToken;
use crate::core::strategy::engine::{RegistrationEngine, RegistrationRequest};
use crate::core::strategy::node::StrategyNode;
use crate::core::strategy::status::StatusReporter;
use crate::core::strategy::transformation::Transformation;
use crate::core::types::ErrorCategory;
use std::path::PathBuf;

/// Parent -> child transition produced by applying a transformation.
#[derive(Debug, Clone, Default)]
pub struct StrategyEdge {
    pub parent_node: Option<StrategyNode>,
    pub child_node: Option<StrategyNode>,
    pub transformation: Option<Transformation>,
}

impl StrategyEdge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connecting(
        parent_node: StrategyNode,
        child_node: StrategyNode,
        transformation: Transformation,
    ) -> Self {
        Self {
            parent_node: Some(parent_node),
            child_node: Some(child_node),
            transformation: Some(transformation),
        }
    }

    /// Run the registration engine for this edge.
    ///
    /// On success the child holds the engine's result and is clean. On any
    /// failure the child is left exactly as it was.
    pub async fn execute(
        &mut self,
        engine: &RegistrationEngine,
        reporter: &dyn StatusReporter,
        cancel: &CancelToken,
    ) -> Result<PathBuf, AppError> {
        let parent = self
            .parent_node
            .as_ref()
            .ok_or_else(|| invalid_edge("edge has no parent node"))?;
        let transformation = self
            .transformation
            .as_ref()
            .ok_or_else(|| invalid_edge("edge has no transformation"))?;
        let child = self
            .child_node
            .as_mut()
            .ok_or_else(|| invalid_edge("edge has no child node"))?;

        let parent_label = parent
            .dataset
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        let child_label = child
            .output_folder
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_default();

        reporter.edge_started(&parent_label, &child_label);
        match run_transition(parent, child, transformation, engine, cancel).await {
            Ok(dataset) => {
                reporter.edge_finished(&child_label, &dataset);
                Ok(dataset)
            }
            Err(err) => {
                reporter.edge_failed(&child_label, &err);
                Err(err)
            }
        }
    }
}

/// Execute one transition and materialize `child` on success.
///
/// Shared by standalone edges and the strategy graph.
pub(crate) async fn run_transition(
    parent: &StrategyNode,
    child: &mut StrategyNode,
    transformation: &Transformation,
    engine: &RegistrationEngine,
    cancel: &CancelToken,
) -> Result<PathBuf, AppError> {
    let moving = parent
        .dataset
        .as_deref()
        .ok_or_else(|| invalid_edge("parent node has no dataset"))?;
    if !moving.is_file() {
        return Err(invalid_edge(format!(
            "parent dataset {} does not exist",
            moving.display()
        ))
        .with_context("dataset", moving.display().to_string()));
    }
    let fixed = parent.fixed_reference().unwrap_or(moving);
    if !fixed.is_file() {
        return Err(invalid_edge(format!(
            "parent fixed data {} does not exist",
            fixed.display()
        ))
        .with_context("fixed_data", fixed.display().to_string()));
    }
    let output_folder = child
        .output_folder
        .as_deref()
        .ok_or_else(|| invalid_edge("child node has no output folder"))?;
    if cancel.is_cancelled() {
        return Err(AppError::new(ErrorCategory::Cancelled, "execution cancelled")
            .with_code("RS-ENGINE-005"));
    }

    let dataset = engine
        .register(
            RegistrationRequest {
                fixed,
                moving,
                transformation,
                output_folder,
            },
            cancel,
        )
        .await?;

    child.materialize(dataset.clone());
    Ok(dataset)
}

fn invalid_edge<T: Into<String>>(message: T) -> AppError {
    AppError::new(ErrorCategory::InvalidEdgeState, message).with_code("RS-EDGE-001")
}

#![allow(clippy::result_large_err)] // Strategy document APIs return AppError to preserve file and node context.

//! YAML persistence for strategy graphs.
//!
//! Relative paths resolve against the document's directory. A derived node is
//! restored as clean only when its dataset exists, its parent is clean, and
//! the transformation still hashes to the fingerprint recorded by the run that
//! produced it.

use crate::core::error::AppError;
use crate::core::strategy::graph::StrategyGraph;
use crate::core::strategy::node::StrategyNode;
use crate::core::strategy::transformation::Transformation;
use crate::core::types::{ErrorCategory, TransformationKind};
use crate::utils::atomic_write;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const SUPPORTED_VERSION: &str = "1.0";

fn default_version() -> String {
    SUPPORTED_VERSION.to_string()
}

/// Root of a strategy file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StrategyDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<StrategyMetadata>,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StrategyMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NodeSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_data: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_folder: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EdgeSpec {
    pub parent: String,
    pub child: String,
    /// Parameter file for the engine
    pub transformation: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TransformationKind>,
    /// SHA-256 of the parameters that produced the child's dataset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl StrategyDocument {
    pub fn from_yaml(content: &str) -> Result<Self, AppError> {
        let document: StrategyDocument = serde_yaml::from_str(content).map_err(|err| {
            AppError::new(
                ErrorCategory::ParseError,
                format!("invalid strategy document: {}", err),
            )
            .with_code("RS-DOC-002")
        })?;
        document.validate()?;
        Ok(document)
    }

    pub fn to_yaml(&self) -> Result<String, AppError> {
        serde_yaml::to_string(self).map_err(|err| {
            AppError::new(
                ErrorCategory::InternalError,
                format!("failed to serialize strategy document: {}", err),
            )
            .with_code("RS-DOC-003")
        })
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.version != SUPPORTED_VERSION {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!(
                    "unsupported strategy version '{}'; expected '{}'",
                    self.version, SUPPORTED_VERSION
                ),
            )
            .with_code("RS-DOC-004"));
        }
        if self.nodes.is_empty() {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "strategy document declares no nodes",
            )
            .with_code("RS-DOC-004"));
        }
        for edge in &self.edges {
            if edge.transformation.as_os_str().is_empty() {
                return Err(AppError::new(
                    ErrorCategory::ValidationError,
                    format!(
                        "edge {} -> {} has an empty transformation path",
                        edge.parent, edge.child
                    ),
                )
                .with_code("RS-DOC-004"));
            }
        }
        Ok(())
    }
}

/// A strategy document together with the graph built from it.
#[derive(Debug, Clone)]
pub struct LoadedStrategy {
    path: PathBuf,
    base_dir: PathBuf,
    document: StrategyDocument,
    pub graph: StrategyGraph,
}

impl LoadedStrategy {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = fs::read_to_string(path).map_err(|err| {
            AppError::new(
                ErrorCategory::ParseError,
                format!("cannot read strategy file {}: {}", path.display(), err),
            )
            .with_code("RS-DOC-001")
        })?;
        let document = StrategyDocument::from_yaml(&content)?;
        let base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::from_document(path.to_path_buf(), base_dir, document)
    }

    pub fn from_document(
        path: PathBuf,
        base_dir: PathBuf,
        document: StrategyDocument,
    ) -> Result<Self, AppError> {
        let mut graph = StrategyGraph::new();
        for spec in &document.nodes {
            let node = StrategyNode {
                dataset: spec.dataset.as_deref().map(|p| resolve(&base_dir, p)),
                fixed_data: spec.fixed_data.as_deref().map(|p| resolve(&base_dir, p)),
                output_folder: spec.output_folder.as_deref().map(|p| resolve(&base_dir, p)),
                dirty: true,
            };
            graph.add_node(spec.id.clone(), node)?;
        }

        let mut fingerprints_match: HashMap<&str, bool> = HashMap::new();
        for spec in &document.edges {
            let mut transformation =
                Transformation::from_file(&resolve(&base_dir, &spec.transformation)).map_err(
                    |mut err| {
                        err.add_context("edge", &format!("{} -> {}", spec.parent, spec.child));
                        err
                    },
                )?;
            if let Some(kind) = spec.kind {
                transformation.set_kind(kind);
            }
            let matches = spec
                .fingerprint
                .as_deref()
                .is_some_and(|recorded| recorded == transformation.fingerprint());
            fingerprints_match.insert(spec.child.as_str(), matches);
            graph.connect(&spec.parent, &spec.child, transformation)?;
        }

        for id in graph.topological_order()? {
            let clean = {
                let node = graph.node(&id)?;
                let parent_clean = match graph.incoming(&id)? {
                    None => true,
                    Some((parent, _)) => {
                        !graph.node(parent)?.dirty
                            && fingerprints_match.get(id.as_str()).copied().unwrap_or(false)
                    }
                };
                parent_clean && node.has_existing_dataset()
            };
            graph.node_mut_unpropagated(&id)?.dirty = !clean;
        }

        tracing::debug!(
            path = %path.display(),
            nodes = graph.len(),
            edges = document.edges.len(),
            "loaded strategy document"
        );

        Ok(Self {
            path,
            base_dir,
            document,
            graph,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn metadata(&self) -> Option<&StrategyMetadata> {
        self.document.metadata.as_ref()
    }

    /// Document reflecting the graph's current datasets and fingerprints.
    ///
    /// Node and edge order follow the original file; nodes and edges added
    /// since load are appended in insertion order.
    pub fn snapshot(&self) -> Result<StrategyDocument, AppError> {
        let mut nodes = Vec::new();
        for (id, node) in self.graph.nodes() {
            nodes.push(NodeSpec {
                id: id.to_string(),
                dataset: node.dataset.as_deref().map(|p| self.relativize(p)),
                fixed_data: node.fixed_data.as_deref().map(|p| self.relativize(p)),
                output_folder: node.output_folder.as_deref().map(|p| self.relativize(p)),
            });
        }

        let original_paths: HashMap<&str, &EdgeSpec> = self
            .document
            .edges
            .iter()
            .map(|edge| (edge.child.as_str(), edge))
            .collect();
        let file_position: HashMap<&str, usize> = self
            .document
            .edges
            .iter()
            .enumerate()
            .map(|(position, edge)| (edge.child.as_str(), position))
            .collect();
        let mut views = self.graph.edges();
        views.sort_by_key(|view| file_position.get(view.child).copied().unwrap_or(usize::MAX));

        let mut edges = Vec::new();
        for view in views {
            let child = self.graph.node(view.child)?;
            let previous = original_paths.get(view.child);
            let transformation = previous
                .map(|spec| spec.transformation.clone())
                .unwrap_or_else(|| PathBuf::from(format!("{}.txt", view.child)));
            edges.push(EdgeSpec {
                parent: view.parent.to_string(),
                child: view.child.to_string(),
                transformation,
                kind: previous.and_then(|spec| spec.kind),
                fingerprint: (!child.dirty).then(|| view.transformation.fingerprint()),
            });
        }

        Ok(StrategyDocument {
            version: self.document.version.clone(),
            metadata: self.document.metadata.clone(),
            nodes,
            edges,
        })
    }

    /// Write the current state back to the strategy file.
    ///
    /// Edges created after load get their parameter file written next to the
    /// document as `<child>.txt`.
    pub fn save(&mut self) -> Result<(), AppError> {
        let snapshot = self.snapshot()?;
        for view in self.graph.edges() {
            let known = self
                .document
                .edges
                .iter()
                .any(|edge| edge.child == view.child);
            if !known {
                let path = self.base_dir.join(format!("{}.txt", view.child));
                view.transformation.save_to_file(&path)?;
            }
        }
        atomic_write(&self.path, snapshot.to_yaml()?.as_bytes())?;
        self.document = snapshot;
        Ok(())
    }

    fn relativize(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.base_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

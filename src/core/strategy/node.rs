use crate::core::types::NodeState;
use std::path::{Path, PathBuf};

/// One dataset state in a registration strategy.
///
/// Paths are assigned without validation; the edge that consumes a node checks
/// them when it executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyNode {
    pub dataset: Option<PathBuf>,
    pub fixed_data: Option<PathBuf>,
    pub output_folder: Option<PathBuf>,
    pub dirty: bool,
}

impl Default for StrategyNode {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyNode {
    pub fn new() -> Self {
        Self {
            dataset: None,
            fixed_data: None,
            output_folder: None,
            dirty: true,
        }
    }

    pub fn with_dataset<P: Into<PathBuf>>(mut self, dataset: P) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    pub fn with_fixed_data<P: Into<PathBuf>>(mut self, fixed_data: P) -> Self {
        self.fixed_data = Some(fixed_data.into());
        self
    }

    pub fn with_output_folder<P: Into<PathBuf>>(mut self, output_folder: P) -> Self {
        self.output_folder = Some(output_folder.into());
        self
    }

    /// Flag this node as stale. Descendants are the graph's concern.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn state(&self) -> NodeState {
        if self.dirty {
            NodeState::Pending
        } else {
            NodeState::Materialized
        }
    }

    /// Reference image for registration: fixed data when set, otherwise the dataset.
    pub fn fixed_reference(&self) -> Option<&Path> {
        self.fixed_data.as_deref().or(self.dataset.as_deref())
    }

    /// Whether the dataset path is set and present on disk.
    pub fn has_existing_dataset(&self) -> bool {
        self.dataset.as_deref().is_some_and(Path::is_file)
    }

    pub(crate) fn materialize(&mut self, dataset: PathBuf) {
        self.dataset = Some(dataset);
        self.dirty = false;
    }
}

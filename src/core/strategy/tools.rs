#![allow(clippy::result_large_err)]

//! Editing tools that add a transformation to the moving volume's stack.
//!
//! A tool pushes its transformation on `begin`, commits it on `apply`, removes
//! it again on `cancel`, and drops its working state on `clean_up`. Solving
//! landmark transforms is left to the visualization layer; the landmark tool
//! only records the picked pairs as parameters.

use crate::core::error::AppError;
use crate::core::strategy::transformation::Transformation;
use crate::core::types::{ErrorCategory, LandmarkTransformType, TransformationKind};
use std::path::PathBuf;

/// Ordered transformations applied to the moving dataset.
#[derive(Debug, Clone, Default)]
pub struct TransformationStack {
    entries: Vec<Transformation>,
}

impl TransformationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transformation: Transformation) -> usize {
        self.entries.push(transformation);
        self.entries.len() - 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Transformation> {
        self.entries.get(index)
    }

    pub fn last(&self) -> Option<&Transformation> {
        self.entries.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transformation> {
        self.entries.iter()
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut Transformation> {
        self.entries.get_mut(index)
    }

    fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }
}

/// Lifecycle shared by all transformation editing tools.
pub trait TransformationTool {
    fn kind(&self) -> TransformationKind;

    /// Push the tool's working transformation.
    fn begin(&mut self, stack: &mut TransformationStack) -> Result<(), AppError>;

    /// Commit the working transformation.
    fn apply(&mut self, stack: &mut TransformationStack) -> Result<(), AppError>;

    /// Remove the working transformation if it has not been applied.
    fn cancel(&mut self, stack: &mut TransformationStack);

    /// Drop picked points and other working state.
    fn clean_up(&mut self);
}

/// Matching points picked in the fixed and moving volumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkPair {
    pub fixed: [f64; 3],
    pub moving: [f64; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolPhase {
    Idle,
    Editing { index: usize },
    Applied,
}

/// Point-based alignment from landmark pairs.
#[derive(Debug, Clone)]
pub struct LandmarkTool {
    landmark_type: LandmarkTransformType,
    pairs: Vec<LandmarkPair>,
    phase: ToolPhase,
}

impl Default for LandmarkTool {
    fn default() -> Self {
        Self::new(LandmarkTransformType::default())
    }
}

impl LandmarkTool {
    pub fn new(landmark_type: LandmarkTransformType) -> Self {
        Self {
            landmark_type,
            pairs: Vec::new(),
            phase: ToolPhase::Idle,
        }
    }

    pub fn landmark_type(&self) -> LandmarkTransformType {
        self.landmark_type
    }

    pub fn set_landmark_type(&mut self, landmark_type: LandmarkTransformType) {
        self.landmark_type = landmark_type;
    }

    pub fn add_pair(&mut self, pair: LandmarkPair) {
        self.pairs.push(pair);
    }

    pub fn remove_pair(&mut self, index: usize) -> Option<LandmarkPair> {
        (index < self.pairs.len()).then(|| self.pairs.remove(index))
    }

    pub fn pairs(&self) -> &[LandmarkPair] {
        &self.pairs
    }

    /// Pairs needed before the solver can produce a transform.
    pub fn minimum_pairs(&self) -> usize {
        match self.landmark_type {
            LandmarkTransformType::Rigid | LandmarkTransformType::Similarity => 3,
            LandmarkTransformType::Affine => 4,
        }
    }
}

impl TransformationTool for LandmarkTool {
    fn kind(&self) -> TransformationKind {
        TransformationKind::Landmark
    }

    fn begin(&mut self, stack: &mut TransformationStack) -> Result<(), AppError> {
        if let ToolPhase::Editing { .. } = self.phase {
            return Err(tool_error("landmark tool is already active"));
        }
        let index = stack.push(Transformation::new(TransformationKind::Landmark).with_name("Landmark"));
        self.phase = ToolPhase::Editing { index };
        Ok(())
    }

    fn apply(&mut self, stack: &mut TransformationStack) -> Result<(), AppError> {
        let ToolPhase::Editing { index } = self.phase else {
            return Err(tool_error("landmark tool has not been started"));
        };
        if self.pairs.len() < self.minimum_pairs() {
            return Err(tool_error(format!(
                "{} landmark transform needs at least {} pairs, got {}",
                self.landmark_type.as_str(),
                self.minimum_pairs(),
                self.pairs.len()
            )));
        }
        let transformation = stack
            .get_mut(index)
            .ok_or_else(|| tool_error("landmark transformation was removed from the stack"))?;
        transformation.set_parameter(
            "LandmarkTransformType",
            format!("\"{}\"", self.landmark_type.as_str()),
        )?;
        transformation.set_parameter("NumberOfLandmarks", self.pairs.len().to_string())?;
        transformation.set_parameter("FixedLandmarks", join_points(self.pairs.iter().map(|p| p.fixed)))?;
        transformation.set_parameter("MovingLandmarks", join_points(self.pairs.iter().map(|p| p.moving)))?;
        self.phase = ToolPhase::Applied;
        Ok(())
    }

    fn cancel(&mut self, stack: &mut TransformationStack) {
        if let ToolPhase::Editing { index } = self.phase {
            stack.truncate(index);
            self.phase = ToolPhase::Idle;
        }
    }

    fn clean_up(&mut self) {
        self.pairs.clear();
        self.phase = ToolPhase::Idle;
    }
}

/// Adds a transformation read from an engine parameter file.
#[derive(Debug, Clone)]
pub struct ParameterFileTool {
    path: PathBuf,
    kind: TransformationKind,
    phase: ToolPhase,
}

impl ParameterFileTool {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            kind: TransformationKind::Custom,
            phase: ToolPhase::Idle,
        }
    }
}

impl TransformationTool for ParameterFileTool {
    fn kind(&self) -> TransformationKind {
        self.kind
    }

    fn begin(&mut self, stack: &mut TransformationStack) -> Result<(), AppError> {
        if let ToolPhase::Editing { .. } = self.phase {
            return Err(tool_error("parameter file tool is already active"));
        }
        let transformation = Transformation::from_file(&self.path)?;
        self.kind = transformation.kind();
        let index = stack.push(transformation);
        self.phase = ToolPhase::Editing { index };
        Ok(())
    }

    fn apply(&mut self, _stack: &mut TransformationStack) -> Result<(), AppError> {
        match self.phase {
            ToolPhase::Editing { .. } => {
                self.phase = ToolPhase::Applied;
                Ok(())
            }
            _ => Err(tool_error("parameter file tool has not been started")),
        }
    }

    fn cancel(&mut self, stack: &mut TransformationStack) {
        if let ToolPhase::Editing { index } = self.phase {
            stack.truncate(index);
            self.phase = ToolPhase::Idle;
        }
    }

    fn clean_up(&mut self) {
        self.phase = ToolPhase::Idle;
    }
}

fn join_points(points: impl Iterator<Item = [f64; 3]>) -> String {
    points
        .flat_map(|point| point.into_iter())
        .map(|coordinate| coordinate.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn tool_error<T: Into<String>>(message: T) -> AppError {
    AppError::new(ErrorCategory::ValidationError, message).with_code("RS-TOOL-001")
}

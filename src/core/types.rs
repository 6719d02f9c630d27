use serde::{Deserialize, Serialize};

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    ParseError,
    IoError,
    KeyNotFound,
    InvalidEdgeState,
    RegistrationEngineError,
    ValidationError,
    TimeoutError,
    Cancelled,
    InternalError,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
}

/// Materialization state of a strategy node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    #[default]
    Pending,
    Materialized,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Pending => write!(f, "pending"),
            NodeState::Materialized => write!(f, "materialized"),
        }
    }
}

/// Kind of registration step a transformation describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransformationKind {
    Landmark,
    Rigid,
    Similarity,
    Affine,
    Elastic,
    #[default]
    Custom,
}

impl TransformationKind {
    /// Infer the kind from the engine's `Transform` parameter value.
    pub fn from_engine_transform(name: &str) -> Self {
        match name.trim().trim_matches('"') {
            "EulerTransform" => TransformationKind::Rigid,
            "SimilarityTransform" => TransformationKind::Similarity,
            "AffineTransform" | "AffineDTITransform" => TransformationKind::Affine,
            "BSplineTransform"
            | "RecursiveBSplineTransform"
            | "SplineKernelTransform"
            | "BSplineStackTransform" => TransformationKind::Elastic,
            _ => TransformationKind::Custom,
        }
    }
}

impl std::fmt::Display for TransformationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransformationKind::Landmark => "landmark",
            TransformationKind::Rigid => "rigid",
            TransformationKind::Similarity => "similarity",
            TransformationKind::Affine => "affine",
            TransformationKind::Elastic => "elastic",
            TransformationKind::Custom => "custom",
        };
        write!(f, "{}", label)
    }
}

/// Point-based alignment model used by the landmark tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LandmarkTransformType {
    #[default]
    Rigid,
    Similarity,
    Affine,
}

impl LandmarkTransformType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LandmarkTransformType::Rigid => "Rigid",
            LandmarkTransformType::Similarity => "Similarity",
            LandmarkTransformType::Affine => "Affine",
        }
    }
}

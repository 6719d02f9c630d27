//! Registration strategies: datasets, the transformations between them, and
//! the graph that keeps derived datasets up to date.

pub mod cancel;
pub mod document;
pub mod dot;
pub mod edge;
pub mod engine;
pub mod graph;
pub mod node;
pub mod status;
pub mod tools;
pub mod transformation;

pub use cancel::{CancelSource, CancelToken};
pub use document::{EdgeSpec, LoadedStrategy, NodeSpec, StrategyDocument, StrategyMetadata};
pub use dot::strategy_to_dot;
pub use edge::StrategyEdge;
pub use engine::{
    ProcessOutput, ProcessRequest, ProcessRunner, RegistrationEngine, RegistrationRequest,
    TokioProcessRunner,
};
pub use graph::{EdgeView, NodeFailure, RunPolicy, RunReport, StrategyGraph};
pub use node::StrategyNode;
pub use status::{ChannelReporter, StatusEvent, StatusReporter, TracingReporter};
pub use tools::{
    LandmarkPair, LandmarkTool, ParameterFileTool, TransformationStack, TransformationTool,
};
pub use transformation::{ParameterFileError, Transformation};

//! Progress reporting for strategy execution.
//!
//! Executors receive a reporter explicitly; there is no process-wide status
//! object. A UI thread can subscribe through [`ChannelReporter`].

use crate::core::error::AppError;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Observer notified as edges execute and nodes are invalidated.
pub trait StatusReporter: Send + Sync {
    fn edge_started(&self, parent: &str, child: &str);
    fn edge_finished(&self, child: &str, dataset: &Path);
    fn edge_failed(&self, child: &str, error: &AppError);
    fn node_invalidated(&self, node: &str);
    fn message(&self, text: &str);
}

/// Reporter that writes every event to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl StatusReporter for TracingReporter {
    fn edge_started(&self, parent: &str, child: &str) {
        tracing::info!(parent, child, "registration started");
    }

    fn edge_finished(&self, child: &str, dataset: &Path) {
        tracing::info!(child, dataset = %dataset.display(), "registration finished");
    }

    fn edge_failed(&self, child: &str, error: &AppError) {
        tracing::error!(child, code = %error.code, category = %error.category, "registration failed: {}", error.message);
    }

    fn node_invalidated(&self, node: &str) {
        tracing::debug!(node, "node marked dirty");
    }

    fn message(&self, text: &str) {
        tracing::info!("{}", text);
    }
}

/// Event forwarded by [`ChannelReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    EdgeStarted { parent: String, child: String },
    EdgeFinished { child: String, dataset: PathBuf },
    EdgeFailed { child: String, code: String, message: String },
    NodeInvalidated { node: String },
    Message(String),
}

/// Reporter that forwards events to an unbounded channel.
///
/// Events are dropped silently once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    sender: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: StatusEvent) {
        let _ = self.sender.send(event);
    }
}

impl StatusReporter for ChannelReporter {
    fn edge_started(&self, parent: &str, child: &str) {
        self.send(StatusEvent::EdgeStarted {
            parent: parent.to_string(),
            child: child.to_string(),
        });
    }

    fn edge_finished(&self, child: &str, dataset: &Path) {
        self.send(StatusEvent::EdgeFinished {
            child: child.to_string(),
            dataset: dataset.to_path_buf(),
        });
    }

    fn edge_failed(&self, child: &str, error: &AppError) {
        self.send(StatusEvent::EdgeFailed {
            child: child.to_string(),
            code: error.code.clone(),
            message: error.message.clone(),
        });
    }

    fn node_invalidated(&self, node: &str) {
        self.send(StatusEvent::NodeInvalidated {
            node: node.to_string(),
        });
    }

    fn message(&self, text: &str) {
        self.send(StatusEvent::Message(text.to_string()));
    }
}

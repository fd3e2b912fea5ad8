//! Error types for editor operations.

use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

use crate::tree::NodeId;

/// Boxed error returned by plugin command handlers.
pub type HandlerFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while configuring or driving an editor session.
#[derive(Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum EditorError {
    /// Invalid or colliding plugin contributions, detected at setup.
    #[error("invalid editor configuration: {0}")]
    #[diagnostic(code(weaver::richtext::configuration))]
    Configuration(String),

    /// The configuration document could not be parsed.
    #[error("failed to parse editor config")]
    #[diagnostic(
        code(weaver::richtext::invalid_config),
        help("the config is JSON; unknown keys are rejected")
    )]
    InvalidConfig(#[source] serde_json::Error),

    /// No handler is registered for the command.
    #[error("unknown command `{0}`")]
    #[diagnostic(
        code(weaver::richtext::unknown_command),
        help("commands are contributed by plugins; check the plugin list")
    )]
    UnknownCommand(SmolStr),

    /// A selection endpoint lies outside the editable root.
    #[error("position {node}:{offset} is outside the editable root")]
    #[diagnostic(code(weaver::richtext::out_of_bounds))]
    OutOfBounds { node: NodeId, offset: usize },

    /// A mutation was observed that the recorder cannot trace back to a known node.
    #[error("inconsistent mutation: {0}")]
    #[diagnostic(
        code(weaver::richtext::inconsistent_mutation),
        help("the tree was mutated outside the command/record machinery")
    )]
    InconsistentMutation(String),

    /// A plugin command handler failed.
    #[error("handler for `{command}` failed: {source}")]
    #[diagnostic(code(weaver::richtext::handler))]
    Handler {
        command: SmolStr,
        #[source]
        source: HandlerFailure,
    },

    /// The node id does not exist in the arena.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// An element-only operation was applied to a text node.
    #[error("node {0} is not an element")]
    NotAnElement(NodeId),

    /// A text-only operation was applied to an element.
    #[error("node {0} is not a text node")]
    NotAText(NodeId),

    /// The operation would break the tree shape (cycles, double parents, bad references).
    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),
}

impl EditorError {
    /// Whether a well-behaved caller is expected to handle this error locally.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnknownCommand(_) | Self::OutOfBounds { .. })
    }
}

pub type Result<T, E = EditorError> = std::result::Result<T, E>;

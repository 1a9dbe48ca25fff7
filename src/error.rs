use rhai::{EvalAltResult, ParseError};
use thiserror::Error;

/// Errors raised by the controller bridge.
///
/// Missing or non-callable handlers are never errors; dispatch falls back instead.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// An error raised inside a scripted handler or constructor, passed through untouched.
    #[error(transparent)]
    Script(#[from] Box<EvalAltResult>),

    #[error("failed to compile controller class '{class}': {source}")]
    Compile {
        class: String,
        #[source]
        source: ParseError,
    },

    #[error("failed to read controller class '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("base initialization of '{class}' failed: {reason}")]
    BaseInit { class: String, reason: String },

    #[error("handler '{handler}' of '{class}' takes {found:?} argument(s), dispatch passes {expected}")]
    HandlerSignature { class: String, handler: String, expected: usize, found: Vec<usize> },

    #[error("scripted object of class '{class}' is already owned by controller '{owner}'")]
    AlreadyAttached { class: String, owner: String },

    #[error("scripted object of class '{class}' is no longer an object map: {reason}")]
    InvalidObject { class: String, reason: String },

    #[error("scripted object was collected by the runtime")]
    Collected,

    #[error("node '{node}' must be initialized before it can be animated")]
    NotInitialized { node: String },

    #[error("unknown component type '{0}'")]
    UnknownComponent(String),

    #[error("unknown event '{0}'")]
    UnknownEvent(String),
}

impl ControllerError {
    /// The script error carried by this error, if a handler raised it.
    pub fn as_script(&self) -> Option<&EvalAltResult> {
        match self {
            ControllerError::Script(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T, E = ControllerError> = std::result::Result<T, E>;

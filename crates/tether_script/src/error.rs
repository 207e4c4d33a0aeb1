use std::path::PathBuf;
use tether_core::BridgeError;
use tether_dispatch::DispatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script engine error: {0}")]
    Engine(#[from] rquickjs::Error),

    /// An uncaught script exception.
    #[error("{name}: {message}")]
    Exception {
        name: String,
        message: String,
        stack: Option<String>,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("invalid engine configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("`{0}` is not a function")]
    NotCallable(String),

    #[error("event loop is already running on this engine")]
    AlreadyRunning,
}

impl ScriptError {
    /// Name of the script exception, if this error is one.
    pub fn exception_name(&self) -> Option<&str> {
        match self {
            ScriptError::Exception { name, .. } => Some(name),
            _ => None,
        }
    }
}

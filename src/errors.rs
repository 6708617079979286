//! Discovery Error Hierarchy
//!
//! Errors are categorized by the layer that produced them. None of them is
//! meant to cross into the hosting framework: the tracker and the interest
//! manager absorb and log everything at their boundary.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Coordination tree access failures (watch, list, read)
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// Endpoint description construction or decoding failures
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// Property filter parse failures
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Consumer notification sink failures
    #[error("Listener failed: {0}")]
    Listener(String),

    /// Unrecoverable failures requiring the component to stop
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// Path does not exist in the tree
    #[error("No node at path: {0}")]
    NoNode(String),

    /// Node already exists
    #[error("Node already exists: {0}")]
    NodeExists(String),

    /// Client session was lost; every watch registered under it is gone
    #[error("Coordination session expired")]
    SessionExpired,

    /// Client gave up after its own retry policy
    #[error("Coordination service unavailable: {0}")]
    Unavailable(String),

    /// Malformed tree path
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Endpoint description requires at least one interface name")]
    NoInterfaces,

    /// Node payload could not be encoded or decoded
    #[error("Endpoint payload codec failure: {0}")]
    Codec(#[from] bincode::Error),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("Unexpected end of filter at position {0}")]
    UnexpectedEnd(usize),

    #[error("Unexpected character '{found}' at position {position}")]
    UnexpectedChar { found: char, position: usize },

    #[error("Missing attribute name at position {0}")]
    MissingAttribute(usize),

    #[error("Trailing characters after filter at position {0}")]
    TrailingInput(usize),

    #[error("Filter nested too deeply at position {0}")]
    TooDeep(usize),
}

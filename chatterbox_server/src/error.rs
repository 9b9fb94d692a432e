// Error types for the server crate.
//
// Wire-level failures live in `chatterbox_protocol::WireError`; the enums here
// wrap them for the three callers that can fail: server startup, a running
// session, and the client.

use std::io;
use std::path::PathBuf;

use chatterbox_protocol::WireError;
use thiserror::Error;

/// Startup failures. Any of these ends the process.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to spawn listener thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Why a session stopped early. Always local to that one session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}

/// Client-side failures.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("not logged in")]
    NotLoggedIn,
}

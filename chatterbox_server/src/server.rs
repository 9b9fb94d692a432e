// TCP acceptor and shared-state wiring for the chat server.
//
// Architecture: thread-per-connection around two shared structures.
//
// - **Shared state**: one `UserRegistry`, one `MessageQueue` and one
//   `CannedContent`, built here when the server starts and handed to every
//   session as `Arc` clones inside a `CommandProcessor`. Nothing is global.
// - **Listener thread** (`TcpListener::accept()` loop): accepts connections
//   and spawns one named session thread per connection. The listener is
//   non-blocking so the loop can check `keep_running` between accepts.
// - **Session threads** (`session.rs`): each owns its socket end-to-end. They
//   never talk to each other; all coordination goes through the registry and
//   the queue.
//
// Shutdown: `ServerHandle::stop` clears `keep_running`. The listener exits
// within one accept interval and every session leaves its wait loop within one
// poll interval, logging its user out on the way.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error, info};

use crate::command::CommandProcessor;
use crate::content::CannedContent;
use crate::error::ServerError;
use crate::queue::{DEFAULT_MAX_PENDING, MessageQueue};
use crate::registry::UserRegistry;
use crate::session::{Session, SessionConfig};

/// How long the listener sleeps when no connection is waiting.
const ACCEPT_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for starting a server. Every field has a default, so a JSON
/// config file only needs the fields it changes.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub poll_interval_ms: u64,
    pub auth_timeout_secs: Option<u64>,
    pub max_login_attempts: u32,
    pub max_pending_per_recipient: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 7878,
            poll_interval_ms: 100,
            auth_timeout_secs: None,
            max_login_attempts: 0,
            max_pending_per_recipient: DEFAULT_MAX_PENDING,
        }
    }
}

impl ServerConfig {
    /// Load a config from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ServerError::ConfigParse {
            path: path.to_owned(),
            source,
        })
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            auth_timeout: self.auth_timeout_secs.map(Duration::from_secs),
            max_login_attempts: self.max_login_attempts,
        }
    }
}

/// Handle returned by `start_server` to inspect and stop the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    processor: CommandProcessor,
}

impl ServerHandle {
    /// The live user registry shared with every session.
    pub fn registry(&self) -> &UserRegistry {
        self.processor.registry()
    }

    /// The live message queue shared with every session.
    pub fn queue(&self) -> &MessageQueue {
        self.processor.queue()
    }

    /// Signal the server to stop and wait for the listener to exit. Sessions
    /// close on their own within one poll interval.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        self.join();
    }

    /// Block until the listener exits (i.e. forever, unless stopped elsewhere
    /// or accept fails).
    pub fn wait(mut self) {
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Bind and start accepting on a background thread. Returns a handle and the
/// actual bound address (useful with port 0).
pub fn start_server(config: ServerConfig) -> Result<(ServerHandle, SocketAddr), ServerError> {
    let addr = format!("{}:{}", config.bind_addr, config.port);
    let bind_error = |source| ServerError::Bind {
        addr: addr.clone(),
        source,
    };
    let listener = TcpListener::bind(&addr).map_err(bind_error)?;
    let local = listener.local_addr().map_err(bind_error)?;
    listener.set_nonblocking(true).map_err(bind_error)?;

    let processor = CommandProcessor::new(
        Arc::new(UserRegistry::new()),
        Arc::new(MessageQueue::new(config.max_pending_per_recipient)),
        Arc::new(CannedContent::default()),
    );
    let keep_running = Arc::new(AtomicBool::new(true));

    let session_config = config.session_config();
    let accept_processor = processor.clone();
    let accept_running = keep_running.clone();
    let thread = thread::Builder::new()
        .name("chat-accept".into())
        .spawn(move || accept_loop(listener, accept_processor, session_config, accept_running))
        .map_err(ServerError::Spawn)?;

    info!(addr = %local, "server listening");
    Ok((
        ServerHandle {
            keep_running,
            thread: Some(thread),
            processor,
        },
        local,
    ))
}

fn accept_loop(
    listener: TcpListener,
    processor: CommandProcessor,
    config: SessionConfig,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => spawn_session(stream, peer, &processor, config, &keep_running),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_INTERVAL);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                error!(error = %e, "accept failed; listener stopping");
                break;
            }
        }
    }
    info!("listener stopped");
}

/// Hand one accepted connection to its own session thread.
fn spawn_session(
    stream: TcpStream,
    peer: SocketAddr,
    processor: &CommandProcessor,
    config: SessionConfig,
    keep_running: &Arc<AtomicBool>,
) {
    debug!(%peer, "accepted connection");
    // Accepted sockets may inherit the listener's non-blocking mode.
    if let Err(e) = stream.set_nonblocking(false) {
        error!(%peer, error = %e, "could not configure socket");
        return;
    }
    let session = match Session::new(stream, processor.clone(), config, keep_running.clone()) {
        Ok(session) => session,
        Err(e) => {
            error!(%peer, error = %e, "could not set up session");
            return;
        }
    };
    if let Err(e) = thread::Builder::new()
        .name(format!("session-{peer}"))
        .spawn(move || session.run())
    {
        error!(%peer, error = %e, "could not spawn session thread");
    }
}

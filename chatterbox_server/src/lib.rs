// chatterbox_server: a multi-user text chat server.
//
// Clients connect over TCP, log in with a username and a credential, and then
// exchange length-prefixed text frames (see `chatterbox_protocol`). Plain
// lines are broadcast to everyone online; lines starting with `/` are
// commands (`/msg`, `/poke`, `/time`, `/joke`, `/picture`, `/users`,
// `/quit`).
//
// Module overview:
// - `registry.rs`:  Known accounts, salted credentials, presence and uptime.
// - `queue.rs`:     Pending deliveries, bounded per recipient.
// - `command.rs`:   Line parsing and routing into the queue.
// - `content.rs`:   Canned joke list and picture.
// - `render.rs`:    Turns a `Delivery` into the text the recipient sees.
// - `session.rs`:   One connection's lifecycle, from handshake to logout.
// - `readiness.rs`: Bounded wait for socket input.
// - `server.rs`:    Listener thread, config, and the `start_server` entry.
// - `client.rs`:    Client used by the `chat` binary and the tests.
// - `error.rs`:     Error enums for startup, sessions and the client.
//
// The server runs as a standalone binary (`main.rs`) or embedded through
// `start_server`, which is how the tests drive it.

pub mod client;
pub mod command;
pub mod content;
pub mod error;
pub mod queue;
pub mod readiness;
pub mod registry;
pub mod render;
pub mod server;
pub mod session;

pub use client::ChatClient;
pub use error::{ClientError, ServerError};
pub use server::{ServerConfig, ServerHandle, start_server};

// chatterbox_protocol: wire protocol for the Chatterbox chat service.
//
// This crate defines the framing and the few fixed literals used by the chat
// server (`chatterbox_server`) and its clients to talk over TCP. It is shared
// between both sides and knows nothing about sessions, the user registry or
// the message queue.
//
// Module overview:
// - `types.rs`:    `Username`, the only identity on the wire.
// - `message.rs`:  Login reply literals and the session-ending commands.
// - `framing.rs`:  Length-prefixed text frames over any `Read`/`Write`
//                  stream: 4-byte big-endian length (terminator included),
//                  UTF-8 text, NUL terminator. Also the `WireError` type.
//
// Design decisions:
// - **Plain text frames.** Chat lines and display text are sent as-is; there
//   is no JSON envelope. Commands are parsed from the text by the server.
// - **No async runtime.** Uses `std::io::Read`/`Write`, so the same functions
//   serve blocking sockets, buffered wrappers and in-memory test cursors.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{MAX_FRAME_SIZE, WireError, read_frame, read_int, write_frame, write_int};
pub use message::{LOGIN_FAILURE, LOGIN_SUCCESS, LoginReply, is_quit_command};
pub use types::Username;

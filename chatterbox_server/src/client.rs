// TCP client for the chat server.
//
// Used by the `chat` binary and by the integration tests. Architecture:
// - `connect()` opens the TCP connection on the calling thread.
// - `login()` runs the handshake synchronously: username frame, credential
//   frame, read the reply literal. It may be called again after a refusal.
// - After a successful login a background reader thread calls `read_frame()`
//   in a loop and pushes each display frame into an `mpsc` channel.
// - The caller holds a `BufWriter<TcpStream>` for sending lines.
// - `poll()` drains the inbox without blocking; `recv_timeout()` waits.
//
// The reader thread exits when the server closes the connection or the
// receiver is dropped; `is_closed()` reports the former.

use std::io::{BufWriter, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chatterbox_protocol::{LoginReply, read_frame, write_frame};
use tracing::debug;

use crate::error::ClientError;

/// How long `login` waits for the server's reply.
const LOGIN_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP client for one chat connection.
pub struct ChatClient {
    stream: TcpStream,
    writer: BufWriter<TcpStream>,
    inbox: Option<Receiver<String>>,
    closed: Arc<AtomicBool>,
    _reader_thread: Option<JoinHandle<()>>,
}

impl ChatClient {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).map_err(ClientError::Connect)?;
        stream.set_nodelay(true).map_err(ClientError::Connect)?;
        let writer = BufWriter::new(stream.try_clone().map_err(ClientError::Connect)?);
        Ok(Self {
            stream,
            writer,
            inbox: None,
            closed: Arc::new(AtomicBool::new(false)),
            _reader_thread: None,
        })
    }

    /// Send credentials and wait for the verdict. On `Accepted` the reader
    /// thread starts and further logins are not allowed.
    pub fn login(&mut self, username: &str, password: &str) -> Result<LoginReply, ClientError> {
        if self.inbox.is_some() {
            return Ok(LoginReply::Accepted);
        }
        write_frame(&mut self.writer, username)?;
        write_frame(&mut self.writer, password)?;

        self.stream
            .set_read_timeout(Some(LOGIN_REPLY_TIMEOUT))
            .map_err(ClientError::Connect)?;
        let reply = LoginReply::from_wire(&read_frame(&mut &self.stream)?);
        self.stream
            .set_read_timeout(None)
            .map_err(ClientError::Connect)?;

        if reply == LoginReply::Accepted {
            self.start_reader()?;
        }
        Ok(reply)
    }

    fn start_reader(&mut self) -> Result<(), ClientError> {
        let stream = self.stream.try_clone().map_err(ClientError::Connect)?;
        let (tx, rx) = mpsc::channel();
        let closed = self.closed.clone();
        let handle = thread::spawn(move || reader_loop(stream, tx, closed));
        self.inbox = Some(rx);
        self._reader_thread = Some(handle);
        Ok(())
    }

    /// Send one chat line or command.
    pub fn send_line(&mut self, line: &str) -> Result<(), ClientError> {
        if self.inbox.is_none() {
            return Err(ClientError::NotLoggedIn);
        }
        write_frame(&mut self.writer, line)?;
        Ok(())
    }

    /// Drain every display frame received so far (non-blocking).
    pub fn poll(&self) -> Vec<String> {
        self.inbox
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default()
    }

    /// Wait up to `timeout` for the next display frame.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<String> {
        let rx = self.inbox.as_ref()?;
        match rx.recv_timeout(timeout) {
            Ok(text) => Some(text),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// True once the server side has closed the connection.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send `/quit` (if logged in) and close the socket.
    pub fn disconnect(mut self) {
        if self.inbox.is_some() {
            let _ = write_frame(&mut self.writer, "/quit");
        }
        let _ = self.writer.flush();
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    /// Drop the connection without saying goodbye, as a crashed client would.
    pub fn abort(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Reader thread: read frames until the connection ends, push to channel.
fn reader_loop(stream: TcpStream, tx: mpsc::Sender<String>, closed: Arc<AtomicBool>) {
    loop {
        match read_frame(&mut &stream) {
            Ok(text) => {
                if tx.send(text).is_err() {
                    break; // Owner dropped the receiver
                }
            }
            Err(e) => {
                debug!(error = %e, "server connection ended");
                break;
            }
        }
    }
    closed.store(true, Ordering::SeqCst);
}

// Per-connection session handler.
//
// One `Session` owns one accepted TCP connection from accept to close and runs
// on its own thread (spawned by `server.rs`). It moves through
//
//   Connecting -> Authenticating -> Active -> Closing
//
// and never goes back.
//
// - Connecting: the socket is configured (no Nagle) and split into a read
//   half (used raw, so readiness polling sees every unread byte) and a
//   buffered write half.
// - Authenticating: read a username frame and a credential frame, ask the
//   registry, reply with the success or failure literal. A rejection keeps the
//   session here so the client can try again; only a transport error, the
//   optional attempt limit, the optional handshake deadline, or server
//   shutdown ends it.
// - Active: announce the arrival, then loop: drain this user's deliveries and
//   write each as one frame; wait up to `poll_interval` for input; if a line
//   arrived, hand it to the command processor. `/quit`, `/close`, a failed
//   transfer or server shutdown leave the loop.
// - Closing: log the user out (if they ever logged in), announce the
//   departure, shut the socket down.
//
// A session only shares state through the registry and the queue. Errors are
// never propagated beyond `run`; a dead connection ends this session and
// nothing else.

use std::io::{BufWriter, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chatterbox_protocol::{LoginReply, Username, WireError, read_frame, write_frame};
use tracing::{debug, info, warn};

use crate::command::{CommandProcessor, Flow};
use crate::error::SessionError;
use crate::readiness::wait_readable;
use crate::registry::LoginOutcome;
use crate::render::render;

/// Per-session tunables, copied out of `ServerConfig`.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Upper bound on each wait for client input.
    pub poll_interval: Duration,
    /// Deadline for completing a login, measured from the start of
    /// authentication. `None` waits indefinitely.
    pub auth_timeout: Option<Duration>,
    /// Rejections allowed before the connection is dropped. 0 = unlimited.
    pub max_login_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            auth_timeout: None,
            max_login_attempts: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Active,
    Closing,
}

/// Outcome of waiting for client input.
enum Input {
    Ready,
    Shutdown,
    Expired,
}

/// Why the Active loop ended without an error.
#[derive(Debug)]
enum ActiveEnd {
    Quit,
    Shutdown,
}

pub struct Session {
    reader: TcpStream,
    writer: BufWriter<TcpStream>,
    peer: Option<SocketAddr>,
    processor: CommandProcessor,
    config: SessionConfig,
    keep_running: Arc<AtomicBool>,
    state: SessionState,
    user: Option<Username>,
}

impl Session {
    /// Take ownership of an accepted connection (state `Connecting`).
    pub fn new(
        stream: TcpStream,
        processor: CommandProcessor,
        config: SessionConfig,
        keep_running: Arc<AtomicBool>,
    ) -> std::io::Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(None)?;
        let peer = stream.peer_addr().ok();
        let writer = BufWriter::new(stream.try_clone()?);
        Ok(Self {
            reader: stream,
            writer,
            peer,
            processor,
            config,
            keep_running,
            state: SessionState::Connecting,
            user: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session to completion. Returns once the connection is closed
    /// and the user (if any) has been logged out.
    pub fn run(mut self) {
        self.transition(SessionState::Authenticating);
        match self.authenticate() {
            Ok(Some(user)) => {
                self.user = Some(user.clone());
                self.transition(SessionState::Active);
                self.processor.announce_connected(&user);
                match self.active_loop(&user) {
                    Ok(end) => debug!(user = %user, ?end, "session ending"),
                    Err(SessionError::Wire(e)) if !e.is_disconnect() => {
                        warn!(user = %user, error = %e, "protocol violation")
                    }
                    Err(e) => info!(user = %user, error = %e, "connection lost"),
                }
            }
            Ok(None) => {}
            Err(e) => debug!(peer = ?self.peer, error = %e, "connection lost before login"),
        }
        self.close();
    }

    fn transition(&mut self, next: SessionState) {
        debug!(peer = ?self.peer, from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    /// Loop until a login succeeds (`Some`) or the session should give up
    /// (`None`).
    fn authenticate(&mut self) -> Result<Option<Username>, SessionError> {
        let deadline = self.config.auth_timeout.map(|t| Instant::now() + t);
        let mut rejections = 0u32;

        loop {
            match self.await_input(deadline)? {
                Input::Ready => {}
                Input::Shutdown => return Ok(None),
                Input::Expired => {
                    info!(peer = ?self.peer, "login timed out");
                    return Ok(None);
                }
            }

            let Some(username) = self.read_login_frame(deadline)? else {
                info!(peer = ?self.peer, "login timed out mid-handshake");
                return Ok(None);
            };
            let Some(credential) = self.read_login_frame(deadline)? else {
                info!(peer = ?self.peer, "login timed out mid-handshake");
                return Ok(None);
            };
            // Active reads are bounded by readiness polling, not a timeout.
            self.reader.set_read_timeout(None)?;
            let username = Username::from(username);
            let outcome = self.processor.registry().login(&username, &credential);

            if outcome.is_accepted() {
                write_frame(&mut self.writer, LoginReply::Accepted.as_wire())?;
                match outcome {
                    LoginOutcome::Created => info!(user = %username, peer = ?self.peer, "signed up"),
                    _ => info!(user = %username, peer = ?self.peer, "logged in"),
                }
                return Ok(Some(username));
            }

            write_frame(&mut self.writer, LoginReply::Refused.as_wire())?;
            rejections += 1;
            info!(user = %username, peer = ?self.peer, ?outcome, "login rejected");
            if self.config.max_login_attempts > 0 && rejections >= self.config.max_login_attempts {
                warn!(peer = ?self.peer, rejections, "too many failed logins");
                return Ok(None);
            }
        }
    }

    /// Read one login frame. With a deadline the read is bounded by the time
    /// left, so a client that stalls mid-frame cannot hold the session;
    /// `None` means the deadline passed.
    fn read_login_frame(&self, deadline: Option<Instant>) -> Result<Option<String>, SessionError> {
        let Some(deadline) = deadline else {
            return Ok(Some(read_frame(&mut &self.reader)?));
        };
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Ok(None);
        }
        self.reader.set_read_timeout(Some(left))?;
        match read_frame(&mut &self.reader) {
            Ok(text) => Ok(Some(text)),
            Err(WireError::ShortRead(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn active_loop(&mut self, user: &Username) -> Result<ActiveEnd, SessionError> {
        loop {
            self.flush_deliveries(user)?;

            if !self.keep_running.load(Ordering::SeqCst) {
                return Ok(ActiveEnd::Shutdown);
            }
            if !wait_readable(&self.reader, self.config.poll_interval)? {
                continue;
            }

            let line = read_frame(&mut &self.reader)?;
            if self.processor.handle_line(user, &line) == Flow::Quit {
                // Best effort: anything already queued for us goes out first.
                let _ = self.flush_deliveries(user);
                return Ok(ActiveEnd::Quit);
            }
        }
    }

    /// Drain this user's queue and write one frame per delivery.
    fn flush_deliveries(&mut self, user: &Username) -> Result<(), SessionError> {
        let deliveries = self.processor.queue().drain(user);
        let total = deliveries.len();
        for (sent, delivery) in deliveries.iter().enumerate() {
            if let Err(e) = write_frame(&mut self.writer, &render(delivery)) {
                warn!(user = %user, lost = total - sent, "deliveries lost with connection");
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Wait for input in `poll_interval` slices so shutdown and the login
    /// deadline are noticed while the client is idle.
    fn await_input(&self, deadline: Option<Instant>) -> Result<Input, SessionError> {
        loop {
            if !self.keep_running.load(Ordering::SeqCst) {
                return Ok(Input::Shutdown);
            }
            let mut wait = self.config.poll_interval;
            if let Some(deadline) = deadline {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Ok(Input::Expired);
                }
                wait = wait.min(left);
            }
            if wait_readable(&self.reader, wait)? {
                return Ok(Input::Ready);
            }
        }
    }

    fn close(mut self) {
        self.transition(SessionState::Closing);
        if let Some(user) = self.user.take() {
            self.processor.registry().logout(&user);
            self.processor.announce_disconnected(&user);
            info!(user = %user, "logged out");
        }
        let _ = self.reader.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use chatterbox_protocol::{LOGIN_FAILURE, LOGIN_SUCCESS};

    use super::*;
    use crate::content::CannedContent;
    use crate::queue::MessageQueue;
    use crate::registry::UserRegistry;

    /// Create a TCP pair: (client_stream, server_stream) on localhost.
    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    fn processor() -> CommandProcessor {
        CommandProcessor::new(
            Arc::new(UserRegistry::new()),
            Arc::new(MessageQueue::default()),
            Arc::new(CannedContent::default()),
        )
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_millis(10),
            ..SessionConfig::default()
        }
    }

    /// Spawn a session on the server half; return the client half and the
    /// session thread.
    fn spawn_session(
        processor: &CommandProcessor,
        config: SessionConfig,
        keep_running: &Arc<AtomicBool>,
    ) -> (TcpStream, thread::JoinHandle<()>) {
        let (client, server) = tcp_pair();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let session = Session::new(server, processor.clone(), config, keep_running.clone()).unwrap();
        assert_eq!(session.state(), SessionState::Connecting);
        let handle = thread::spawn(move || session.run());
        (client, handle)
    }

    fn login(client: &mut TcpStream, user: &str, pass: &str) -> String {
        write_frame(client, user).unwrap();
        write_frame(client, pass).unwrap();
        read_frame(client).unwrap()
    }

    #[test]
    fn login_then_quit_logs_out() {
        let cp = processor();
        let running = Arc::new(AtomicBool::new(true));
        let (mut client, handle) = spawn_session(&cp, fast_config(), &running);

        assert_eq!(login(&mut client, "alice", "pw"), LOGIN_SUCCESS);
        assert!(cp.registry().is_connected("alice"));

        write_frame(&mut client, "/quit").unwrap();
        handle.join().unwrap();
        assert!(!cp.registry().is_connected("alice"));
        assert!(cp.registry().exists("alice"));
    }

    #[test]
    fn rejection_stays_in_authentication() {
        let cp = processor();
        cp.registry().login(&Username::from("alice"), "right");
        cp.registry().logout(&Username::from("alice"));

        let running = Arc::new(AtomicBool::new(true));
        let (mut client, handle) = spawn_session(&cp, fast_config(), &running);

        assert_eq!(login(&mut client, "alice", "wrong"), LOGIN_FAILURE);
        assert_eq!(login(&mut client, "alice", "also wrong"), LOGIN_FAILURE);
        assert_eq!(login(&mut client, "alice", "right"), LOGIN_SUCCESS);
        assert!(cp.registry().is_connected("alice"));

        drop(client);
        handle.join().unwrap();
        assert!(!cp.registry().is_connected("alice"));
    }

    #[test]
    fn attempt_limit_closes_connection() {
        let cp = processor();
        cp.registry().login(&Username::from("alice"), "pw");

        let running = Arc::new(AtomicBool::new(true));
        let config = SessionConfig {
            max_login_attempts: 2,
            ..fast_config()
        };
        let (mut client, handle) = spawn_session(&cp, config, &running);

        assert_eq!(login(&mut client, "alice", "pw"), LOGIN_FAILURE);
        assert_eq!(login(&mut client, "alice", "pw"), LOGIN_FAILURE);
        handle.join().unwrap();
        // The already-connected alice is untouched by the failed session.
        assert!(cp.registry().is_connected("alice"));
        assert!(read_frame(&mut client).is_err());
    }

    #[test]
    fn login_deadline_closes_idle_connection() {
        let cp = processor();
        let running = Arc::new(AtomicBool::new(true));
        let config = SessionConfig {
            auth_timeout: Some(Duration::from_millis(50)),
            ..fast_config()
        };
        let (mut client, handle) = spawn_session(&cp, config, &running);
        handle.join().unwrap();
        assert!(read_frame(&mut client).is_err());
        assert_eq!(cp.registry().account_count(), 0);
    }

    #[test]
    fn login_deadline_bounds_a_stalled_handshake() {
        let cp = processor();
        let running = Arc::new(AtomicBool::new(true));
        let config = SessionConfig {
            auth_timeout: Some(Duration::from_millis(100)),
            ..fast_config()
        };
        let (mut client, handle) = spawn_session(&cp, config, &running);

        // Username arrives, the credential never does.
        write_frame(&mut client, "alice").unwrap();
        let start = Instant::now();
        handle.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(cp.registry().account_count(), 0);
        assert!(read_frame(&mut client).is_err());
    }

    #[test]
    fn login_deadline_bounds_a_partial_prefix() {
        let cp = processor();
        let running = Arc::new(AtomicBool::new(true));
        let config = SessionConfig {
            auth_timeout: Some(Duration::from_millis(100)),
            ..fast_config()
        };
        let (mut client, handle) = spawn_session(&cp, config, &running);

        use std::io::Write;
        client.write_all(&[0, 0]).unwrap();
        handle.join().unwrap();
        assert_eq!(cp.registry().account_count(), 0);
    }

    #[test]
    fn login_deadline_does_not_leak_into_active() {
        let cp = processor();
        let running = Arc::new(AtomicBool::new(true));
        let config = SessionConfig {
            auth_timeout: Some(Duration::from_millis(200)),
            ..fast_config()
        };
        let (mut client, handle) = spawn_session(&cp, config, &running);
        assert_eq!(login(&mut client, "alice", "pw"), LOGIN_SUCCESS);

        // Idle well past the login deadline, then use the session.
        thread::sleep(Duration::from_millis(400));
        write_frame(&mut client, "/users").unwrap();
        assert_eq!(read_frame(&mut client).unwrap(), "Connected Users:\n1. You\n");

        write_frame(&mut client, "/quit").unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn queued_deliveries_are_flushed_as_frames() {
        let cp = processor();
        let running = Arc::new(AtomicBool::new(true));
        let (mut client, handle) = spawn_session(&cp, fast_config(), &running);
        assert_eq!(login(&mut client, "bob", "pw"), LOGIN_SUCCESS);

        // Another user (no socket needed) talks to bob through the processor.
        cp.registry().login(&Username::from("alice"), "pw");
        cp.handle_line(&Username::from("alice"), "/msg bob hello");
        cp.handle_line(&Username::from("alice"), "/poke bob");

        let first = read_frame(&mut client).unwrap();
        assert!(first.contains("pm from alice: hello"), "got {first:?}");
        assert_eq!(read_frame(&mut client).unwrap(), "\nalice has poked you!\n");

        write_frame(&mut client, "/quit").unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn arrival_and_departure_are_announced() {
        let cp = processor();
        cp.registry().login(&Username::from("watcher"), "pw");
        let running = Arc::new(AtomicBool::new(true));
        let (mut client, handle) = spawn_session(&cp, fast_config(), &running);
        assert_eq!(login(&mut client, "alice", "pw"), LOGIN_SUCCESS);
        write_frame(&mut client, "/close").unwrap();
        handle.join().unwrap();

        let seen: Vec<String> = cp
            .queue()
            .drain(&Username::from("watcher"))
            .into_iter()
            .map(|d| d.body)
            .collect();
        assert_eq!(
            seen,
            vec!["alice has connected! :)", "alice has disconnected! :("]
        );
    }

    #[test]
    fn garbage_frame_ends_session_and_logs_out() {
        let cp = processor();
        let running = Arc::new(AtomicBool::new(true));
        let (mut client, handle) = spawn_session(&cp, fast_config(), &running);
        assert_eq!(login(&mut client, "alice", "pw"), LOGIN_SUCCESS);

        // Announce 10 bytes, send 2, hang up.
        use std::io::Write;
        client.write_all(&[0, 0, 0, 10, b'h', b'i']).unwrap();
        drop(client);
        handle.join().unwrap();
        assert!(!cp.registry().is_connected("alice"));
    }

    #[test]
    fn shutdown_flag_ends_active_session() {
        let cp = processor();
        let running = Arc::new(AtomicBool::new(true));
        let (mut client, handle) = spawn_session(&cp, fast_config(), &running);
        assert_eq!(login(&mut client, "alice", "pw"), LOGIN_SUCCESS);

        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
        assert!(!cp.registry().is_connected("alice"));
    }
}

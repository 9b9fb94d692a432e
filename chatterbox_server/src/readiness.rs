// Bounded wait for a socket to become readable.
//
// Active sessions alternate between flushing queued deliveries and waiting
// briefly for client input, so the wait must give up after `timeout` instead
// of blocking in a read. On Unix this is one `poll(2)` on the socket; the
// `pollfd` is built fresh for every call, so nothing carries over between
// iterations. Elsewhere we fall back to `peek` under a temporary read timeout.
//
// "Readable" includes hang-up and error conditions: the caller's next read
// then fails and the session ends through the normal short-read path.

use std::io;
use std::net::TcpStream;
use std::time::Duration;

/// Wait up to `timeout` for `stream` to have input (or to be closed).
/// Returns `Ok(false)` when the timeout expired first.
#[cfg(unix)]
pub fn wait_readable(stream: &TcpStream, timeout: Duration) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let mut fds = libc::pollfd {
        fd: stream.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    // SAFETY: `fds` is one valid, initialized pollfd that lives across the call,
    // and nfds is 1.
    let rc = unsafe { libc::poll(&mut fds, 1, millis) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(rc > 0 && fds.revents != 0)
}

/// Wait up to `timeout` for `stream` to have input (or to be closed).
/// Returns `Ok(false)` when the timeout expired first.
#[cfg(not(unix))]
pub fn wait_readable(stream: &TcpStream, timeout: Duration) -> io::Result<bool> {
    // A zero read timeout is rejected by the platform.
    stream.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
    let mut probe = [0u8; 1];
    let result = match stream.peek(&mut probe) {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            Ok(false)
        }
        Err(e) => Err(e),
    };
    stream.set_read_timeout(None)?;
    result
}

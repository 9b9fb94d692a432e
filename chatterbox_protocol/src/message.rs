// Fixed protocol literals.
//
// The protocol carries free text, so the only vocabulary both sides must agree
// on is the pair of login replies and the lines that end a session. The login
// replies keep their trailing newline; clients print them as-is.

/// Server reply after a successful login or signup.
pub const LOGIN_SUCCESS: &str = "Login Successful!\n";

/// Server reply after a rejected login. The client may retry.
pub const LOGIN_FAILURE: &str = "Login Failed!\n";

/// Chat lines that end the sender's session.
pub const QUIT_COMMANDS: [&str; 2] = ["/quit", "/close"];

/// Result of a login attempt as seen by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginReply {
    Accepted,
    Refused,
}

impl LoginReply {
    /// The literal sent on the wire for this reply.
    pub fn as_wire(self) -> &'static str {
        match self {
            LoginReply::Accepted => LOGIN_SUCCESS,
            LoginReply::Refused => LOGIN_FAILURE,
        }
    }

    /// Interpret a reply frame. Anything other than the success literal is a
    /// refusal.
    pub fn from_wire(text: &str) -> Self {
        if text == LOGIN_SUCCESS {
            LoginReply::Accepted
        } else {
            LoginReply::Refused
        }
    }
}

/// True for `/quit` and `/close`, ignoring surrounding whitespace.
pub fn is_quit_command(line: &str) -> bool {
    QUIT_COMMANDS.contains(&line.trim())
}

// Shared identity type for the chat protocol.
//
// Usernames are the only identity in the system: they key the server's user
// registry, address queued deliveries, and appear verbatim in command lines
// (`/msg bob hi`). A newtype keeps them from being confused with message
// bodies and credentials, which are also plain strings on the wire.

use std::borrow::Borrow;
use std::fmt;

/// A chat username. Case-sensitive, compared byte-for-byte.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Username(String);

impl Username {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A name can be addressed by `/msg <user>` only if it is non-empty and
    /// has no whitespace (the command parser splits on spaces).
    pub fn is_addressable(&self) -> bool {
        !self.0.is_empty() && !self.0.chars().any(char::is_whitespace)
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Username {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for Username {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for Username {
    fn borrow(&self) -> &str {
        &self.0
    }
}

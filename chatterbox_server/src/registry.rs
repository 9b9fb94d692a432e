// User registry: the single source of truth for who exists and who is online.
//
// `UserRegistry` maps each username to an `Account`. Accounts are created on
// first login (first use is signup) and live for the lifetime of the process;
// logging out only clears the connected flag. Every operation takes the one
// internal lock for its whole duration, so readers never observe an account
// half-updated and `list_connected` is a consistent snapshot.
//
// Credentials are never stored as sent. Each account keeps a random 16-byte
// salt and the SHA-256 digest of salt || secret; a login attempt is hashed
// with the stored salt and compared without early exit. The login protocol on
// the wire is unchanged.
//
// The registry is constructed once by the acceptor (`server.rs`) and shared
// with every session thread behind an `Arc`. It never touches the message
// queue; callers that need both take them one after the other.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chatterbox_protocol::Username;
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Result of `UserRegistry::login`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Unknown username: an account was created and marked connected.
    Created,
    /// Known username, correct credential, was offline: now connected.
    Authenticated,
    Rejected(RejectReason),
}

impl LoginOutcome {
    pub fn is_accepted(self) -> bool {
        !matches!(self, LoginOutcome::Rejected(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    BadCredential,
    AlreadyConnected,
    InvalidUsername,
}

/// Why a presence query could not produce a duration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PresenceError {
    #[error("no such user")]
    NotFound,
    #[error("user is not connected")]
    NotConnected,
}

struct Credential {
    salt: [u8; 16],
    digest: [u8; 32],
}

impl Credential {
    fn new(secret: &str) -> Self {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        Self {
            salt,
            digest: salted_digest(&salt, secret),
        }
    }

    fn matches(&self, secret: &str) -> bool {
        let candidate = salted_digest(&self.salt, secret);
        candidate
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn salted_digest(salt: &[u8; 16], secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(secret.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

struct Account {
    credential: Credential,
    connected_since: Instant,
    is_connected: bool,
}

/// Thread-safe map of username to account state.
#[derive(Default)]
pub struct UserRegistry {
    accounts: Mutex<HashMap<Username, Account>>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign up or log in. See `LoginOutcome` for the cases. A username that
    /// is already connected is always rejected, whatever the credential.
    pub fn login(&self, username: &Username, credential: &str) -> LoginOutcome {
        if !username.is_addressable() {
            return LoginOutcome::Rejected(RejectReason::InvalidUsername);
        }

        let mut accounts = self.accounts.lock();
        match accounts.get_mut(username) {
            None => {
                accounts.insert(
                    username.clone(),
                    Account {
                        credential: Credential::new(credential),
                        connected_since: Instant::now(),
                        is_connected: true,
                    },
                );
                LoginOutcome::Created
            }
            Some(account) if account.is_connected => {
                LoginOutcome::Rejected(RejectReason::AlreadyConnected)
            }
            Some(account) => {
                if !account.credential.matches(credential) {
                    return LoginOutcome::Rejected(RejectReason::BadCredential);
                }
                account.is_connected = true;
                account.connected_since = Instant::now();
                LoginOutcome::Authenticated
            }
        }
    }

    /// Mark a user offline. Idempotent; unknown names are ignored.
    pub fn logout(&self, username: &Username) {
        if let Some(account) = self.accounts.lock().get_mut(username) {
            account.is_connected = false;
        }
    }

    pub fn exists(&self, username: &str) -> bool {
        self.accounts.lock().contains_key(username)
    }

    pub fn is_connected(&self, username: &str) -> bool {
        self.accounts
            .lock()
            .get(username)
            .is_some_and(|account| account.is_connected)
    }

    /// Time since the user's current session logged in.
    pub fn connected_duration(&self, username: &str) -> Result<Duration, PresenceError> {
        let accounts = self.accounts.lock();
        let account = accounts.get(username).ok_or(PresenceError::NotFound)?;
        if !account.is_connected {
            return Err(PresenceError::NotConnected);
        }
        Ok(account.connected_since.elapsed())
    }

    /// Snapshot of connected usernames, sorted.
    pub fn list_connected(&self) -> Vec<Username> {
        let mut names: Vec<Username> = self
            .accounts
            .lock()
            .iter()
            .filter(|(_, account)| account.is_connected)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Number of known accounts, connected or not.
    pub fn account_count(&self) -> usize {
        self.accounts.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn name(s: &str) -> Username {
        Username::from(s)
    }

    #[test]
    fn first_login_creates_account() {
        let registry = UserRegistry::new();
        assert_eq!(registry.login(&name("alice"), "pw"), LoginOutcome::Created);
        assert!(registry.exists("alice"));
        assert!(registry.is_connected("alice"));
    }

    #[test]
    fn second_login_while_connected_rejected() {
        let registry = UserRegistry::new();
        registry.login(&name("alice"), "pw");
        assert_eq!(
            registry.login(&name("alice"), "pw"),
            LoginOutcome::Rejected(RejectReason::AlreadyConnected)
        );
        assert_eq!(
            registry.login(&name("alice"), "other"),
            LoginOutcome::Rejected(RejectReason::AlreadyConnected)
        );
    }

    #[test]
    fn logout_then_login_authenticates() {
        let registry = UserRegistry::new();
        registry.login(&name("alice"), "pw");
        registry.logout(&name("alice"));
        assert!(!registry.is_connected("alice"));
        assert!(registry.exists("alice"));
        assert_eq!(
            registry.login(&name("alice"), "pw"),
            LoginOutcome::Authenticated
        );
        assert!(registry.is_connected("alice"));
    }

    #[test]
    fn wrong_credential_rejected_and_stays_offline() {
        let registry = UserRegistry::new();
        registry.login(&name("alice"), "pw");
        registry.logout(&name("alice"));
        assert_eq!(
            registry.login(&name("alice"), "PW"),
            LoginOutcome::Rejected(RejectReason::BadCredential)
        );
        assert!(!registry.is_connected("alice"));
    }

    #[test]
    fn unaddressable_names_rejected_without_account() {
        let registry = UserRegistry::new();
        assert_eq!(
            registry.login(&name(""), "pw"),
            LoginOutcome::Rejected(RejectReason::InvalidUsername)
        );
        assert_eq!(
            registry.login(&name("bob smith"), "pw"),
            LoginOutcome::Rejected(RejectReason::InvalidUsername)
        );
        assert_eq!(registry.account_count(), 0);
    }

    #[test]
    fn logout_is_idempotent_and_ignores_unknown() {
        let registry = UserRegistry::new();
        registry.logout(&name("ghost"));
        assert!(!registry.exists("ghost"));

        registry.login(&name("alice"), "pw");
        registry.logout(&name("alice"));
        registry.logout(&name("alice"));
        assert!(!registry.is_connected("alice"));
    }

    #[test]
    fn connected_duration_cases() {
        let registry = UserRegistry::new();
        assert_eq!(
            registry.connected_duration("nobody"),
            Err(PresenceError::NotFound)
        );

        registry.login(&name("alice"), "pw");
        let uptime = registry.connected_duration("alice").unwrap();
        assert!(uptime < Duration::from_secs(5));

        registry.logout(&name("alice"));
        assert_eq!(
            registry.connected_duration("alice"),
            Err(PresenceError::NotConnected)
        );
    }

    #[test]
    fn list_connected_excludes_offline() {
        let registry = UserRegistry::new();
        for user in ["carol", "alice", "dave", "bob"] {
            registry.login(&name(user), "pw");
        }
        registry.logout(&name("dave"));
        assert_eq!(
            registry.list_connected(),
            vec![name("alice"), name("bob"), name("carol")]
        );
    }

    #[test]
    fn credentials_are_salted() {
        let a = Credential::new("same");
        let b = Credential::new("same");
        assert!(a.matches("same"));
        assert!(b.matches("same"));
        assert!(!a.matches("different"));
        // Independent salts make equal secrets hash differently.
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn concurrent_logins_admit_exactly_one() {
        let registry = Arc::new(UserRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || registry.login(&name("alice"), &format!("pw{i}")))
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|outcome| outcome.is_accepted())
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(registry.account_count(), 1);
    }
}

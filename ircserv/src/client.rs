//! Per-connection client state held in the registry.

use std::collections::HashSet;
use std::fmt;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::irc::Message;

/// Maximum nickname length.
pub const MAX_NICK_LEN: usize = 9;

/// Opaque handle for a connected client. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// A connected client as seen by command handlers.
///
/// The socket itself belongs to the connection task; the session only keeps
/// the sending side of that task's outbound queue.
#[derive(Debug)]
pub struct ClientSession {
    pub id: ClientId,
    pub nick: Option<String>,
    pub user: Option<String>,
    pub realname: Option<String>,
    pub host: String,
    /// PASS accepted.
    pub authenticated: bool,
    /// NICK and USER both done after PASS.
    pub registered: bool,
    /// Lowercased names of joined channels. The channel's member set is authoritative.
    pub channels: HashSet<String>,
    outbound: mpsc::Sender<String>,
}

impl ClientSession {
    pub fn new(id: ClientId, host: String, outbound: mpsc::Sender<String>) -> Self {
        Self {
            id,
            nick: None,
            user: None,
            realname: None,
            host,
            authenticated: false,
            registered: false,
            channels: HashSet::new(),
            outbound,
        }
    }

    pub fn nick_or_star(&self) -> &str {
        self.nick.as_deref().unwrap_or("*")
    }

    /// `nick!user@host`, used as the prefix of relayed messages.
    pub fn hostmask(&self) -> String {
        let nick = self.nick_or_star();
        let user = self.user.as_deref().unwrap_or("*");
        format!("{nick}!{user}@{}", self.host)
    }

    /// Queue a line for the writer task. Best effort: a full or closed queue
    /// drops the line and returns `false`.
    pub fn send(&self, msg: &Message) -> bool {
        match self.outbound.try_send(format!("{msg}\r\n")) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(client = %self.id, "Outbound queue full, dropping line");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(client = %self.id, "Outbound queue closed, dropping line");
                false
            }
        }
    }
}

/// RFC 1459 nickname shape: a letter or special first, then letters, digits,
/// specials or `-`, at most [`MAX_NICK_LEN`] characters.
pub fn is_valid_nickname(nick: &str) -> bool {
    fn is_special(c: char) -> bool {
        matches!(c, '[' | ']' | '\\' | '`' | '_' | '^' | '{' | '|' | '}')
    }

    let mut chars = nick.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    nick.chars().count() <= MAX_NICK_LEN
        && (first.is_ascii_alphabetic() || is_special(first))
        && chars.all(|c| c.is_ascii_alphanumeric() || is_special(c) || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_nicknames() {
        for nick in ["alice", "Bob", "a", "x-1", "[away]", "nine_char", "`tick", "{x}|y"] {
            assert!(is_valid_nickname(nick), "{nick} should be valid");
        }
    }

    #[test]
    fn invalid_nicknames() {
        for nick in ["", "1abc", "-dash", "has space", "toolongnick", "a,b", "a@b", "é"] {
            assert!(!is_valid_nickname(nick), "{nick} should be invalid");
        }
    }

    #[test]
    fn hostmask_before_and_after_registration() {
        let (tx, _rx) = mpsc::channel(4);
        let mut session = ClientSession::new(ClientId::new(7), "10.0.0.1".into(), tx);
        assert_eq!(session.hostmask(), "*!*@10.0.0.1");
        session.nick = Some("alice".into());
        session.user = Some("al".into());
        assert_eq!(session.hostmask(), "alice!al@10.0.0.1");
        assert_eq!(session.id.to_string(), "client-7");
    }

    #[test]
    fn send_is_best_effort() {
        let (tx, mut rx) = mpsc::channel(1);
        let session = ClientSession::new(ClientId::new(1), "h".into(), tx);
        let msg = Message::from_server("ircserv", "PING", vec!["ircserv"]);
        assert!(session.send(&msg));
        assert!(!session.send(&msg));
        assert_eq!(rx.try_recv().unwrap(), ":ircserv PING ircserv\r\n");
        drop(rx);
        assert!(!session.send(&msg));
    }
}

//! Command dispatch.
//!
//! A raw line becomes a [`Command`] through the [`Dispatcher`], whose verb
//! table is built once at startup. Executing a command runs the matching
//! handler against the registry:
//! - [`registration`]: PASS, NICK, USER and the welcome burst
//! - [`channel`]: JOIN, PART, KICK, INVITE, TOPIC, MODE
//! - [`messaging`]: PRIVMSG, NOTICE
//! - [`session`]: PING, PONG, QUIT

mod channel;
mod messaging;
mod registration;
mod session;

pub use session::closing_link;

use std::collections::HashMap;
use std::fmt;

use crate::client::ClientId;
use crate::error::ReplyError;
use crate::irc::Message;
use crate::state::Registry;

/// Every verb this server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Pass,
    Nick,
    User,
    Join,
    Part,
    Privmsg,
    Notice,
    Kick,
    Invite,
    Topic,
    Mode,
    Ping,
    Pong,
    Quit,
}

impl Verb {
    pub const ALL: [Verb; 14] = [
        Verb::Pass,
        Verb::Nick,
        Verb::User,
        Verb::Join,
        Verb::Part,
        Verb::Privmsg,
        Verb::Notice,
        Verb::Kick,
        Verb::Invite,
        Verb::Topic,
        Verb::Mode,
        Verb::Ping,
        Verb::Pong,
        Verb::Quit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Pass => "PASS",
            Verb::Nick => "NICK",
            Verb::User => "USER",
            Verb::Join => "JOIN",
            Verb::Part => "PART",
            Verb::Privmsg => "PRIVMSG",
            Verb::Notice => "NOTICE",
            Verb::Kick => "KICK",
            Verb::Invite => "INVITE",
            Verb::Topic => "TOPIC",
            Verb::Mode => "MODE",
            Verb::Ping => "PING",
            Verb::Pong => "PONG",
            Verb::Quit => "QUIT",
        }
    }

    /// Verbs accepted before registration completes.
    fn allowed_unregistered(self) -> bool {
        matches!(
            self,
            Verb::Pass | Verb::Nick | Verb::User | Verb::Ping | Verb::Pong | Verb::Quit
        )
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the connection should do after a command ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The client quit; close the connection.
    Close,
}

/// Resolves verbs to commands.
#[derive(Debug)]
pub struct Dispatcher {
    table: HashMap<&'static str, Verb>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            table: Verb::ALL.iter().map(|verb| (verb.as_str(), *verb)).collect(),
        }
    }

    /// Tokenize `line` and bind it to `client`.
    ///
    /// Blank lines and unknown verbs yield `None`; the caller drops them.
    /// Any prefix the client sent is discarded.
    pub fn parse(&self, client: ClientId, line: &str) -> Option<Command> {
        let msg = Message::parse(line)?;
        let verb = *self.table.get(msg.command.as_str())?;
        Some(Command {
            client,
            verb,
            params: msg.params,
            trailing: msg.trailing,
        })
    }
}

/// One parsed line, bound to the client that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    client: ClientId,
    verb: Verb,
    params: Vec<String>,
    trailing: bool,
}

impl Command {
    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Run the handler for this verb. Never blocks; errors become numeric
    /// replies to the sender (NOTICE stays silent).
    pub fn execute(&self, reg: &mut Registry) -> Flow {
        let Some(session) = reg.client(self.client) else {
            return Flow::Close;
        };
        if !session.registered && !self.verb.allowed_unregistered() {
            if self.verb != Verb::Notice {
                reg.reply_error(self.client, &ReplyError::NotRegistered);
            }
            return Flow::Continue;
        }

        let id = self.client;
        let params = self.params.as_slice();
        let result = match self.verb {
            Verb::Pass => registration::handle_pass(reg, id, params),
            Verb::Nick => registration::handle_nick(reg, id, params),
            Verb::User => registration::handle_user(reg, id, params, self.trailing),
            Verb::Join => channel::handle_join(reg, id, params),
            Verb::Part => channel::handle_part(reg, id, params),
            Verb::Kick => channel::handle_kick(reg, id, params),
            Verb::Invite => channel::handle_invite(reg, id, params),
            Verb::Topic => channel::handle_topic(reg, id, params),
            Verb::Mode => channel::handle_mode(reg, id, params),
            Verb::Privmsg => messaging::handle_privmsg(reg, id, params, self.trailing),
            Verb::Notice => messaging::handle_notice(reg, id, params),
            Verb::Ping => session::handle_ping(reg, id, params),
            Verb::Pong => Ok(Flow::Continue),
            Verb::Quit => session::handle_quit(reg, id, params),
        };

        match result {
            Ok(flow) => flow,
            Err(err) => {
                if self.verb != Verb::Notice {
                    reg.reply_error(id, &err);
                }
                Flow::Continue
            }
        }
    }
}

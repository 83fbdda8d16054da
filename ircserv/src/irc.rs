//! IRC message grammar, numerics and casemapping.
//!
//! Wire format: `[:prefix] COMMAND [params...] [:trailing]`

use std::fmt;

pub const RPL_WELCOME: &str = "001";
pub const RPL_YOURHOST: &str = "002";
pub const RPL_CREATED: &str = "003";
pub const RPL_MYINFO: &str = "004";
pub const RPL_UMODEIS: &str = "221";
pub const RPL_CHANNELMODEIS: &str = "324";
pub const RPL_NOTOPIC: &str = "331";
pub const RPL_TOPIC: &str = "332";
pub const RPL_INVITING: &str = "341";
pub const RPL_NAMREPLY: &str = "353";
pub const RPL_ENDOFNAMES: &str = "366";

pub const ERR_NOSUCHNICK: &str = "401";
pub const ERR_NOSUCHCHANNEL: &str = "403";
pub const ERR_NOORIGIN: &str = "409";
pub const ERR_NORECIPIENT: &str = "411";
pub const ERR_NONICKNAMEGIVEN: &str = "431";
pub const ERR_ERRONEUSNICKNAME: &str = "432";
pub const ERR_NICKNAMEINUSE: &str = "433";
pub const ERR_USERNOTINCHANNEL: &str = "441";
pub const ERR_NOTONCHANNEL: &str = "442";
pub const ERR_USERONCHANNEL: &str = "443";
pub const ERR_NOTREGISTERED: &str = "451";
pub const ERR_NEEDMOREPARAMS: &str = "461";
pub const ERR_ALREADYREGISTRED: &str = "462";
pub const ERR_PASSWDMISMATCH: &str = "464";
pub const ERR_CHANNELISFULL: &str = "471";
pub const ERR_UNKNOWNMODE: &str = "472";
pub const ERR_INVITEONLYCHAN: &str = "473";
pub const ERR_BADCHANNELKEY: &str = "475";
pub const ERR_CHANOPRIVSNEEDED: &str = "482";

/// A single IRC protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    /// The last parameter was (or must be) introduced by `:`.
    pub trailing: bool,
}

impl Message {
    pub fn new(prefix: Option<String>, command: &str, params: Vec<String>) -> Self {
        Self {
            prefix,
            command: command.to_string(),
            params,
            trailing: false,
        }
    }

    /// A reply originating from this server: `:<server> <command> <params...>`.
    pub fn from_server(server_name: &str, command: &str, params: Vec<&str>) -> Self {
        Self::new(
            Some(server_name.to_string()),
            command,
            params.into_iter().map(str::to_string).collect(),
        )
    }

    /// Force the last parameter onto the wire as a `:` trailing parameter.
    pub fn with_trailing(mut self) -> Self {
        self.trailing = !self.params.is_empty();
        self
    }

    /// Parse one line (terminator already stripped, though stray CR/LF are tolerated).
    ///
    /// Returns `None` for blank lines and lines holding only a prefix.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']).trim_start_matches(' ');
        if rest.is_empty() {
            return None;
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (p, after) = stripped.split_once(' ')?;
            prefix = Some(p.to_string());
            rest = after.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((c, after)) => (c, after.trim_start_matches(' ')),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        let mut trailing = false;
        while !rest.is_empty() {
            if let Some(text) = rest.strip_prefix(':') {
                params.push(text.to_string());
                trailing = true;
                break;
            }
            match rest.split_once(' ') {
                Some((param, after)) => {
                    params.push(param.to_string());
                    rest = after.trim_start_matches(' ');
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
            trailing,
        })
    }
}

impl fmt::Display for Message {
    /// Wire form without the `\r\n` terminator. CR/LF inside parameters become spaces.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            let param = param.replace(['\r', '\n'], " ");
            f.write_str(" ")?;
            if i == last
                && (self.trailing
                    || param.is_empty()
                    || param.contains(' ')
                    || param.starts_with(':'))
            {
                f.write_str(":")?;
            }
            f.write_str(&param)?;
        }
        Ok(())
    }
}

/// RFC 1459 lower-casing: ASCII letters plus `[]\~` → `{}|^`.
pub fn irc_to_lower(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' => '^',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Case-insensitive comparison under RFC 1459 casemapping.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && irc_to_lower(a) == irc_to_lower(b)
}

//! Errors reported back to a client as numeric replies.
//!
//! A handler that rejects a command returns one of these; the dispatcher turns
//! it into `:<server> <numeric> <nick> [args...] :<text>` for the originating
//! client. None of them close the connection.

use crate::irc::{self, Message};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplyError {
    #[error("No such nick/channel")]
    NoSuchNick(String),
    #[error("No such channel")]
    NoSuchChannel(String),
    #[error("No origin specified")]
    NoOrigin,
    #[error("No recipient given ({0})")]
    NoRecipient(&'static str),
    #[error("No nickname given")]
    NoNicknameGiven,
    #[error("Erroneous nickname")]
    ErroneousNickname(String),
    #[error("Nickname is already in use")]
    NicknameInUse(String),
    #[error("They aren't on that channel")]
    UserNotInChannel { nick: String, channel: String },
    #[error("You're not on that channel")]
    NotOnChannel(String),
    #[error("is already on channel")]
    UserOnChannel { nick: String, channel: String },
    #[error("You have not registered")]
    NotRegistered,
    #[error("Not enough parameters")]
    NeedMoreParams(&'static str),
    #[error("You may not reregister")]
    AlreadyRegistered,
    #[error("Password incorrect")]
    PasswordMismatch,
    #[error("Cannot join channel (+l)")]
    ChannelIsFull(String),
    #[error("is unknown mode char to me")]
    UnknownMode(char),
    #[error("Cannot join channel (+i)")]
    InviteOnlyChan(String),
    #[error("Cannot join channel (+k)")]
    BadChannelKey(String),
    #[error("You're not channel operator")]
    ChanOpPrivsNeeded(String),
}

impl ReplyError {
    pub fn numeric(&self) -> &'static str {
        match self {
            Self::NoSuchNick(_) => irc::ERR_NOSUCHNICK,
            Self::NoSuchChannel(_) => irc::ERR_NOSUCHCHANNEL,
            Self::NoOrigin => irc::ERR_NOORIGIN,
            Self::NoRecipient(_) => irc::ERR_NORECIPIENT,
            Self::NoNicknameGiven => irc::ERR_NONICKNAMEGIVEN,
            Self::ErroneousNickname(_) => irc::ERR_ERRONEUSNICKNAME,
            Self::NicknameInUse(_) => irc::ERR_NICKNAMEINUSE,
            Self::UserNotInChannel { .. } => irc::ERR_USERNOTINCHANNEL,
            Self::NotOnChannel(_) => irc::ERR_NOTONCHANNEL,
            Self::UserOnChannel { .. } => irc::ERR_USERONCHANNEL,
            Self::NotRegistered => irc::ERR_NOTREGISTERED,
            Self::NeedMoreParams(_) => irc::ERR_NEEDMOREPARAMS,
            Self::AlreadyRegistered => irc::ERR_ALREADYREGISTRED,
            Self::PasswordMismatch => irc::ERR_PASSWDMISMATCH,
            Self::ChannelIsFull(_) => irc::ERR_CHANNELISFULL,
            Self::UnknownMode(_) => irc::ERR_UNKNOWNMODE,
            Self::InviteOnlyChan(_) => irc::ERR_INVITEONLYCHAN,
            Self::BadChannelKey(_) => irc::ERR_BADCHANNELKEY,
            Self::ChanOpPrivsNeeded(_) => irc::ERR_CHANOPRIVSNEEDED,
        }
    }

    /// Middle parameters between the client's nick and the trailing text.
    fn args(&self) -> Vec<String> {
        match self {
            Self::NoSuchNick(target)
            | Self::ErroneousNickname(target)
            | Self::NicknameInUse(target) => vec![target.clone()],
            Self::NoSuchChannel(channel)
            | Self::NotOnChannel(channel)
            | Self::ChannelIsFull(channel)
            | Self::InviteOnlyChan(channel)
            | Self::BadChannelKey(channel)
            | Self::ChanOpPrivsNeeded(channel) => vec![channel.clone()],
            Self::UserNotInChannel { nick, channel } | Self::UserOnChannel { nick, channel } => {
                vec![nick.clone(), channel.clone()]
            }
            Self::NeedMoreParams(command) => vec![(*command).to_string()],
            Self::UnknownMode(mode) => vec![mode.to_string()],
            Self::NoOrigin
            | Self::NoRecipient(_)
            | Self::NoNicknameGiven
            | Self::NotRegistered
            | Self::AlreadyRegistered
            | Self::PasswordMismatch => Vec::new(),
        }
    }

    /// Render as a numeric reply addressed to `nick` (`*` before registration).
    ///
    /// Echoed client input is cut down to a single middle parameter so the
    /// reply keeps its shape on the wire.
    pub fn to_message(&self, server_name: &str, nick: &str) -> Message {
        let mut params = vec![nick.to_string()];
        params.extend(self.args().iter().map(|arg| middle_param(arg)));
        params.push(self.to_string());
        Message::new(Some(server_name.to_string()), self.numeric(), params).with_trailing()
    }
}

/// First word of `raw`, or `*` when nothing usable is left.
fn middle_param(raw: &str) -> String {
    match raw.split(' ').next() {
        Some(word) if !word.is_empty() && !word.starts_with(':') => word.to_string(),
        _ => "*".to_string(),
    }
}

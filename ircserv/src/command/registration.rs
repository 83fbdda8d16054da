//! Connection registration: PASS, NICK, USER and the welcome burst.

use crate::client::{ClientId, is_valid_nickname};
use crate::config::VERSION;
use crate::error::ReplyError;
use crate::irc::{self, Message};
use crate::state::Registry;

use super::Flow;

/// User modes advertised in RPL_MYINFO. None are implemented beyond the reply.
const USER_MODES: &str = "o";
/// Channel modes advertised in RPL_MYINFO.
const CHANNEL_MODES: &str = "iklot";

pub(super) fn handle_pass(
    reg: &mut Registry,
    id: ClientId,
    params: &[String],
) -> Result<Flow, ReplyError> {
    let Some(password) = params.first() else {
        return Err(ReplyError::NeedMoreParams("PASS"));
    };
    let matches = reg.password_matches(password);
    let Some(session) = reg.client_mut(id) else {
        return Ok(Flow::Close);
    };
    if session.registered {
        return Err(ReplyError::AlreadyRegistered);
    }
    if !matches {
        tracing::info!(client = %id, "Rejected connection password");
        return Err(ReplyError::PasswordMismatch);
    }
    session.authenticated = true;
    tracing::debug!(client = %id, "Password accepted");
    Ok(Flow::Continue)
}

pub(super) fn handle_nick(
    reg: &mut Registry,
    id: ClientId,
    params: &[String],
) -> Result<Flow, ReplyError> {
    let Some(session) = reg.client(id) else {
        return Ok(Flow::Close);
    };
    if !session.authenticated {
        return Err(ReplyError::NotRegistered);
    }
    let nick = match params.first() {
        Some(nick) if !nick.is_empty() => nick.as_str(),
        _ => return Err(ReplyError::NoNicknameGiven),
    };
    if !is_valid_nickname(nick) {
        return Err(ReplyError::ErroneousNickname(nick.to_string()));
    }
    if reg.client_by_nick(nick).is_some_and(|owner| owner != id) {
        return Err(ReplyError::NicknameInUse(nick.to_string()));
    }
    if session.nick.as_deref() == Some(nick) {
        return Ok(Flow::Continue);
    }

    let old_mask = session.hostmask();
    let was_registered = session.registered;
    reg.set_nick(id, nick);

    if was_registered {
        let change = Message::new(Some(old_mask), "NICK", vec![nick.to_string()]);
        reg.send_to(id, &change);
        for peer in reg.peers_of(id) {
            reg.send_to(peer, &change);
        }
        tracing::info!(client = %id, %nick, "Nick changed");
    } else {
        try_complete_registration(reg, id);
    }
    Ok(Flow::Continue)
}

pub(super) fn handle_user(
    reg: &mut Registry,
    id: ClientId,
    params: &[String],
    trailing: bool,
) -> Result<Flow, ReplyError> {
    let Some(session) = reg.client_mut(id) else {
        return Ok(Flow::Close);
    };
    if !session.authenticated {
        return Err(ReplyError::NotRegistered);
    }
    if session.registered {
        return Err(ReplyError::AlreadyRegistered);
    }
    let [username, _mode, _unused, realname] = params else {
        return Err(ReplyError::NeedMoreParams("USER"));
    };
    if !trailing || username.is_empty() {
        return Err(ReplyError::NeedMoreParams("USER"));
    }
    session.user = Some(username.clone());
    session.realname = Some(realname.clone());
    try_complete_registration(reg, id);
    Ok(Flow::Continue)
}

/// Mark the client registered once PASS, NICK and USER are all in, and send
/// the welcome burst. No-op otherwise.
fn try_complete_registration(reg: &mut Registry, id: ClientId) {
    let server_name = reg.server_name().to_string();
    let created = reg.created_at().format("%a %b %e %Y at %H:%M:%S UTC").to_string();
    let Some(session) = reg.client_mut(id) else {
        return;
    };
    if session.registered || !session.authenticated {
        return;
    }
    let (Some(nick), Some(_)) = (session.nick.clone(), session.user.as_ref()) else {
        return;
    };
    session.registered = true;
    let hostmask = session.hostmask();

    let welcome = format!("Welcome to the Internet Relay Network {hostmask}");
    let yourhost = format!("Your host is {server_name}, running version {VERSION}");
    let created = format!("This server was created {created}");
    let burst = [
        Message::from_server(&server_name, irc::RPL_WELCOME, vec![nick.as_str(), welcome.as_str()]),
        Message::from_server(&server_name, irc::RPL_YOURHOST, vec![nick.as_str(), yourhost.as_str()]),
        Message::from_server(&server_name, irc::RPL_CREATED, vec![nick.as_str(), created.as_str()]),
        Message::from_server(
            &server_name,
            irc::RPL_MYINFO,
            vec![nick.as_str(), server_name.as_str(), VERSION, USER_MODES, CHANNEL_MODES],
        ),
    ];
    for msg in &burst {
        session.send(msg);
    }
    tracing::info!(client = %id, %hostmask, "Client registered");
}

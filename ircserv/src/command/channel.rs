//! Channel operations: join, part, kick, invite, topic, mode.

use crate::channel::{is_channel_target, is_valid_channel_name};
use crate::client::ClientId;
use crate::error::ReplyError;
use crate::irc::{self, Message, irc_eq};
use crate::state::Registry;

use super::Flow;

pub(super) fn handle_join(
    reg: &mut Registry,
    id: ClientId,
    params: &[String],
) -> Result<Flow, ReplyError> {
    let targets = match params.first() {
        Some(targets) if !targets.is_empty() => targets,
        _ => return Err(ReplyError::NeedMoreParams("JOIN")),
    };

    if targets == "0" {
        for name in reg.channels_of(id) {
            part_one(reg, id, &name, None);
        }
        return Ok(Flow::Continue);
    }

    let keys: Vec<&str> = params
        .get(1)
        .map(|keys| keys.split(',').collect())
        .unwrap_or_default();

    for (i, name) in targets.split(',').enumerate() {
        if let Err(err) = join_one(reg, id, name, keys.get(i).copied()) {
            reg.reply_error(id, &err);
        }
    }
    Ok(Flow::Continue)
}

fn join_one(
    reg: &mut Registry,
    id: ClientId,
    name: &str,
    supplied_key: Option<&str>,
) -> Result<(), ReplyError> {
    if !is_valid_channel_name(name) {
        return Err(ReplyError::NoSuchChannel(name.to_string()));
    }

    match reg.channel(name) {
        None => {
            reg.create_channel(name, id);
            tracing::info!(client = %id, channel = %name, "Channel created");
        }
        Some(ch) => {
            if ch.is_member(id) {
                return Ok(());
            }
            if let Some(ref key) = ch.key
                && supplied_key != Some(key.as_str())
            {
                return Err(ReplyError::BadChannelKey(ch.name.clone()));
            }
            if ch.invite_only && !ch.is_invited(id) {
                return Err(ReplyError::InviteOnlyChan(ch.name.clone()));
            }
            if ch.is_full() {
                return Err(ReplyError::ChannelIsFull(ch.name.clone()));
            }
            reg.join_channel(name, id);
        }
    }

    let Some(ch) = reg.channel(name) else {
        return Ok(());
    };
    let channel = ch.name.clone();
    let topic = ch.topic.clone();
    let hostmask = reg.client(id).map(|c| c.hostmask()).unwrap_or_default();

    let join = Message::new(Some(hostmask), "JOIN", vec![channel.clone()]);
    reg.broadcast(&channel, &join, None);
    if !topic.is_empty() {
        reg.reply(id, irc::RPL_TOPIC, vec![channel.clone(), topic]);
    }
    send_names(reg, id, &channel);
    Ok(())
}

/// RPL_NAMREPLY + RPL_ENDOFNAMES for one channel, operators prefixed with `@`.
fn send_names(reg: &Registry, id: ClientId, channel: &str) {
    let Some(ch) = reg.channel(channel) else {
        return;
    };
    let names: Vec<String> = ch
        .members()
        .filter_map(|member| {
            let nick = reg.client(member)?.nick.as_deref()?;
            let prefix = if ch.is_operator(member) { "@" } else { "" };
            Some(format!("{prefix}{nick}"))
        })
        .collect();
    let channel = ch.name.as_str();
    let names = names.join(" ");

    let Some(session) = reg.client(id) else {
        return;
    };
    let nick = session.nick_or_star();
    session.send(
        &Message::from_server(
            reg.server_name(),
            irc::RPL_NAMREPLY,
            vec![nick, "=", channel, names.as_str()],
        )
        .with_trailing(),
    );
    session.send(&Message::from_server(
        reg.server_name(),
        irc::RPL_ENDOFNAMES,
        vec![nick, channel, "End of /NAMES list"],
    ));
}

pub(super) fn handle_part(
    reg: &mut Registry,
    id: ClientId,
    params: &[String],
) -> Result<Flow, ReplyError> {
    let targets = match params.first() {
        Some(targets) if !targets.is_empty() => targets,
        _ => return Err(ReplyError::NeedMoreParams("PART")),
    };
    let reason = params.get(1).map(String::as_str);

    for name in targets.split(',') {
        let outcome = match reg.channel(name) {
            None => Err(ReplyError::NoSuchChannel(name.to_string())),
            Some(ch) if !ch.is_member(id) => Err(ReplyError::NotOnChannel(ch.name.clone())),
            Some(_) => Ok(()),
        };
        match outcome {
            Ok(()) => part_one(reg, id, name, reason),
            Err(err) => reg.reply_error(id, &err),
        }
    }
    Ok(Flow::Continue)
}

/// Announce the departure to the whole channel (the leaver included), then
/// drop the membership. The registry deletes the channel if it empties.
fn part_one(reg: &mut Registry, id: ClientId, name: &str, reason: Option<&str>) {
    let Some(channel) = reg.channel(name).map(|ch| ch.name.clone()) else {
        return;
    };
    let hostmask = reg.client(id).map(|c| c.hostmask()).unwrap_or_default();
    let part = match reason {
        Some(reason) => Message::new(
            Some(hostmask),
            "PART",
            vec![channel.clone(), reason.to_string()],
        )
        .with_trailing(),
        None => Message::new(Some(hostmask), "PART", vec![channel.clone()]),
    };
    reg.broadcast(&channel, &part, None);
    reg.leave_channel(&channel, id);
}

pub(super) fn handle_kick(
    reg: &mut Registry,
    id: ClientId,
    params: &[String],
) -> Result<Flow, ReplyError> {
    let [channel_name, target_nick, rest @ ..] = params else {
        return Err(ReplyError::NeedMoreParams("KICK"));
    };
    let ch = reg
        .channel(channel_name)
        .ok_or_else(|| ReplyError::NoSuchChannel(channel_name.clone()))?;
    let channel = ch.name.clone();
    if !ch.is_member(id) {
        return Err(ReplyError::NotOnChannel(channel));
    }
    if !ch.is_operator(id) {
        return Err(ReplyError::ChanOpPrivsNeeded(channel));
    }
    let target = reg
        .client_by_nick(target_nick)
        .ok_or_else(|| ReplyError::NoSuchNick(target_nick.clone()))?;
    if !ch.is_member(target) {
        return Err(ReplyError::UserNotInChannel {
            nick: target_nick.clone(),
            channel,
        });
    }

    let Some(kicker) = reg.client(id) else {
        return Ok(Flow::Close);
    };
    let reason = match rest.first() {
        Some(reason) if !reason.is_empty() => reason.clone(),
        _ => kicker.nick_or_star().to_string(),
    };
    let kicked = reg
        .client(target)
        .and_then(|c| c.nick.clone())
        .unwrap_or_else(|| target_nick.clone());

    let kick = Message::new(
        Some(kicker.hostmask()),
        "KICK",
        vec![channel.clone(), kicked.clone(), reason],
    )
    .with_trailing();
    reg.broadcast(&channel, &kick, None);
    reg.leave_channel(&channel, target);
    tracing::info!(client = %id, %channel, %kicked, "Kicked from channel");
    Ok(Flow::Continue)
}

pub(super) fn handle_invite(
    reg: &mut Registry,
    id: ClientId,
    params: &[String],
) -> Result<Flow, ReplyError> {
    let [target_nick, channel_name, ..] = params else {
        return Err(ReplyError::NeedMoreParams("INVITE"));
    };
    let ch = reg
        .channel(channel_name)
        .ok_or_else(|| ReplyError::NoSuchChannel(channel_name.clone()))?;
    let channel = ch.name.clone();
    if !ch.is_member(id) {
        return Err(ReplyError::NotOnChannel(channel));
    }
    if ch.invite_only && !ch.is_operator(id) {
        return Err(ReplyError::ChanOpPrivsNeeded(channel));
    }
    let target = reg
        .client_by_nick(target_nick)
        .ok_or_else(|| ReplyError::NoSuchNick(target_nick.clone()))?;
    let invited = reg
        .client(target)
        .and_then(|c| c.nick.clone())
        .unwrap_or_else(|| target_nick.clone());
    if ch.is_member(target) {
        return Err(ReplyError::UserOnChannel {
            nick: invited,
            channel,
        });
    }

    if let Some(ch) = reg.channel_mut(&channel) {
        ch.invite(target);
    }
    let inviter = reg.client(id).map(|c| c.hostmask()).unwrap_or_default();
    reg.reply(id, irc::RPL_INVITING, vec![invited.clone(), channel.clone()]);
    reg.send_to(
        target,
        &Message::new(Some(inviter), "INVITE", vec![invited, channel]),
    );
    Ok(Flow::Continue)
}

pub(super) fn handle_topic(
    reg: &mut Registry,
    id: ClientId,
    params: &[String],
) -> Result<Flow, ReplyError> {
    let Some(channel_name) = params.first() else {
        return Err(ReplyError::NeedMoreParams("TOPIC"));
    };
    let ch = reg
        .channel(channel_name)
        .ok_or_else(|| ReplyError::NoSuchChannel(channel_name.clone()))?;
    let channel = ch.name.clone();
    if !ch.is_member(id) {
        return Err(ReplyError::NotOnChannel(channel));
    }

    let Some(new_topic) = params.get(1) else {
        if ch.topic.is_empty() {
            reg.reply(
                id,
                irc::RPL_NOTOPIC,
                vec![channel, "No topic is set".to_string()],
            );
        } else {
            let topic = ch.topic.clone();
            reg.reply(id, irc::RPL_TOPIC, vec![channel, topic]);
        }
        return Ok(Flow::Continue);
    };

    if ch.topic_restricted && !ch.is_operator(id) {
        return Err(ReplyError::ChanOpPrivsNeeded(channel));
    }
    if let Some(ch) = reg.channel_mut(&channel) {
        ch.topic = new_topic.clone();
    }
    let hostmask = reg.client(id).map(|c| c.hostmask()).unwrap_or_default();
    let topic = Message::new(Some(hostmask), "TOPIC", vec![channel.clone(), new_topic.clone()])
        .with_trailing();
    reg.broadcast(&channel, &topic, None);
    Ok(Flow::Continue)
}

pub(super) fn handle_mode(
    reg: &mut Registry,
    id: ClientId,
    params: &[String],
) -> Result<Flow, ReplyError> {
    let Some(target) = params.first() else {
        return Err(ReplyError::NeedMoreParams("MODE"));
    };

    if !is_channel_target(target) {
        let own = reg
            .client(id)
            .and_then(|c| c.nick.as_deref())
            .is_some_and(|nick| irc_eq(nick, target));
        if own {
            reg.reply(id, irc::RPL_UMODEIS, vec!["+".to_string()]);
            return Ok(Flow::Continue);
        }
        return Err(ReplyError::NoSuchChannel(target.clone()));
    }

    let ch = reg
        .channel(target)
        .ok_or_else(|| ReplyError::NoSuchChannel(target.clone()))?;
    let channel = ch.name.clone();
    if !ch.is_member(id) {
        return Err(ReplyError::NotOnChannel(channel));
    }

    let Some(modes) = params.get(1) else {
        let (flags, args) = ch.mode_summary();
        let mut reply = vec![channel, flags];
        reply.extend(args);
        reg.reply(id, irc::RPL_CHANNELMODEIS, reply);
        return Ok(Flow::Continue);
    };

    if !ch.is_operator(id) {
        return Err(ReplyError::ChanOpPrivsNeeded(channel));
    }
    apply_modes(reg, id, &channel, modes, &params[2..]);
    Ok(Flow::Continue)
}

/// A mode that actually changed channel state.
struct ModeChange {
    adding: bool,
    flag: char,
    arg: Option<String>,
}

/// Apply a mode string left to right. Parameters are consumed in order by
/// `+k`, `+l` and `±o` as those flags are reached; `-k` and `-l` take none.
/// Bad flags are reported and skipped. Effective changes go out as one MODE line.
fn apply_modes(reg: &mut Registry, id: ClientId, channel: &str, modes: &str, args: &[String]) {
    let mut args = args.iter();
    let mut adding = true;
    let mut changes: Vec<ModeChange> = Vec::new();
    let mut errors: Vec<ReplyError> = Vec::new();

    for flag in modes.chars() {
        if flag == '+' || flag == '-' {
            adding = flag == '+';
            continue;
        }

        // Resolve any nick argument before borrowing the channel mutably.
        let member = if flag == 'o' {
            match args.next() {
                None => {
                    errors.push(ReplyError::NeedMoreParams("MODE"));
                    continue;
                }
                Some(nick) => match reg.client_by_nick(nick) {
                    None => {
                        errors.push(ReplyError::NoSuchNick(nick.clone()));
                        continue;
                    }
                    Some(target) => {
                        let shown = reg.client(target).and_then(|c| c.nick.clone());
                        Some((target, shown.unwrap_or_else(|| nick.clone())))
                    }
                },
            }
        } else {
            None
        };

        let Some(ch) = reg.channel_mut(channel) else {
            return;
        };
        let change = |arg: Option<String>| ModeChange { adding, flag, arg };

        match flag {
            'i' => {
                if ch.invite_only != adding {
                    ch.invite_only = adding;
                    changes.push(change(None));
                }
            }
            't' => {
                if ch.topic_restricted != adding {
                    ch.topic_restricted = adding;
                    changes.push(change(None));
                }
            }
            'k' if adding => match args.next() {
                Some(key) if !key.is_empty() => {
                    ch.key = Some(key.clone());
                    changes.push(change(Some(key.clone())));
                }
                _ => errors.push(ReplyError::NeedMoreParams("MODE")),
            },
            'k' => {
                if ch.key.take().is_some() {
                    changes.push(change(None));
                }
            }
            'l' if adding => match args.next() {
                Some(raw) => {
                    if let Ok(limit) = raw.parse::<i64>()
                        && limit > 0
                    {
                        let limit = limit as usize;
                        if ch.limit != Some(limit) {
                            ch.limit = Some(limit);
                            changes.push(change(Some(limit.to_string())));
                        }
                    }
                }
                None => errors.push(ReplyError::NeedMoreParams("MODE")),
            },
            'l' => {
                if ch.limit.take().is_some() {
                    changes.push(change(None));
                }
            }
            'o' => {
                let Some((target, shown)) = member else {
                    continue;
                };
                if !ch.is_member(target) {
                    errors.push(ReplyError::UserNotInChannel {
                        nick: shown,
                        channel: ch.name.clone(),
                    });
                } else if ch.set_operator(target, adding) {
                    changes.push(change(Some(shown)));
                }
            }
            other => errors.push(ReplyError::UnknownMode(other)),
        }
    }

    for err in &errors {
        reg.reply_error(id, err);
    }
    if changes.is_empty() {
        return;
    }

    let mut flags = String::new();
    let mut sign = None;
    let mut params = vec![channel.to_string(), String::new()];
    for change in changes {
        if sign != Some(change.adding) {
            flags.push(if change.adding { '+' } else { '-' });
            sign = Some(change.adding);
        }
        flags.push(change.flag);
        params.extend(change.arg);
    }
    params[1] = flags;

    let hostmask = reg.client(id).map(|c| c.hostmask()).unwrap_or_default();
    let mode = Message::new(Some(hostmask), "MODE", params);
    reg.broadcast(channel, &mode, None);
    tracing::debug!(client = %id, %channel, "{mode}");
}

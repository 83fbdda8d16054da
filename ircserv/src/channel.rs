//! Channel state and channel-name grammar.

use std::collections::{BTreeSet, HashSet};

use crate::client::ClientId;

/// Maximum channel name length, prefix included.
pub const MAX_CHANNEL_NAME_LEN: usize = 50;

/// `#` or `&` prefix, 2–50 characters, no space, comma, BEL or other control character.
pub fn is_valid_channel_name(name: &str) -> bool {
    let len = name.chars().count();
    (name.starts_with('#') || name.starts_with('&'))
        && (2..=MAX_CHANNEL_NAME_LEN).contains(&len)
        && !name.chars().any(|c| c == ' ' || c == ',' || c.is_control())
}

pub fn is_channel_target(target: &str) -> bool {
    target.starts_with('#') || target.starts_with('&')
}

/// A live channel. Exists only while it has at least one member.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Spelling used by whoever created the channel.
    pub name: String,
    /// Empty when no topic is set.
    pub topic: String,
    pub key: Option<String>,
    /// `None` means unlimited.
    pub limit: Option<usize>,
    pub invite_only: bool,
    /// +t: only operators may change the topic.
    pub topic_restricted: bool,
    members: BTreeSet<ClientId>,
    operators: HashSet<ClientId>,
    invited: HashSet<ClientId>,
}

impl Channel {
    /// A fresh channel whose creator is its only member and operator.
    pub fn new(name: &str, creator: ClientId) -> Self {
        Self {
            name: name.to_string(),
            topic: String::new(),
            key: None,
            limit: None,
            invite_only: false,
            topic_restricted: false,
            members: BTreeSet::from([creator]),
            operators: HashSet::from([creator]),
            invited: HashSet::new(),
        }
    }

    pub fn is_member(&self, id: ClientId) -> bool {
        self.members.contains(&id)
    }

    pub fn is_operator(&self, id: ClientId) -> bool {
        self.operators.contains(&id)
    }

    pub fn is_invited(&self, id: ClientId) -> bool {
        self.invited.contains(&id)
    }

    pub fn is_full(&self) -> bool {
        self.limit.is_some_and(|limit| self.members.len() >= limit)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Members in join-id order.
    pub fn members(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.members.iter().copied()
    }

    /// Add a member, consuming any pending invite.
    pub fn add_member(&mut self, id: ClientId) {
        self.invited.remove(&id);
        self.members.insert(id);
    }

    /// Drop every trace of `id`: membership, operator status and invite.
    pub fn remove_member(&mut self, id: ClientId) -> bool {
        self.operators.remove(&id);
        self.invited.remove(&id);
        self.members.remove(&id)
    }

    pub fn invite(&mut self, id: ClientId) {
        if !self.is_member(id) {
            self.invited.insert(id);
        }
    }

    /// Drop a pending invite without touching membership.
    pub fn forget_invite(&mut self, id: ClientId) {
        self.invited.remove(&id);
    }

    /// Grant or revoke operator status on a member. Returns whether anything changed.
    pub fn set_operator(&mut self, id: ClientId, grant: bool) -> bool {
        if grant {
            self.is_member(id) && self.operators.insert(id)
        } else {
            self.operators.remove(&id)
        }
    }

    /// Current modes for RPL_CHANNELMODEIS: the flag string, then the key
    /// and limit arguments when those modes are set.
    pub fn mode_summary(&self) -> (String, Vec<String>) {
        let mut flags = String::from("+");
        let mut args = Vec::new();
        if self.invite_only {
            flags.push('i');
        }
        if self.topic_restricted {
            flags.push('t');
        }
        if let Some(ref key) = self.key {
            flags.push('k');
            args.push(key.clone());
        }
        if let Some(limit) = self.limit {
            flags.push('l');
            args.push(limit.to_string());
        }
        (flags, args)
    }
}

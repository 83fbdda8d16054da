//! The registry: sole owner of every client session and channel.
//!
//! Everything outside the registry refers to sessions by [`ClientId`] and to
//! channels by their lowercased name. The server wraps a single `Registry`
//! in a mutex, and each command runs to completion while holding it.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::channel::Channel;
use crate::client::{ClientId, ClientSession};
use crate::error::ReplyError;
use crate::irc::{Message, irc_to_lower};

/// Registry key for a channel name.
pub fn channel_key(name: &str) -> String {
    irc_to_lower(name)
}

#[derive(Debug)]
pub struct Registry {
    server_name: String,
    password: String,
    created_at: DateTime<Utc>,
    clients: HashMap<ClientId, ClientSession>,
    /// lowercased channel name -> channel
    channels: HashMap<String, Channel>,
    /// lowercased nick -> session
    nicks: HashMap<String, ClientId>,
}

impl Registry {
    pub fn new(server_name: &str, password: &str) -> Self {
        Self {
            server_name: server_name.to_string(),
            password: password.to_string(),
            created_at: Utc::now(),
            clients: HashMap::new(),
            channels: HashMap::new(),
            nicks: HashMap::new(),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn password_matches(&self, candidate: &str) -> bool {
        self.password == candidate
    }

    // ── clients ────────────────────────────────────────────────────

    pub fn add_client(&mut self, session: ClientSession) {
        self.clients.insert(session.id, session);
    }

    pub fn client(&self, id: ClientId) -> Option<&ClientSession> {
        self.clients.get(&id)
    }

    pub fn client_mut(&mut self, id: ClientId) -> Option<&mut ClientSession> {
        self.clients.get_mut(&id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Case-insensitive nickname lookup.
    pub fn client_by_nick(&self, nick: &str) -> Option<ClientId> {
        self.nicks.get(&irc_to_lower(nick)).copied()
    }

    /// Point the nick index at `id` under its new nickname.
    pub fn set_nick(&mut self, id: ClientId, nick: &str) {
        let Some(session) = self.clients.get_mut(&id) else {
            return;
        };
        if let Some(old) = session.nick.replace(nick.to_string()) {
            self.nicks.remove(&irc_to_lower(&old));
        }
        self.nicks.insert(irc_to_lower(nick), id);
    }

    // ── channels ───────────────────────────────────────────────────

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&channel_key(name))
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(&channel_key(name))
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Create `name` with `creator` as its sole member and operator.
    pub fn create_channel(&mut self, name: &str, creator: ClientId) {
        let key = channel_key(name);
        if let Some(session) = self.clients.get_mut(&creator) {
            session.channels.insert(key.clone());
        }
        self.channels.insert(key, Channel::new(name, creator));
    }

    /// Add `id` to an existing channel.
    pub fn join_channel(&mut self, name: &str, id: ClientId) {
        let key = channel_key(name);
        if let Some(channel) = self.channels.get_mut(&key) {
            channel.add_member(id);
            if let Some(session) = self.clients.get_mut(&id) {
                session.channels.insert(key);
            }
        }
    }

    /// Remove `id` from a channel, deleting the channel once it is empty.
    pub fn leave_channel(&mut self, name: &str, id: ClientId) {
        let key = channel_key(name);
        if let Some(session) = self.clients.get_mut(&id) {
            session.channels.remove(&key);
        }
        let now_empty = match self.channels.get_mut(&key) {
            Some(channel) => {
                channel.remove_member(id);
                channel.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.channels.remove(&key);
            tracing::debug!(channel = %key, "Channel emptied, removed");
        }
    }

    /// Every client sharing at least one channel with `id`, excluding `id`.
    pub fn peers_of(&self, id: ClientId) -> BTreeSet<ClientId> {
        let Some(session) = self.clients.get(&id) else {
            return BTreeSet::new();
        };
        session
            .channels
            .iter()
            .filter_map(|key| self.channels.get(key))
            .flat_map(|channel| channel.members())
            .filter(|member| *member != id)
            .collect()
    }

    /// Names of the channels `id` is in, in registry-key order.
    pub fn channels_of(&self, id: ClientId) -> Vec<String> {
        let mut names: Vec<String> = self
            .clients
            .get(&id)
            .map(|session| session.channels.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    // ── delivery ───────────────────────────────────────────────────

    pub fn send_to(&self, id: ClientId, msg: &Message) {
        if let Some(session) = self.clients.get(&id) {
            session.send(msg);
        }
    }

    /// Reply from the server to `id` with a numeric error.
    pub fn reply_error(&self, id: ClientId, err: &ReplyError) {
        if let Some(session) = self.clients.get(&id) {
            tracing::debug!(client = %id, numeric = err.numeric(), "{err}");
            session.send(&err.to_message(&self.server_name, session.nick_or_star()));
        }
    }

    /// Reply from the server to `id`; `params` follow the client's nick.
    pub fn reply(&self, id: ClientId, command: &str, params: Vec<String>) {
        if let Some(session) = self.clients.get(&id) {
            let mut all = vec![session.nick_or_star().to_string()];
            all.extend(params);
            session.send(&Message::new(Some(self.server_name.clone()), command, all));
        }
    }

    /// Send `msg` to every member of `name`, optionally skipping one client.
    /// A failed send to one member never stops delivery to the rest.
    pub fn broadcast(&self, name: &str, msg: &Message, except: Option<ClientId>) {
        let Some(channel) = self.channels.get(&channel_key(name)) else {
            return;
        };
        for member in channel.members() {
            if Some(member) != except {
                self.send_to(member, msg);
            }
        }
    }

    /// Tear a client down: tell everyone sharing a channel with it that it
    /// quit, drop it from every channel (deleting emptied ones), forget any
    /// pending invites and release its nickname. Returns the removed
    /// session, or `None` if it was already gone.
    pub fn remove_client(&mut self, id: ClientId, reason: &str) -> Option<ClientSession> {
        let session = self.clients.get(&id)?;
        if session.nick.is_some() {
            let quit = Message::new(Some(session.hostmask()), "QUIT", vec![reason.to_string()])
                .with_trailing();
            for peer in self.peers_of(id) {
                self.send_to(peer, &quit);
            }
        }
        for key in self.channels_of(id) {
            self.leave_channel(&key, id);
        }
        for channel in self.channels.values_mut() {
            channel.forget_invite(id);
        }
        let session = self.clients.remove(&id)?;
        if let Some(ref nick) = session.nick {
            let key = irc_to_lower(nick);
            if self.nicks.get(&key) == Some(&id) {
                self.nicks.remove(&key);
            }
        }
        Some(session)
    }
}

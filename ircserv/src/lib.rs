//! A single-process IRC server.
//!
//! Clients connect over plain TCP, authenticate with a shared password and
//! register with NICK/USER, then chat in channels with operator-controlled
//! modes (`+i`, `+t`, `+k`, `+l`, `+o`).

pub mod channel;
pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod irc;
pub mod server;
pub mod state;

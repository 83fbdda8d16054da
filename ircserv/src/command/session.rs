//! Keepalive and disconnect: PING, QUIT.

use crate::client::ClientId;
use crate::error::ReplyError;
use crate::irc::Message;
use crate::state::Registry;

use super::Flow;

const DEFAULT_QUIT_REASON: &str = "Client Quit";

pub(super) fn handle_ping(
    reg: &mut Registry,
    id: ClientId,
    params: &[String],
) -> Result<Flow, ReplyError> {
    let token = match params.first() {
        Some(token) if !token.is_empty() => token,
        _ => return Err(ReplyError::NoOrigin),
    };
    let server_name = reg.server_name();
    let pong = Message::from_server(server_name, "PONG", vec![server_name, token.as_str()])
        .with_trailing();
    reg.send_to(id, &pong);
    Ok(Flow::Continue)
}

/// Say goodbye to the client, then tear its session down. Peers hear the
/// QUIT from [`Registry::remove_client`].
pub(super) fn handle_quit(
    reg: &mut Registry,
    id: ClientId,
    params: &[String],
) -> Result<Flow, ReplyError> {
    let reason = match params.first() {
        Some(reason) if !reason.is_empty() => reason.as_str(),
        _ => DEFAULT_QUIT_REASON,
    };
    if let Some(session) = reg.client(id) {
        session.send(&closing_link(&session.host, reason));
    }
    reg.remove_client(id, reason);
    tracing::info!(client = %id, %reason, "Client quit");
    Ok(Flow::Close)
}

/// `ERROR :Closing Link: <host> (<reason>)`, the last line a client sees.
pub fn closing_link(host: &str, reason: &str) -> Message {
    Message::new(None, "ERROR", vec![format!("Closing Link: {host} ({reason})")]).with_trailing()
}

//! PRIVMSG and NOTICE relay.

use crate::channel::is_channel_target;
use crate::client::ClientId;
use crate::error::ReplyError;
use crate::irc::Message;
use crate::state::Registry;

use super::Flow;

pub(super) fn handle_privmsg(
    reg: &mut Registry,
    id: ClientId,
    params: &[String],
    trailing: bool,
) -> Result<Flow, ReplyError> {
    let [target, text] = params else {
        return Err(ReplyError::NoRecipient("PRIVMSG"));
    };
    if !trailing {
        return Err(ReplyError::NoRecipient("PRIVMSG"));
    }
    relay(reg, id, "PRIVMSG", target, text)?;
    Ok(Flow::Continue)
}

/// Same routing as PRIVMSG. The dispatcher swallows any error.
pub(super) fn handle_notice(
    reg: &mut Registry,
    id: ClientId,
    params: &[String],
) -> Result<Flow, ReplyError> {
    let [target, text, ..] = params else {
        return Err(ReplyError::NoRecipient("NOTICE"));
    };
    relay(reg, id, "NOTICE", target, text)?;
    Ok(Flow::Continue)
}

fn relay(
    reg: &Registry,
    id: ClientId,
    verb: &str,
    target: &str,
    text: &str,
) -> Result<(), ReplyError> {
    let hostmask = reg.client(id).map(|c| c.hostmask()).unwrap_or_default();

    if is_channel_target(target) {
        let ch = reg
            .channel(target)
            .ok_or_else(|| ReplyError::NoSuchChannel(target.to_string()))?;
        if !ch.is_member(id) {
            return Err(ReplyError::NotOnChannel(ch.name.clone()));
        }
        let msg = Message::new(
            Some(hostmask),
            verb,
            vec![ch.name.clone(), text.to_string()],
        )
        .with_trailing();
        reg.broadcast(&ch.name, &msg, Some(id));
        tracing::debug!(client = %id, channel = %ch.name, %verb, "Relayed to channel");
        return Ok(());
    }

    let recipient = reg
        .client_by_nick(target)
        .and_then(|rid| reg.client(rid))
        .ok_or_else(|| ReplyError::NoSuchNick(target.to_string()))?;
    let nick = recipient.nick_or_star().to_string();
    let msg = Message::new(Some(hostmask), verb, vec![nick, text.to_string()]).with_trailing();
    recipient.send(&msg);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::command::tests::run;
    use crate::state::test_support::*;

    fn numerics(lines: &[String]) -> Vec<&str> {
        lines
            .iter()
            .filter_map(|line| line.split(' ').nth(1))
            .collect()
    }

    #[test]
    fn channel_message_reaches_everyone_but_sender() {
        let mut reg = registry();
        let mut alice = registered(&mut reg, 1, "alice");
        let mut bob = registered(&mut reg, 2, "bob");
        let mut carol = registered(&mut reg, 3, "carol");
        let mut outsider = registered(&mut reg, 4, "dave");
        for client in [&alice, &bob, &carol] {
            run(&mut reg, client, "JOIN #Rust");
        }
        alice.drain();
        bob.drain();
        carol.drain();

        run(&mut reg, &alice, "PRIVMSG #rust :hello, world");
        let expected = vec![":alice!alice@127.0.0.1 PRIVMSG #Rust :hello, world".to_string()];
        assert!(alice.drain().is_empty());
        assert_eq!(bob.drain(), expected);
        assert_eq!(carol.drain(), expected);
        assert!(outsider.drain().is_empty());
    }

    #[test]
    fn private_message_to_nick() {
        let mut reg = registry();
        let mut alice = registered(&mut reg, 1, "alice");
        let mut bob = registered(&mut reg, 2, "Bob");
        run(&mut reg, &alice, "PRIVMSG BOB :psst");
        assert!(alice.drain().is_empty());
        assert_eq!(bob.drain(), vec![":alice!alice@127.0.0.1 PRIVMSG Bob :psst"]);
    }

    #[test]
    fn privmsg_errors() {
        let mut reg = registry();
        let mut alice = registered(&mut reg, 1, "alice");
        let bob = registered(&mut reg, 2, "bob");
        run(&mut reg, &bob, "JOIN #busy");

        run(&mut reg, &alice, "PRIVMSG");
        run(&mut reg, &alice, "PRIVMSG bob");
        run(&mut reg, &alice, "PRIVMSG bob hello");
        run(&mut reg, &alice, "PRIVMSG #nowhere :hi");
        run(&mut reg, &alice, "PRIVMSG #busy :hi");
        run(&mut reg, &alice, "PRIVMSG ghost :hi");
        assert_eq!(
            numerics(&alice.drain()),
            vec!["411", "411", "411", "403", "442", "401"]
        );
    }

    #[test]
    fn no_recipient_text() {
        let mut reg = registry();
        let mut alice = registered(&mut reg, 1, "alice");
        run(&mut reg, &alice, "PRIVMSG");
        assert_eq!(
            alice.drain(),
            vec![":ircserv 411 alice :No recipient given (PRIVMSG)"]
        );
    }

    #[test]
    fn notice_is_relayed_but_never_answered() {
        let mut reg = registry();
        let mut alice = registered(&mut reg, 1, "alice");
        let mut bob = registered(&mut reg, 2, "bob");
        run(&mut reg, &bob, "JOIN #quiet");
        bob.drain();

        run(&mut reg, &alice, "NOTICE bob plain");
        assert_eq!(bob.drain(), vec![":alice!alice@127.0.0.1 NOTICE bob :plain"]);

        run(&mut reg, &alice, "NOTICE");
        run(&mut reg, &alice, "NOTICE ghost :hi");
        run(&mut reg, &alice, "NOTICE #quiet :hi");
        run(&mut reg, &alice, "NOTICE #none :hi");
        assert!(alice.drain().is_empty());
        assert!(bob.drain().is_empty());
    }

    #[test]
    fn unregistered_privmsg_is_refused() {
        let mut reg = registry();
        let mut stranger = connect(&mut reg, 1);
        let mut bob = registered(&mut reg, 2, "bob");
        run(&mut reg, &stranger, "PRIVMSG bob :hi");
        assert_eq!(numerics(&stranger.drain()), vec!["451"]);
        assert!(bob.drain().is_empty());
    }
}

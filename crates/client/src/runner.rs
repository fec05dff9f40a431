//! Event loop gluing user actions and transport events onto one client.

use tokio::sync::mpsc;
use tracing::debug;

use memora_transport::ChannelEvents;

use crate::client::{ChatChannel, ConversationClient, PhotoContext};

/// User intents fed into [`drive`].
#[derive(Debug)]
pub enum Action {
    StartSession(Vec<PhotoContext>),
    SendMessage(String),
    EndSession,
    SelectPhoto(usize),
    /// Stop the loop and hand the client back for inspection.
    Shutdown,
}

/// Runs the client until [`Action::Shutdown`] arrives or both input streams
/// close, then returns the client in its final state.
///
/// Status transitions, inbound frames, and actions are serialized here, so
/// the state machine itself never needs interior locking.
pub async fn drive<C: ChatChannel>(
    mut client: ConversationClient<C>,
    mut events: ChannelEvents,
    mut actions: mpsc::UnboundedReceiver<Action>,
) -> ConversationClient<C> {
    let mut status_open = true;
    let mut inbound_open = true;
    let mut actions_open = true;
    loop {
        if !status_open && !inbound_open && !actions_open {
            debug!(target: "chat.session", "all inputs closed; stopping");
            return client;
        }
        tokio::select! {
            changed = events.status.changed(), if status_open => {
                match changed {
                    Ok(()) => {
                        let status = *events.status.borrow_and_update();
                        client.on_status(status);
                    }
                    Err(_) => status_open = false,
                }
            }
            frame = events.inbound.recv(), if inbound_open => {
                match frame {
                    Some(frame) => client.on_event(frame),
                    None => inbound_open = false,
                }
            }
            action = actions.recv(), if actions_open => {
                match action {
                    Some(Action::StartSession(photos)) => client.start_session(photos),
                    Some(Action::SendMessage(text)) => client.send_message(&text),
                    Some(Action::EndSession) => client.end_session(),
                    Some(Action::SelectPhoto(index)) => client.select_photo(index),
                    Some(Action::Shutdown) => {
                        debug!(target: "chat.session", "shutdown requested");
                        return client;
                    }
                    None => actions_open = false,
                }
            }
        }
    }
}

use tokio::sync::mpsc;

use crate::common::events::names;
use crate::common::{InboundEvent, ParticipantId};
use crate::network::Socket;
use crate::network::transport::HandlerId;

/// One consumer's presence on the shared socket.
///
/// Created on mount: registers the consumer's handlers and joins the room of
/// the local participant id. Dropped on unmount, on whatever path: removes
/// exactly the handlers it added and leaves the room. The socket re-announces
/// joined rooms after a reconnect.
pub struct Membership {
    socket: Socket,
    participant: ParticipantId,
    registrations: Vec<(&'static str, HandlerId)>,
}

impl Membership {
    /// Joins and forwards this view's events, in arrival order, to `events`.
    pub fn join(
        socket: &Socket,
        participant: ParticipantId,
        events: mpsc::UnboundedSender<InboundEvent>,
    ) -> Self {
        let mut registrations = Vec::with_capacity(3);

        let tx = events.clone();
        registrations.push((
            names::NEW_MESSAGE,
            socket.on(names::NEW_MESSAGE, move |payload| {
                if let Some(event) = InboundEvent::new_message(payload) {
                    let _ = tx.send(event);
                }
            }),
        ));

        let tx = events.clone();
        registrations.push((
            names::CONNECT_ERROR,
            socket.on(names::CONNECT_ERROR, move |payload| {
                let _ = tx.send(InboundEvent::connect_error(payload));
            }),
        ));

        registrations.push((
            names::CONNECT,
            socket.on(names::CONNECT, move |_| {
                let _ = events.send(InboundEvent::Connected);
            }),
        ));

        socket.join_room(participant.as_str());
        log::info!("Joined messaging room as {participant}");

        Self {
            socket: socket.clone(),
            participant,
            registrations,
        }
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        for (event, id) in self.registrations.drain(..) {
            self.socket.off(event, id);
        }
        self.socket.leave_room(self.participant.as_str());
        log::info!(
            "Left messaging room as {} ({} local members remain)",
            self.participant,
            self.socket.room_members(self.participant.as_str())
        );
    }
}

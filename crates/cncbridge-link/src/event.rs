//! Controller events and the broadcast dispatcher that fans them out to
//! listeners (an ambient addition: UIs and loggers both want to observe the
//! session without being in its call path).

use cncbridge_core::{CNCPoint, Error};
use tokio::sync::broadcast;

use crate::session::LinkState;

/// Something the session controller wants to tell observers about.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// The link state machine transitioned.
    StateChanged {
        /// The state it left.
        from: LinkState,
        /// The state it entered.
        to: LinkState,
    },
    /// A fresh machine-coordinate position was parsed from a status report.
    PositionUpdated(CNCPoint),
    /// A raw line arrived from the controller, before demultiplexing.
    LineReceived(String),
    /// The controller reported an alarm or error that did not abort the session.
    Fault(String),
    /// File-transfer progress, `0.0..=1.0`.
    TransferProgress(f32),
    /// A background operation failed.
    Error(String),
}

impl ControllerEvent {
    pub(crate) fn from_error(err: &Error) -> Self {
        ControllerEvent::Error(err.to_string())
    }
}

/// Default channel capacity; slow subscribers lose the oldest events rather
/// than applying backpressure to the session's own read loop.
const CHANNEL_CAPACITY: usize = 256;

/// A broadcast hub for [`ControllerEvent`]s. Cloning it is cheap and shares
/// the same underlying channel; every clone's subscribers see every event.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<ControllerEvent>,
}

impl EventDispatcher {
    /// Create a new dispatcher with no subscribers yet.
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to future events; past events are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of subscribers it was delivered
    /// to; `0` is not an error, it just means nobody is listening right now.
    pub fn publish(&self, event: ControllerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let dispatcher = EventDispatcher::new();
        let mut rx = dispatcher.subscribe();
        dispatcher.publish(ControllerEvent::Fault("ALARM:1".to_string()));
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ControllerEvent::Fault(msg) if msg == "ALARM:1"));
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let dispatcher = EventDispatcher::new();
        assert_eq!(dispatcher.publish(ControllerEvent::LineReceived("ok".to_string())), 0);
    }
}

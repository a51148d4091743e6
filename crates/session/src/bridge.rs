use chatlink_widget::{ChatDelegate, ChatNotification, WidgetError};
use tokio::sync::mpsc;

use super::state::SessionGeneration;

/// Widget callback after it has been marshalled onto the session's context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegateEvent {
    Loaded,
    Opened,
    Closed,
    Error(WidgetError),
    Notification(ChatNotification),
}

impl DelegateEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Opened => "opened",
            Self::Closed => "closed",
            Self::Error(_) => "error",
            Self::Notification(_) => "notification",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RoutedEvent {
    pub(crate) generation: SessionGeneration,
    pub(crate) event: DelegateEvent,
}

pub(crate) type RoutedEventSender = mpsc::UnboundedSender<RoutedEvent>;
pub(crate) type RoutedEventReceiver = mpsc::UnboundedReceiver<RoutedEvent>;

/// Delegate the session installs on each widget handle.
///
/// The runtime may call it from any thread, so it only tags the callback with the
/// handle's generation and queues it; the session applies it on its own context.
pub(crate) struct DelegateBridge {
    generation: SessionGeneration,
    events: RoutedEventSender,
}

impl DelegateBridge {
    pub(crate) fn new(generation: SessionGeneration, events: RoutedEventSender) -> Self {
        Self { generation, events }
    }

    fn forward(&self, event: DelegateEvent) {
        let name = event.name();
        let routed = RoutedEvent {
            generation: self.generation,
            event,
        };
        if self.events.send(routed).is_err() {
            tracing::debug!(
                generation = %self.generation,
                event = name,
                "session is gone; dropping widget callback"
            );
        }
    }
}

impl ChatDelegate for DelegateBridge {
    fn did_load(&self) {
        self.forward(DelegateEvent::Loaded);
    }

    fn did_open(&self) {
        self.forward(DelegateEvent::Opened);
    }

    fn did_close(&self) {
        self.forward(DelegateEvent::Closed);
    }

    fn did_receive_error(&self, error: &WidgetError) {
        self.forward(DelegateEvent::Error(error.clone()));
    }

    fn did_receive_notification(&self, notification: &ChatNotification) {
        self.forward(DelegateEvent::Notification(notification.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callbacks_are_tagged_with_generation() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let bridge = DelegateBridge::new(SessionGeneration::new(7), sender);

        bridge.did_open();
        bridge.did_receive_notification(&ChatNotification::new("n-1"));

        let first = receiver.try_recv().expect("queued open");
        assert_eq!(first.generation, SessionGeneration::new(7));
        assert_eq!(first.event, DelegateEvent::Opened);

        let second = receiver.try_recv().expect("queued notification");
        assert_eq!(
            second.event,
            DelegateEvent::Notification(ChatNotification::new("n-1"))
        );
    }

    #[test]
    fn callbacks_after_session_drop_are_swallowed() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let bridge = DelegateBridge::new(SessionGeneration::new(1), sender);
        drop(receiver);

        bridge.did_load();
        bridge.did_receive_error(&WidgetError::runtime("socket closed"));
    }
}

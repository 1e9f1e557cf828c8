use std::sync::mpsc::{self, Receiver, Sender};

/// Typed fan-out channel for component events.
///
/// Each [`subscribe`](Self::subscribe) call hands back its own receiver; an
/// emitted event is cloned into every live receiver. Dropped receivers are
/// pruned on the next emit.
#[derive(Debug)]
pub struct EventBus<E: Clone> {
    subscribers: Vec<Sender<E>>,
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<E> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event: E) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

/// Collect whatever is currently queued on a receiver.
pub fn drain<E>(receiver: &Receiver<E>) -> Vec<E> {
    receiver.try_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listener_sees_each_event() {
        let mut bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();
        bus.emit(7u32);
        bus.emit(9u32);
        assert_eq!(drain(&first), vec![7, 9]);
        assert_eq!(drain(&second), vec![7, 9]);
    }

    #[test]
    fn emit_survives_dropped_listeners() {
        let mut bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        bus.emit("focus".to_string());
        bus.emit("blur".to_string());
        assert_eq!(
            drain(&kept),
            vec!["focus".to_string(), "blur".to_string()]
        );
    }
}

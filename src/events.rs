//! Subscriber lists used to raise events to any number of listeners.
//!
//! Every subscriber gets its own unbounded channel, so a slow listener never
//! blocks the publisher and events are never dropped while the receiver lives.
//! Publishing clones the sender list first and sends after the lock is released.

use parking_lot::Mutex;
use tokio::sync::mpsc;

pub struct Subscribers<T> {
    senders: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T: Clone> Subscribers<T> {
    pub fn new() -> Self {
        Subscribers {
            senders: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().push(tx);
        rx
    }

    /// Delivers `event` to every live subscriber. Returns how many received it.
    pub fn publish(&self, event: T) -> usize {
        let senders: Vec<mpsc::UnboundedSender<T>> = {
            let mut senders = self.senders.lock();
            senders.retain(|tx| !tx.is_closed());
            senders.clone()
        };

        senders
            .iter()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    pub fn len(&self) -> usize {
        let mut senders = self.senders.lock();
        senders.retain(|tx| !tx.is_closed());
        senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.senders.lock().clear();
    }
}

impl<T: Clone> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

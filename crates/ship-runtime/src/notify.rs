//! Notification sinks.

use ship_core::Notifier;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::info;

/// Forwards messages to the active `tracing` subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&mut self, message: &str) {
        info!(target: "shipping::notify", "{message}");
    }
}

/// Keeps messages in memory. Clones share one log, so a caller can hand a
/// clone to the lifecycle and read it back later.
#[derive(Clone, Debug, Default)]
pub struct MessageLog {
    messages: Rc<RefCell<Vec<String>>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }

    /// Drain everything logged so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }
}

impl Notifier for MessageLog {
    fn notify(&mut self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_log() {
        let log = MessageLog::new();
        let mut sink = log.clone();
        sink.notify("first");
        sink.notify("second");
        assert_eq!(log.messages(), vec!["first", "second"]);
        assert_eq!(log.take().len(), 2);
        assert!(log.is_empty());
    }
}

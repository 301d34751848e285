//! File-change notification.
//!
//! Thin publish/subscribe channel the VFS core feeds after successful
//! operations. Subscribers run synchronously on the publishing thread;
//! the core publishes after releasing its state lock, so a callback may
//! call back into the filesystem.

use parking_lot::Mutex;

/// Kind of file-change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEvent {
    /// A file was opened.
    Opened,
    /// An open file was closed.
    Closed,
    /// An open file's contents were written.
    Modified,
    /// A file or directory was created.
    Created,
    /// A file or directory was removed.
    Removed,
    /// A file or directory was renamed (path is the new name).
    Renamed,
}

/// Subscription identifier returned by [`Notifier::subscribe`].
pub type SubscriberId = u64;

type Callback = Box<dyn Fn(&str, FileEvent) + Send + Sync>;

/// File-change event fan-out.
pub struct Notifier {
    subscribers: Mutex<Vec<(SubscriberId, Callback)>>,
    next_id: Mutex<SubscriberId>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    /// Create a notifier with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    /// Register a callback for all file events.
    pub fn subscribe(&self, callback: impl Fn(&str, FileEvent) + Send + Sync + 'static) -> SubscriberId {
        let mut next = self.next_id.lock();
        let id = *next;
        *next += 1;
        self.subscribers.lock().push((id, Box::new(callback)));
        id
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.lock().retain(|(sid, _)| *sid != id);
    }

    /// Deliver an event to every subscriber.
    pub fn publish(&self, path: &str, event: FileEvent) {
        for (_, callback) in self.subscribers.lock().iter() {
            callback(path, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn events_reach_subscribers_until_unsubscribed() {
        let notifier = Notifier::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let id = notifier.subscribe(move |path, event| {
            assert_eq!(path, "/sys/a");
            assert_eq!(event, FileEvent::Created);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        notifier.publish("/sys/a", FileEvent::Created);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        notifier.unsubscribe(id);
        notifier.publish("/sys/a", FileEvent::Created);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{BookedSetChange, BusinessDay};

const CHANNEL_CAPACITY: usize = 256;

/// A booked-set change on one business day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub day: BusinessDay,
    pub change: BookedSetChange,
}

/// Broadcast hub for booked-set changes, per business day plus a firehose.
/// Sending never waits on receivers; lagging receivers lose the oldest messages.
pub struct NotifyHub {
    channels: DashMap<BusinessDay, broadcast::Sender<Notification>>,
    all: broadcast::Sender<Notification>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            all: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to changes for one business day. Creates the channel if needed.
    pub fn subscribe(&self, day: BusinessDay) -> broadcast::Receiver<Notification> {
        let sender = self
            .channels
            .entry(day)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Subscribe to changes on every business day.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Notification> {
        self.all.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, day: &BusinessDay, change: BookedSetChange) {
        let notification = Notification {
            day: day.clone(),
            change,
        };
        if let Some(sender) = self.channels.get(day) {
            let _ = sender.send(notification.clone());
        }
        let _ = self.all.send(notification);
    }

    /// Drop channels whose subscribers have all gone away.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookedSlot, TimeOfDay};
    use chrono::NaiveDate;

    fn day(n: u32) -> BusinessDay {
        BusinessDay::new("b1".into(), NaiveDate::from_ymd_opt(2026, 10, n).unwrap())
    }

    fn added() -> BookedSetChange {
        BookedSetChange::Added {
            slot: BookedSlot::new(TimeOfDay::new(10, 0).unwrap(), 60),
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(day(19));
        hub.send(&day(19), added());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.day, day(19));
        assert_eq!(received.change, added());
    }

    #[tokio::test]
    async fn other_days_are_not_delivered() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(day(19));
        hub.send(&day(20), added());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn firehose_sees_everything() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe_all();
        hub.send(&day(19), added());
        hub.send(&day(20), BookedSetChange::Refreshed);
        assert_eq!(rx.recv().await.unwrap().day, day(19));
        assert_eq!(rx.recv().await.unwrap().change, BookedSetChange::Refreshed);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(&day(19), BookedSetChange::Refreshed);
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn prune_drops_abandoned_channels() {
        let hub = NotifyHub::new();
        let rx = hub.subscribe(day(19));
        let _keep = hub.subscribe(day(20));
        drop(rx);
        hub.prune();
        assert_eq!(hub.channel_count(), 1);
    }
}

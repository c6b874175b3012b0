use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::feed::FeedSnapshot;
use crate::models::message::Side;
use crate::services::conversation_service::ConversationService;

/// Backend for the local "new message" cue. The UI layer supplies the real
/// audio/visual implementation.
pub trait AlertSink: Send + Sync {
    fn alert(&self);
}

/// Default sink: an info line, nothing more.
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self) {
        tracing::info!("unread count increased, playing notification cue");
    }
}

/// Edge detector over successive unread totals. Fires only on a strict
/// increase, and never on the first observation: there is no baseline to
/// compare against at startup.
pub struct UnreadAlertTrigger {
    sink: Arc<dyn AlertSink>,
    last_total: Option<usize>,
}

impl UnreadAlertTrigger {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            sink,
            last_total: None,
        }
    }

    pub fn observe(&mut self, total: usize) {
        if let Some(previous) = self.last_total {
            if total > previous {
                self.sink.alert();
            }
        }
        self.last_total = Some(total);
    }
}

/// Pump a feed's snapshots into the trigger. The unread total is recomputed
/// from each snapshot's message set, never carried forward. Aborting (or
/// dropping) the returned handle releases the sink.
pub fn spawn_feed_alerts(
    mut rx: watch::Receiver<FeedSnapshot>,
    viewer_side: Side,
    sink: Arc<dyn AlertSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut trigger = UnreadAlertTrigger::new(sink);
        let initial = {
            let snapshot = rx.borrow_and_update();
            ConversationService::unread_in(&snapshot.messages, viewer_side)
        };
        trigger.observe(initial);

        while rx.changed().await.is_ok() {
            let total = {
                let snapshot = rx.borrow_and_update();
                ConversationService::unread_in(&snapshot.messages, viewer_side)
            };
            trigger.observe(total);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(AtomicUsize);

    impl AlertSink for CountingSink {
        fn alert(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fires_only_on_strict_increases() {
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let mut trigger = UnreadAlertTrigger::new(sink.clone());
        for total in [0, 2, 2, 5, 3] {
            trigger.observe(total);
        }
        // 0 -> 2 and 2 -> 5 fire; 2 -> 2 and 5 -> 3 do not.
        assert_eq!(sink.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn first_observation_is_a_baseline_not_an_alert() {
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let mut trigger = UnreadAlertTrigger::new(sink.clone());
        trigger.observe(7);
        assert_eq!(sink.0.load(Ordering::SeqCst), 0);
        trigger.observe(8);
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn decreases_reset_the_comparison_point() {
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let mut trigger = UnreadAlertTrigger::new(sink.clone());
        for total in [4, 1, 2] {
            trigger.observe(total);
        }
        // 4 -> 1 is silent, 1 -> 2 fires even though 2 < 4.
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }
}

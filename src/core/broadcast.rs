//! Publish/subscribe fan-out over one implicit channel.
//!
//! Each attached [`Listener`] owns the receiving half of an unbounded
//! channel; the hub keeps the sending halves keyed by a monotonically
//! increasing id, which is also the attachment order. Publishing never
//! blocks. Listeners whose receiver is gone are pruned on the next publish,
//! and dropping a `Listener` detaches it immediately.

use serde_json::Value;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

const BROADCAST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::broadcast");

pub type ListenerId = u64;

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<ListenerId, mpsc::UnboundedSender<Value>>>,
}

impl HubInner {
    fn remove(&self, id: ListenerId) -> bool {
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.remove(&id).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(&id).is_some(),
        }
    }
}

/// Cheaply cloneable handle to the shared hub.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new listener. It sees every message published from now on.
    pub fn attach(&self) -> Listener {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        match self.inner.listeners.lock() {
            Ok(mut listeners) => listeners.insert(id, tx),
            Err(poisoned) => poisoned.into_inner().insert(id, tx),
        };
        debug!(target: BROADCAST_TARGET, listener = id, "listener attached");
        Listener {
            id,
            rx,
            hub: Arc::clone(&self.inner),
        }
    }

    /// Detaches `listener`. Equivalent to dropping it.
    pub fn detach(&self, listener: Listener) {
        drop(listener);
    }

    /// Delivers `message` to every attached listener, in attachment order.
    ///
    /// Returns the number of listeners that accepted the message.
    pub fn publish(&self, message: &Value) -> usize {
        let mut listeners = match self.inner.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut delivered = 0;
        listeners.retain(|id, tx| match tx.send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                debug!(target: BROADCAST_TARGET, listener = *id, "pruned closed listener");
                false
            }
        });
        debug!(target: BROADCAST_TARGET, delivered, "message published");
        delivered
    }

    /// Drops every sender. Each attached listener sees the end of its
    /// stream once its queued messages are drained.
    pub fn close_all(&self) -> usize {
        let mut listeners = match self.inner.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let closed = listeners.len();
        listeners.clear();
        debug!(target: BROADCAST_TARGET, closed, "all listeners closed");
        closed
    }

    pub fn listener_count(&self) -> usize {
        match self.inner.listeners.lock() {
            Ok(listeners) => listeners.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// One attached receiver, bound to the lifetime of one client connection.
pub struct Listener {
    id: ListenerId,
    rx: mpsc::UnboundedReceiver<Value>,
    hub: Arc<HubInner>,
}

impl Listener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Waits for the next message.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }
}

impl tokio_stream::Stream for Listener {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if self.hub.remove(self.id) {
            debug!(target: BROADCAST_TARGET, listener = self.id, "listener detached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_attached_listener_gets_exactly_one_copy() {
        let hub = BroadcastHub::new();
        let mut a = hub.attach();
        let mut b = hub.attach();

        assert_eq!(hub.publish(&json!({"x": 1})), 2);

        assert_eq!(a.try_recv(), Some(json!({"x": 1})));
        assert_eq!(b.try_recv(), Some(json!({"x": 1})));
        assert_eq!(a.try_recv(), None);
        assert_eq!(b.try_recv(), None);
    }

    #[test]
    fn late_listener_misses_earlier_publish() {
        let hub = BroadcastHub::new();
        let _early = hub.attach();
        hub.publish(&json!({"x": 1}));
        let mut late = hub.attach();
        assert_eq!(late.try_recv(), None);
    }

    #[test]
    fn publish_without_listeners_is_a_no_op() {
        let hub = BroadcastHub::new();
        assert_eq!(hub.publish(&json!("nobody")), 0);
    }

    #[test]
    fn detach_and_drop_both_remove_the_listener() {
        let hub = BroadcastHub::new();
        let a = hub.attach();
        let b = hub.attach();
        assert_eq!(hub.listener_count(), 2);
        hub.detach(a);
        assert_eq!(hub.listener_count(), 1);
        drop(b);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn message_order_follows_publish_order() {
        let hub = BroadcastHub::new();
        let mut l = hub.attach();
        for i in 0..5 {
            hub.publish(&json!(i));
        }
        let seen: Vec<Value> = std::iter::from_fn(|| l.try_recv()).collect();
        assert_eq!(seen, (0..5).map(|i| json!(i)).collect::<Vec<_>>());
    }

    #[test]
    fn listener_ids_follow_attachment_order() {
        let hub = BroadcastHub::new();
        let a = hub.attach();
        let b = hub.attach();
        assert!(a.id() < b.id());
    }

    #[tokio::test]
    async fn close_all_ends_every_stream_after_queued_messages() {
        let hub = BroadcastHub::new();
        let mut l = hub.attach();
        hub.publish(&json!("last"));
        assert_eq!(hub.close_all(), 1);
        assert_eq!(hub.listener_count(), 0);
        assert_eq!(l.recv().await, Some(json!("last")));
        assert_eq!(l.recv().await, None);
    }

    #[tokio::test]
    async fn recv_wakes_on_publish() {
        let hub = BroadcastHub::new();
        let mut l = hub.attach();
        let publisher = hub.clone();
        tokio::spawn(async move {
            publisher.publish(&json!({"hello": "world"}));
        });
        assert_eq!(l.recv().await, Some(json!({"hello": "world"})));
    }
}

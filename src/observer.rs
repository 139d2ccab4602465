//! Event/observer plumbing: synchronous callback registration plus
//! cancellable lazy sequences, both fed from the same source.
//!
//! The lazy-sequence style is built on [`tokio::sync::broadcast`] — the
//! closest stdlib-adjacent multi-producer/multi-consumer primitive to a
//! bounded queue per subscription, and its `Lagged` error is exactly the
//! overflow marker the design calls for, so there is no need to hand-roll
//! a ring buffer.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::broadcast;
use tokio::sync::Notify;

/// Default bounded capacity for a lazy-sequence subscription.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 256;

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    sender: broadcast::Sender<T>,
    callbacks: Mutex<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
}

/// Fan-out point for one event stream (raw events, zone changes, or
/// state changes). Cheap to clone — it's a handle around an `Arc`.
pub struct ObserverHub<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ObserverHub<T> {
    fn clone(&self) -> Self {
        ObserverHub {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> ObserverHub<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        ObserverHub {
            inner: Arc::new(Inner {
                sender,
                callbacks: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Deliver `value` to every registered callback (synchronously, in
    /// registration order, with panic isolation) and every subscriber.
    pub fn emit(&self, value: T) {
        let callbacks = self.inner.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        for (id, callback) in callbacks.iter() {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| callback(&value)));
            if let Err(panic) = result {
                tracing::warn!(handler_id = id, ?panic, "observer callback panicked, discarding");
            }
        }
        drop(callbacks);
        // No receivers is not an error here — lazy-sequence subscribers
        // are optional.
        let _ = self.inner.sender.send(value);
    }

    /// Register a callback handler, returning a [`Disposer`] that
    /// deregisters it on drop.
    pub fn on(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> Disposer<T> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Box::new(handler)));
        Disposer {
            id,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Open a new bounded lazy-sequence subscription.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            receiver: self.inner.sender.subscribe(),
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }
}

/// Guard returned by [`ObserverHub::on`]. Deregisters its handler when
/// dropped; dropping it twice, or after the hub itself is gone, is a
/// no-op.
pub struct Disposer<T> {
    id: u64,
    hub: Weak<Inner<T>>,
}

impl<T> Drop for Disposer<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            inner
                .callbacks
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl<T> fmt::Debug for Disposer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer").field("id", &self.id).finish()
    }
}

/// One item yielded by a [`Subscription`]: either a delivered value, or a
/// marker reporting how many items were dropped because the subscriber
/// fell behind the bounded buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionItem<T> {
    Value(T),
    Overflowed(u64),
}

/// A cancellable lazy sequence over one [`ObserverHub`]'s values.
pub struct Subscription<T> {
    receiver: broadcast::Receiver<T>,
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl<T: Clone> Subscription<T> {
    /// Await the next item, or `None` if the subscription was cancelled
    /// or the hub was dropped.
    pub async fn next(&mut self) -> Option<SubscriptionItem<T>> {
        if self.cancelled.load(Ordering::Acquire) {
            return None;
        }
        tokio::select! {
            _ = self.notify.notified() => None,
            result = self.receiver.recv() => match result {
                Ok(value) => Some(SubscriptionItem::Value(value)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    Some(SubscriptionItem::Overflowed(skipped))
                }
                Err(broadcast::error::RecvError::Closed) => None,
            },
        }
    }

    /// Await the next item with a caller-supplied timeout.
    pub async fn next_timeout(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<Option<SubscriptionItem<T>>, tokio::time::error::Elapsed> {
        tokio::time::timeout(timeout, self.next()).await
    }

    /// Cancel this subscription, unblocking any task currently awaiting
    /// [`Self::next`].
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn callback_receives_emitted_values_in_order() {
        let hub: ObserverHub<u32> = ObserverHub::new(DEFAULT_SUBSCRIPTION_CAPACITY);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _disposer = hub.on(move |v: &u32| seen_clone.lock().unwrap().push(*v));

        hub.emit(1);
        hub.emit(2);
        hub.emit(3);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn disposer_deregisters_on_drop() {
        let hub: ObserverHub<u32> = ObserverHub::new(DEFAULT_SUBSCRIPTION_CAPACITY);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let disposer = hub.on(move |_: &u32| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        hub.emit(1);
        drop(disposer);
        hub.emit(2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_handler_is_isolated() {
        let hub: ObserverHub<u32> = ObserverHub::new(DEFAULT_SUBSCRIPTION_CAPACITY);
        let ran_after = Arc::new(AtomicBool::new(false));
        let ran_after_clone = ran_after.clone();
        let _d1 = hub.on(|_: &u32| panic!("boom"));
        let _d2 = hub.on(move |_: &u32| ran_after_clone.store(true, Ordering::SeqCst));

        hub.emit(1);

        assert!(ran_after.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn subscription_receives_values() {
        let hub: ObserverHub<u32> = ObserverHub::new(DEFAULT_SUBSCRIPTION_CAPACITY);
        let mut sub = hub.subscribe();
        hub.emit(42);
        let item = sub.next().await;
        assert_eq!(item, Some(SubscriptionItem::Value(42)));
    }

    #[tokio::test]
    async fn subscription_overflow_yields_lag_marker() {
        let hub: ObserverHub<u32> = ObserverHub::new(2);
        let mut sub = hub.subscribe();
        hub.emit(1);
        hub.emit(2);
        hub.emit(3);
        hub.emit(4);
        let item = sub.next().await;
        assert!(matches!(item, Some(SubscriptionItem::Overflowed(_))));
    }

    #[tokio::test]
    async fn cancel_unblocks_pending_next() {
        let hub: ObserverHub<u32> = ObserverHub::new(DEFAULT_SUBSCRIPTION_CAPACITY);
        let mut sub = hub.subscribe();
        sub.cancel();
        let item = sub.next().await;
        assert_eq!(item, None);
    }

    #[tokio::test]
    async fn independently_cancelling_one_subscription_does_not_affect_another() {
        let hub: ObserverHub<u32> = ObserverHub::new(DEFAULT_SUBSCRIPTION_CAPACITY);
        let mut sub_a = hub.subscribe();
        let mut sub_b = hub.subscribe();
        sub_a.cancel();
        hub.emit(7);
        assert_eq!(sub_a.next().await, None);
        assert_eq!(sub_b.next().await, Some(SubscriptionItem::Value(7)));
    }
}

//! Auth event notifications
//!
//! The session layer needs to know when the client gives up on a session so it
//! can drop local state and send the user back to sign-in. Instead of a single
//! global callback slot, `AuthEvents` keeps a list of observers. Each
//! `subscribe()` returns a `Subscription` that unregisters the handler when
//! dropped, so a torn-down screen can't be called back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, warn};

/// Session lifecycle events published by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// Token refresh failed irrecoverably; stored credentials are already cleared.
    SessionExpired,
    /// The user logged out through `ApiClient::logout`.
    LoggedOut,
}

type Handler = Arc<dyn Fn(&AuthEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, Handler)>>,
}

impl Registry {
    fn handlers(&self) -> MutexGuard<'_, Vec<(u64, Handler)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Observer registry for `AuthEvent`s. Clones share the same registry.
#[derive(Clone, Default)]
pub struct AuthEvents {
    registry: Arc<Registry>,
}

impl AuthEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. It stays registered until the returned
    /// `Subscription` is dropped.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.handlers().push((id, Arc::new(handler)));
        debug!(subscription = id, "auth event handler registered");
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Invoke every registered handler, in registration order, on the calling
    /// task. Returns how many handlers ran.
    ///
    /// Handlers are called outside the registry lock, so a handler may itself
    /// subscribe or drop subscriptions.
    pub fn publish(&self, event: AuthEvent) -> usize {
        let handlers: Vec<Handler> = self
            .registry
            .handlers()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        if handlers.is_empty() {
            warn!(?event, "auth event has no subscribers, dropping");
            return 0;
        }

        for handler in &handlers {
            handler(&event);
        }
        debug!(?event, handlers = handlers.len(), "auth event published");
        handlers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.handlers().len()
    }
}

/// Registration handle returned by `AuthEvents::subscribe`.
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Unregister now. Same as dropping.
    pub fn unsubscribe(self) {}

    /// Keep the handler registered for the lifetime of the registry.
    pub fn detach(mut self) {
        self.registry = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.handlers().retain(|(id, _)| *id != self.id);
            debug!(subscription = self.id, "auth event handler removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&AuthEvent) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = count.clone();
        (count, move |_: &AuthEvent| {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn publish_without_subscribers_is_swallowed() {
        let events = AuthEvents::new();
        assert_eq!(events.publish(AuthEvent::SessionExpired), 0);
    }

    #[test]
    fn every_subscriber_sees_the_event() {
        let events = AuthEvents::new();
        let (a, handler_a) = counter();
        let (b, handler_b) = counter();
        let _sub_a = events.subscribe(handler_a);
        let _sub_b = events.subscribe(handler_b);

        assert_eq!(events.publish(AuthEvent::SessionExpired), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let events = AuthEvents::new();
        let (count, handler) = counter();
        let sub = events.subscribe(handler);
        assert_eq!(events.subscriber_count(), 1);

        drop(sub);
        assert_eq!(events.subscriber_count(), 0);
        events.publish(AuthEvent::SessionExpired);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn detached_subscription_stays_registered() {
        let events = AuthEvents::new();
        let (count, handler) = counter();
        events.subscribe(handler).detach();

        events.publish(AuthEvent::LoggedOut);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let events = AuthEvents::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let subs: Vec<Subscription> = (0..3)
            .map(|i| {
                let order = order.clone();
                events.subscribe(move |_| order.lock().unwrap().push(i))
            })
            .collect();

        events.publish(AuthEvent::SessionExpired);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        drop(subs);
    }

    #[test]
    fn handler_receives_event_kind() {
        let events = AuthEvents::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = events.subscribe(move |event| sink.lock().unwrap().push(*event));

        events.publish(AuthEvent::LoggedOut);
        events.publish(AuthEvent::SessionExpired);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![AuthEvent::LoggedOut, AuthEvent::SessionExpired]
        );
    }

    #[test]
    fn handler_may_unsubscribe_during_publish() {
        let events = AuthEvents::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner = slot.clone();
        let sub = events.subscribe(move |_| {
            inner.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(sub);

        assert_eq!(events.publish(AuthEvent::SessionExpired), 1);
        assert_eq!(events.subscriber_count(), 0);
    }

    #[test]
    fn subscription_outliving_registry_drops_cleanly() {
        let events = AuthEvents::new();
        let (_count, handler) = counter();
        let sub = events.subscribe(handler);
        drop(events);
        drop(sub);
    }
}

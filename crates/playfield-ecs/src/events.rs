//! Queue-then-drain publish/subscribe.
//!
//! Events are queued with [`EventBus::emit`] (or through a cloned
//! [`EventSender`], which listeners may capture) and delivered in FIFO order
//! by [`EventBus::process_events`], once per frame at a fixed point before
//! systems run. Events emitted while draining are delivered in the same drain.
//!
//! Listeners are registered per event kind and identified by the
//! [`Subscription`] token returned from [`EventBus::subscribe`]. A listener
//! that fails (returns `Err` or panics) is logged; delivery continues to the
//! remaining listeners and the remaining queued events.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

/// An event type that can travel on an [`EventBus`].
pub trait BusEvent: 'static {
    /// The discriminant listeners subscribe to.
    type Kind: Copy + Eq + Hash + fmt::Debug + 'static;

    /// Which kind this event is.
    fn kind(&self) -> Self::Kind;
}

/// Boxed listener callback.
pub type Listener<E> = Box<dyn FnMut(&E) -> anyhow::Result<()>>;

/// Capability token for removing one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription<K> {
    kind: K,
    id: u64,
}

impl<K: Copy> Subscription<K> {
    /// The event kind this subscription listens to.
    pub fn kind(&self) -> K {
        self.kind
    }
}

/// A cloneable handle that queues events on its bus.
pub struct EventSender<E> {
    queue: Rc<RefCell<VecDeque<E>>>,
}

impl<E> EventSender<E> {
    /// Queue an event for the next drain.
    pub fn emit(&self, event: E) {
        self.queue.borrow_mut().push_back(event);
    }
}

impl<E> Clone for EventSender<E> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
        }
    }
}

/// Listener registry plus a pending-event queue.
pub struct EventBus<E: BusEvent> {
    listeners: HashMap<E::Kind, Vec<(u64, Listener<E>)>>,
    queue: Rc<RefCell<VecDeque<E>>>,
    next_id: u64,
    faults: u64,
}

impl<E: BusEvent> EventBus<E> {
    /// An empty bus.
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            queue: Rc::new(RefCell::new(VecDeque::new())),
            next_id: 0,
            faults: 0,
        }
    }

    /// Register `listener` for events of `kind`.
    pub fn subscribe(
        &mut self,
        kind: E::Kind,
        listener: impl FnMut(&E) -> anyhow::Result<()> + 'static,
    ) -> Subscription<E::Kind> {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Box::new(listener)));
        Subscription { kind, id }
    }

    /// Remove one listener. Returns `false` if the token was already used.
    pub fn unsubscribe(&mut self, token: Subscription<E::Kind>) -> bool {
        let Some(list) = self.listeners.get_mut(&token.kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != token.id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.listeners.remove(&token.kind);
        }
        removed
    }

    /// Queue an event for the next [`process_events`](Self::process_events).
    pub fn emit(&self, event: E) {
        self.queue.borrow_mut().push_back(event);
    }

    /// Deliver an event now, bypassing the queue.
    pub fn emit_immediate(&mut self, event: &E) {
        self.dispatch(event);
    }

    /// A handle for queueing events from inside listeners or other owners.
    pub fn sender(&self) -> EventSender<E> {
        EventSender {
            queue: Rc::clone(&self.queue),
        }
    }

    /// Drain the queue in FIFO order. Returns the number of events delivered.
    pub fn process_events(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            self.dispatch(&event);
            delivered += 1;
        }
        delivered
    }

    fn dispatch(&mut self, event: &E) {
        let kind = event.kind();
        let Some(list) = self.listeners.get_mut(&kind) else {
            return;
        };
        for (id, listener) in list.iter_mut() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(event)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{err:#}"),
                Err(_) => "listener panicked".to_owned(),
            };
            self.faults += 1;
            tracing::error!(kind = ?kind, listener = *id, error = %message, "event listener failed");
        }
    }

    /// Drop every listener and every queued event.
    pub fn clear(&mut self) {
        self.listeners.clear();
        self.queue.borrow_mut().clear();
    }

    /// Number of listeners for `kind`.
    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Whether anyone listens to `kind`.
    pub fn has_listeners(&self, kind: E::Kind) -> bool {
        self.listener_count(kind) > 0
    }

    /// Number of queued, undelivered events.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Listener failures observed since creation.
    pub fn fault_count(&self) -> u64 {
        self.faults
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("kinds", &self.listeners.len())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Ev {
        Ping(u32),
        Pong,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum EvKind {
        Ping,
        Pong,
    }

    impl BusEvent for Ev {
        type Kind = EvKind;
        fn kind(&self) -> EvKind {
            match self {
                Ev::Ping(_) => EvKind::Ping,
                Ev::Pong => EvKind::Pong,
            }
        }
    }

    #[test]
    fn queued_events_drain_in_fifo_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::<Ev>::new();
        let s = Rc::clone(&seen);
        bus.subscribe(EvKind::Ping, move |e| {
            if let Ev::Ping(n) = e {
                s.borrow_mut().push(*n);
            }
            Ok(())
        });
        bus.emit(Ev::Ping(1));
        bus.emit(Ev::Pong);
        bus.emit(Ev::Ping(2));
        assert!(seen.borrow().is_empty());
        assert_eq!(bus.process_events(), 3);
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let hits = Rc::new(RefCell::new(0));
        let mut bus = EventBus::<Ev>::new();
        bus.subscribe(EvKind::Pong, |_| anyhow::bail!("nope"));
        bus.subscribe(EvKind::Pong, |_| panic!("worse"));
        let h = Rc::clone(&hits);
        bus.subscribe(EvKind::Pong, move |_| {
            *h.borrow_mut() += 1;
            Ok(())
        });
        bus.emit(Ev::Pong);
        bus.emit(Ev::Pong);
        bus.process_events();
        assert_eq!(*hits.borrow(), 2);
        assert_eq!(bus.fault_count(), 4);
    }

    #[test]
    fn events_emitted_while_draining_are_delivered() {
        let pongs = Rc::new(RefCell::new(0));
        let mut bus = EventBus::<Ev>::new();
        let sender = bus.sender();
        bus.subscribe(EvKind::Ping, move |_| {
            sender.emit(Ev::Pong);
            Ok(())
        });
        let p = Rc::clone(&pongs);
        bus.subscribe(EvKind::Pong, move |_| {
            *p.borrow_mut() += 1;
            Ok(())
        });
        bus.emit(Ev::Ping(0));
        assert_eq!(bus.process_events(), 2);
        assert_eq!(*pongs.borrow(), 1);
    }

    #[test]
    fn unsubscribe_with_token() {
        let mut bus = EventBus::<Ev>::new();
        let a = bus.subscribe(EvKind::Ping, |_| Ok(()));
        let _b = bus.subscribe(EvKind::Ping, |_| Ok(()));
        assert_eq!(bus.listener_count(EvKind::Ping), 2);
        assert!(bus.unsubscribe(a));
        assert!(!bus.unsubscribe(a));
        assert_eq!(bus.listener_count(EvKind::Ping), 1);
        bus.clear();
        assert!(!bus.has_listeners(EvKind::Ping));
    }

    #[test]
    fn emit_immediate_skips_queue() {
        let hits = Rc::new(RefCell::new(0));
        let mut bus = EventBus::<Ev>::new();
        let h = Rc::clone(&hits);
        bus.subscribe(EvKind::Pong, move |_| {
            *h.borrow_mut() += 1;
            Ok(())
        });
        bus.emit_immediate(&Ev::Pong);
        assert_eq!(*hits.borrow(), 1);
        assert_eq!(bus.pending(), 0);
    }
}

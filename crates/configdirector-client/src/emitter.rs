//! Typed publish/subscribe registry.
//!
//! An event set `S` is a marker type; each event in the set is another marker
//! implementing [`Event<S>`], which fixes the payload type at compile time.
//! Registering a handler for an event that does not belong to `S` does not
//! type-check.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::lock;

/// Binds an event marker to its payload within the event set `S`.
pub trait Event<S>: 'static {
    type Payload: 'static;
    const NAME: &'static str;
}

/// Identifies a registered handler so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<P> = Arc<dyn Fn(&P) + Send + Sync>;
type Slot = (HandlerId, Arc<dyn Any + Send + Sync>);

pub struct Emitter<S> {
    handlers: Mutex<HashMap<TypeId, Vec<Slot>>>,
    next_id: AtomicU64,
    _events: PhantomData<fn() -> S>,
}

impl<S> Default for Emitter<S> {
    fn default() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            _events: PhantomData,
        }
    }
}

impl<S> std::fmt::Debug for Emitter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = lock(&self.handlers);
        f.debug_struct("Emitter")
            .field("events", &handlers.len())
            .finish()
    }
}

impl<S> Emitter<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `E`. Handlers run in registration order.
    pub fn on<E, F>(&self, handler: F) -> HandlerId
    where
        E: Event<S>,
        F: Fn(&E::Payload) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: Handler<E::Payload> = Arc::new(handler);
        lock(&self.handlers)
            .entry(TypeId::of::<E>())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes one handler of `E`, or all of them when `id` is `None`.
    pub fn off<E: Event<S>>(&self, id: Option<HandlerId>) {
        let mut handlers = lock(&self.handlers);
        match id {
            Some(id) => {
                if let Some(slots) = handlers.get_mut(&TypeId::of::<E>()) {
                    slots.retain(|(slot_id, _)| *slot_id != id);
                }
            }
            None => {
                handlers.remove(&TypeId::of::<E>());
            }
        }
    }

    /// Invokes a snapshot of the handlers registered for `E`.
    ///
    /// The registry lock is released before any handler runs, so handlers may
    /// call back into the emitter; such changes apply to the next emit.
    pub fn emit<E: Event<S>>(&self, payload: &E::Payload) {
        let snapshot: Vec<Arc<dyn Any + Send + Sync>> = match lock(&self.handlers)
            .get(&TypeId::of::<E>())
        {
            Some(slots) => slots.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return,
        };
        tracing::trace!(event = E::NAME, handlers = snapshot.len(), "Emitting event");
        for handler in snapshot {
            if let Some(handler) = handler.downcast_ref::<Handler<E::Payload>>() {
                handler(payload);
            }
        }
    }

    /// Removes every handler of every event.
    pub fn clear(&self) {
        lock(&self.handlers).clear();
    }

    pub fn handler_count<E: Event<S>>(&self) -> usize {
        lock(&self.handlers)
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }
}

//! Local listener registry: event name → ordered handlers.
//!
//! Registration hands back a [`ListenerToken`] that removes exactly that
//! handler. A failing or panicking handler is logged and the remaining
//! handlers still run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};

use ahash::AHashMap;
use mdr_core::error::panic_message;
use serde_json::Value;
use tracing::warn;

pub type Handler = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

/// Handle for one registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerToken {
    event: String,
    id: u64,
}

impl ListenerToken {
    pub fn event(&self) -> &str {
        &self.event
    }
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    handlers: AHashMap<String, Vec<(u64, Handler)>>,
}

#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn on(&self, event: &str, handler: Handler) -> ListenerToken {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.handlers.entry(event.to_string()).or_default().push((id, handler));
        ListenerToken { event: event.to_string(), id }
    }

    /// Remove one registration. Returns false if it was already gone.
    pub fn off(&self, token: &ListenerToken) -> bool {
        let mut inner = self.lock();
        let Some(list) = inner.handlers.get_mut(&token.event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != token.id);
        let removed = list.len() != before;
        if list.is_empty() {
            inner.handlers.remove(&token.event);
        }
        removed
    }

    /// Invoke every handler of `event` in registration order.
    ///
    /// Handlers run outside the registry lock, so they may register or remove
    /// listeners. Returns how many handlers succeeded.
    pub fn emit(&self, event: &str, data: &Value) -> usize {
        let handlers: Vec<Handler> = match self.lock().handlers.get(event) {
            Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
            None => return 0,
        };

        let mut ok = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(data))) {
                Ok(Ok(())) => ok += 1,
                Ok(Err(e)) => warn!("[room-client] listener for {event} failed: {e:#}"),
                Err(panic) => warn!(
                    "[room-client] listener for {event} panicked: {}",
                    panic_message(panic.as_ref())
                ),
            }
        }
        ok
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().handlers.get(event).map_or(0, Vec::len)
    }
}

//! Observability hook.
//!
//! Every notable engine event (listening, stopping, suppressed and surfaced
//! socket errors, header overflow, stream aborts, idle evictions) goes through
//! an [`EventSink`]. The sink always logs via `tracing` at the matching level
//! and additionally calls a user hook when one is installed.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEvent {
    pub kind: EventKind,
    pub detail: String,
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.detail)
    }
}

/// Callback receiving every [`ServerEvent`].
pub type EventHook = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

struct Hook(EventHook);

#[derive(Default)]
pub struct EventSink {
    hook: ArcSwapOption<Hook>,
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").field("hook", &self.hook.load().is_some()).finish()
    }
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `hook`, replacing the previous one.
    pub fn set_hook(&self, hook: EventHook) {
        self.hook.store(Some(Arc::new(Hook(hook))));
    }

    pub fn clear_hook(&self) {
        self.hook.store(None);
    }

    pub fn emit(&self, kind: EventKind, detail: impl Into<String>) {
        let event = ServerEvent { kind, detail: detail.into() };
        match kind {
            EventKind::Info => info!(detail = %event.detail, "server event"),
            EventKind::Warning => warn!(detail = %event.detail, "server event"),
            EventKind::Error => error!(detail = %event.detail, "server event"),
        }

        if let Some(hook) = self.hook.load().as_ref() {
            (hook.0)(&event);
        }
    }

    pub fn info(&self, detail: impl Into<String>) {
        self.emit(EventKind::Info, detail);
    }

    pub fn warning(&self, detail: impl Into<String>) {
        self.emit(EventKind::Warning, detail);
    }

    pub fn error(&self, detail: impl Into<String>) {
        self.emit(EventKind::Error, detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn hook_receives_events_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = EventSink::new();
        let recorder = Arc::clone(&seen);
        sink.set_hook(Arc::new(move |event: &ServerEvent| recorder.lock().unwrap().push(event.clone())));

        sink.info("listening");
        sink.warning("header overflow");
        sink.clear_hook();
        sink.error("not recorded");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ServerEvent { kind: EventKind::Info, detail: String::from("listening") });
        assert_eq!(seen[1].kind, EventKind::Warning);
    }
}

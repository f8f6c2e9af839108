//! Lifecycle event edges and handler registration

use crate::{Error, Phase, Result, context::ServiceContext};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A phase-edge event name (`prerestore` ... `postdeploy`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceEventKind {
    /// The phase the edge belongs to
    pub phase: Phase,
    /// Whether this is the pre- or post-phase edge
    pub pre: bool,
}

impl ServiceEventKind {
    /// The `pre<phase>` edge
    pub fn pre(phase: Phase) -> Self {
        Self { phase, pre: true }
    }

    /// The `post<phase>` edge
    pub fn post(phase: Phase) -> Self {
        Self { phase, pre: false }
    }

    /// The edge name, e.g. `prerestore`
    pub fn name(&self) -> String {
        let edge = if self.pre { "pre" } else { "post" };
        format!("{}{}", edge, self.phase.as_str())
    }
}

impl std::fmt::Display for ServiceEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// Arguments observed by lifecycle event handlers.
///
/// The context is a snapshot taken at event time; handlers cannot mutate the
/// pipeline's view, and later handlers of the same event never observe
/// another handler's changes.
#[derive(Debug, Clone)]
pub struct ServiceLifecycleEventArgs {
    /// The service the event belongs to
    pub service_name: String,
    /// Snapshot of the accumulated artifacts at event time
    pub context: Arc<ServiceContext>,
}

/// Error type surfaced by a failing handler
pub type EventHandlerError = Box<dyn std::error::Error + Send + Sync>;

/// An async lifecycle event handler
pub type EventHandler = Arc<
    dyn Fn(ServiceLifecycleEventArgs) -> BoxFuture<'static, std::result::Result<(), EventHandlerError>>
        + Send
        + Sync,
>;

/// Ordered handler lists keyed by event name.
///
/// The table is append-only and is sealed once `initialize` has run for the
/// owning config; registration after sealing is rejected.
#[derive(Clone, Default)]
pub struct EventHandlerTable {
    inner: Arc<Mutex<TableInner>>,
}

#[derive(Default)]
struct TableInner {
    sealed: bool,
    handlers: HashMap<String, Vec<EventHandler>>,
}

impl EventHandlerTable {
    /// Create an empty, unsealed table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for the named event edge, in registration order
    pub fn register(&self, event: impl Into<String>, handler: EventHandler) -> Result<()> {
        let event = event.into();
        let mut inner = self.inner.lock().unwrap();
        if inner.sealed {
            return Err(Error::HandlersSealed { name: event });
        }
        inner.handlers.entry(event).or_default().push(handler);
        Ok(())
    }

    /// Seal the table; all later registrations fail
    pub fn seal(&self) {
        self.inner.lock().unwrap().sealed = true;
    }

    /// Whether the table has been sealed
    pub fn is_sealed(&self) -> bool {
        self.inner.lock().unwrap().sealed
    }

    /// Handlers registered for the named event, in registration order
    pub fn handlers_for(&self, event: &str) -> Vec<EventHandler> {
        self.inner
            .lock()
            .unwrap()
            .handlers
            .get(event)
            .cloned()
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for EventHandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("EventHandlerTable")
            .field("sealed", &inner.sealed)
            .field("events", &inner.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_handler() -> EventHandler {
        Arc::new(|_args| Box::pin(async { Ok(()) }))
    }

    #[test]
    fn test_event_edge_names() {
        assert_eq!(ServiceEventKind::pre(Phase::Restore).name(), "prerestore");
        assert_eq!(ServiceEventKind::post(Phase::Deploy).name(), "postdeploy");
    }

    #[test]
    fn test_registration_order_is_preserved() {
        let table = EventHandlerTable::new();
        table.register("prebuild", noop_handler()).unwrap();
        table.register("prebuild", noop_handler()).unwrap();

        assert_eq!(table.handlers_for("prebuild").len(), 2);
        assert!(table.handlers_for("postbuild").is_empty());
    }

    #[test]
    fn test_sealed_table_rejects_registration() {
        let table = EventHandlerTable::new();
        table.register("predeploy", noop_handler()).unwrap();
        table.seal();

        let err = table.register("predeploy", noop_handler()).unwrap_err();
        assert!(matches!(err, Error::HandlersSealed { .. }));
        // Existing handlers survive sealing
        assert_eq!(table.handlers_for("predeploy").len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let table = EventHandlerTable::new();
        let copy = table.clone();
        copy.register("prepackage", noop_handler()).unwrap();

        assert_eq!(table.handlers_for("prepackage").len(), 1);
    }
}

//! Sequential lifecycle event dispatch

use crate::{Error, Result};
use deploy_model::{EventHandlerTable, ServiceContext, ServiceLifecycleEventArgs};
use std::sync::Arc;
use tracing::debug;

/// Fire every handler registered for `event`, sequentially in registration
/// order.
///
/// Handlers observe a read-only snapshot of the service context taken at
/// event time; a failing handler short-circuits the remaining handlers and
/// surfaces as the event's error.
pub async fn dispatch_event(
    table: &EventHandlerTable,
    event: &str,
    service_name: &str,
    context: &ServiceContext,
) -> Result<()> {
    let handlers = table.handlers_for(event);
    if handlers.is_empty() {
        return Ok(());
    }

    debug!(
        "Dispatching '{}' to {} handler(s) for service '{}'",
        event,
        handlers.len(),
        service_name
    );

    let args = ServiceLifecycleEventArgs {
        service_name: service_name.to_string(),
        context: Arc::new(context.clone()),
    };

    for handler in handlers {
        handler(args.clone()).await.map_err(|e| Error::EventHandler {
            event: event.to_string(),
            message: e.to_string(),
        })?;
    }

    Ok(())
}

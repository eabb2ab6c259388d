//! Routing of the shared notification stream to sensor sessions.
//!
//! The transport exposes one stream of characteristic updates for every
//! connected peripheral. Rather than each session filtering the whole
//! stream itself, frames are dispatched centrally through a lookup table
//! keyed by (peripheral address, characteristic). The table holds weak
//! references: the router never owns session lifetime, and routing to a
//! released session stops as soon as its last strong reference is gone.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::session::SensorSession;
use crate::types::CharacteristicFrame;

type RouteKey = (String, Uuid);

/// Dispatches raw frames to the owning session.
#[derive(Default)]
pub struct EventRouter {
    routes: Mutex<HashMap<RouteKey, Weak<SensorSession>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session under its (address, characteristic) key.
    ///
    /// A later registration for the same key replaces the earlier one, so
    /// duplicate registrations cannot accumulate.
    pub async fn register(&self, session: &Arc<SensorSession>) {
        let key = (session.address().to_string(), session.characteristic());
        self.routes.lock().await.insert(key, Arc::downgrade(session));
    }

    /// Removes the route for (address, characteristic), if any.
    pub async fn release(&self, address: &str, characteristic: Uuid) -> bool {
        self.routes
            .lock()
            .await
            .remove(&(address.to_string(), characteristic))
            .is_some()
    }

    /// Number of live routes, pruning any whose session has been dropped.
    pub async fn len(&self) -> usize {
        let mut routes = self.routes.lock().await;
        routes.retain(|_, weak| weak.strong_count() > 0);
        routes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Delivers a frame to the session registered for its key.
    ///
    /// Frames with no matching live session are dropped; a dead entry is
    /// pruned when encountered.
    pub async fn route(&self, frame: &CharacteristicFrame) {
        let session = {
            let mut routes = self.routes.lock().await;
            let key = (frame.address.clone(), frame.characteristic);
            match routes.get(&key) {
                Some(weak) => match weak.upgrade() {
                    Some(session) => Some(session),
                    None => {
                        routes.remove(&key);
                        None
                    }
                },
                None => None,
            }
        };

        match session {
            Some(session) => session.handle_frame(frame).await,
            None => {
                debug!(address = %frame.address, characteristic = %frame.characteristic,
                    "no session registered for frame");
            }
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter").finish_non_exhaustive()
    }
}

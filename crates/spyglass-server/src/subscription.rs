//! Live subscription management
//!
//! One [`SubscriptionManager`] per server owns every live subscription: the
//! registry mapping subscription ids to their observation handles, the
//! diffing of adapter change events into wire change sets, and the fan-out
//! of notifications to owning clients.
//!
//! All registration and teardown runs on the adapter context, honoring the
//! change feed's thread-affinity rules and serializing it with request
//! dispatch. That ordering is load-bearing: the success response to a
//! `subscribe` is queued from the same context job that registers the
//! observation, so no notification for that subscription can precede it.
//!
//! Delivery is at-most-once: an event arriving while the owning client is
//! not `Ready`, or after the subscription left the registry, is dropped and
//! never redelivered.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use spyglass_adapter::{ChangeEvent, ChangeSink, DatabaseAdapter, Observation};
use spyglass_protocol::{ChangeSet, Notification, Request, RequestKind, Response, Value};

use crate::client::ClientHandle;
use crate::context::AdapterContext;
use crate::dispatch::{optional_str, require_str};

/// Owns every live subscription
pub struct SubscriptionManager {
    context: Arc<AdapterContext>,
    subscriptions: Mutex<HashMap<String, SubscriptionEntry>>,
}

struct SubscriptionEntry {
    client: ClientHandle,
    type_name: String,
    observation: Observation,
}

impl SubscriptionManager {
    pub fn new(context: Arc<AdapterContext>) -> Arc<Self> {
        Arc::new(Self {
            context,
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Handle a `subscribe`/`unsubscribe` request on the adapter context
    pub fn handle(self: &Arc<Self>, client: ClientHandle, request: Request) {
        let manager = Arc::clone(self);
        let submitted = self.context.submit(move |adapter| {
            let response = match request.kind {
                RequestKind::Subscribe => manager.register(adapter, &client, &request),
                RequestKind::Unsubscribe => manager.unregister(&request),
                _ => Response::fail(&request.id, "not a subscription request"),
            };
            client.send_response(response);
        });
        if !submitted {
            warn!("subscription request dropped: adapter context closed");
        }
    }

    fn register(
        self: &Arc<Self>,
        adapter: &dyn DatabaseAdapter,
        client: &ClientHandle,
        request: &Request,
    ) -> Response {
        let type_name = match require_str(request, "typeName") {
            Ok(name) => name.to_string(),
            Err(e) => return Response::fail(&request.id, e.to_string()),
        };
        let filter = match optional_str(request, "filter") {
            Ok(filter) => filter,
            Err(e) => return Response::fail(&request.id, e.to_string()),
        };

        let subscription_id = Uuid::new_v4().to_string();
        let sink = self.change_sink(subscription_id.clone(), client.clone(), type_name.clone());

        let observation = match adapter.observe(&type_name, filter.as_deref(), sink) {
            Ok(observation) => observation,
            Err(e) => return Response::fail(&request.id, e.to_string()),
        };

        // Membership and registry update under the registry lock, so the
        // two can never disagree
        {
            let mut subscriptions = self.subscriptions.lock();
            client.add_subscription(&subscription_id);
            subscriptions.insert(
                subscription_id.clone(),
                SubscriptionEntry {
                    client: client.clone(),
                    type_name: type_name.clone(),
                    observation,
                },
            );
        }

        debug!(
            subscription_id = %subscription_id,
            client_id = %client.id(),
            type_name = %type_name,
            filter = filter.as_deref().unwrap_or("<none>"),
            "subscription created"
        );

        Response::ok(
            &request.id,
            Value::from_json(json!({
                "subscriptionId": subscription_id,
                "typeName": type_name,
            })),
        )
    }

    fn unregister(&self, request: &Request) -> Response {
        let subscription_id = match require_str(request, "subscriptionId") {
            Ok(id) => id.to_string(),
            Err(e) => return Response::fail(&request.id, e.to_string()),
        };

        let entry = self.subscriptions.lock().remove(&subscription_id);
        if let Some(entry) = entry {
            entry.client.remove_subscription(&subscription_id);
            entry.observation.cancel();
            debug!(subscription_id = %subscription_id, "subscription removed");
        }

        // Unknown ids succeed: unsubscribe is idempotent
        Response::ok(
            &request.id,
            Value::from_json(json!({ "unsubscribed": true })),
        )
    }

    /// Tear down every subscription owned by a disconnected client
    pub fn drop_client(self: &Arc<Self>, client: &ClientHandle) {
        let manager = Arc::clone(self);
        let client_owned = client.clone();
        let submitted = self.context.submit(move |_| {
            let ids = client_owned.take_subscriptions();
            let mut removed = Vec::new();
            {
                let mut subscriptions = manager.subscriptions.lock();
                for id in &ids {
                    if let Some(entry) = subscriptions.remove(id) {
                        removed.push(entry);
                    }
                }
            }
            if !removed.is_empty() {
                debug!(
                    client_id = %client_owned.id(),
                    count = removed.len(),
                    "tearing down subscriptions for disconnected client"
                );
            }
            for entry in removed {
                entry.observation.cancel();
            }
        });
        if !submitted {
            // Server stopped; teardown_all already ran and pending
            // observations cancel on drop
            debug!(client_id = %client.id(), "late disconnect after shutdown");
        }
    }

    /// Tear down everything; used by server stop
    pub fn teardown_all(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        self.context.submit(move |_| {
            let entries: Vec<(String, SubscriptionEntry)> =
                manager.subscriptions.lock().drain().collect();
            for (id, entry) in entries {
                entry.client.remove_subscription(&id);
                entry.observation.cancel();
            }
        });
    }

    /// Build the sink the adapter calls for each change event
    fn change_sink(
        self: &Arc<Self>,
        subscription_id: String,
        client: ClientHandle,
        type_name: String,
    ) -> ChangeSink {
        let manager = Arc::downgrade(self);
        Box::new(move |event| {
            let changes = match diff_event(&subscription_id, event) {
                Some(changes) => changes,
                None => return,
            };

            let Some(manager) = manager.upgrade() else {
                return;
            };

            // An unsubscribe racing a pending event wins: no membership, no
            // delivery
            if !manager.subscriptions.lock().contains_key(&subscription_id)
                || !client.owns_subscription(&subscription_id)
            {
                return;
            }
            if !client.is_ready() {
                return;
            }

            client.send_notification(Notification::new(
                subscription_id.clone(),
                type_name.clone(),
                changes,
            ));
        })
    }
}

/// Turn one adapter change event into a wire change set
///
/// `Initial` events carry no diff and produce nothing. Deleted rows are
/// identified by their pre-delete ordinal index rendered as a decimal
/// string: the change feed cannot report the key of a row that no longer
/// exists. Lossy, but wire-compatible with existing inspector UIs.
fn diff_event(subscription_id: &str, event: ChangeEvent) -> Option<ChangeSet> {
    match event {
        ChangeEvent::Initial => None,
        ChangeEvent::Error(e) => {
            warn!(subscription_id = %subscription_id, error = %e, "observation error");
            None
        }
        ChangeEvent::Update {
            results,
            deletions,
            insertions,
            modifications,
        } => {
            let changes = ChangeSet {
                insertions: insertions
                    .iter()
                    .filter_map(|&i| results.get(i).cloned())
                    .collect(),
                modifications: modifications
                    .iter()
                    .filter_map(|&i| results.get(i).cloned())
                    .collect(),
                deletions: deletions.iter().map(|i| i.to_string()).collect(),
            };
            if changes.is_empty() {
                None
            } else {
                Some(changes)
            }
        }
    }
}

#[cfg(test)]
#[path = "subscription_test.rs"]
mod tests;

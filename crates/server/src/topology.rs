//! The `/topology` streaming endpoint.
//!
//! Each connection gets its own watch session: a registry task, a root
//! workload watch feeding it, and a publisher loop pushing every new
//! snapshot down the socket until the client goes away.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use topo_kubehub::{DependentWatchFactory, WatchErrorHandler};
use topo_store::spawn_registry;

use crate::ServerState;

#[derive(Debug, Deserialize)]
pub struct TopologyQuery {
    pub namespace: Option<String>,
}

pub async fn topology_upgrade(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<TopologyQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let namespace = query.namespace.unwrap_or_else(|| "default".to_string());
    ws.on_upgrade(move |socket| topology_session(socket, state, namespace))
}

async fn topology_session(socket: WebSocket, state: Arc<ServerState>, namespace: String) {
    let client = match topo_kubehub::default_client().await {
        Ok(client) => client,
        Err(err) => {
            warn!(error = %err, "kube client unavailable, closing stream");
            return;
        }
    };

    let on_error: WatchErrorHandler = Arc::new(|kind, err| {
        warn!(kind = %kind, error = %err, "failed to establish watch");
    });
    let factory =
        DependentWatchFactory::new(client.clone(), namespace.clone(), on_error.clone());
    let (registry, topology) = spawn_registry(factory, state.commit.clone());
    let root = topo_kubehub::spawn_workload_watch(
        client,
        namespace.clone(),
        registry.events(),
        on_error,
    );

    let (mut sender, mut receiver) = socket.split();
    let mut epochs = topology.subscribe_epoch();
    info!(ns = %namespace, "topology stream open");

    // Events may have landed between spawning the watchers and subscribing;
    // push the snapshot they produced before waiting for the next epoch.
    if *epochs.borrow_and_update() > 0 {
        let snapshot = topology.current();
        match serde_json::to_string(&*snapshot) {
            Ok(body) => {
                if sender.send(Message::Text(body.into())).await.is_err() {
                    root.stop();
                    registry.stop();
                    return;
                }
            }
            Err(err) => warn!(error = %err, "failed to encode snapshot"),
        }
    }

    loop {
        tokio::select! {
            changed = epochs.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = topology.current();
                match serde_json::to_string(&*snapshot) {
                    Ok(body) => {
                        if sender.send(Message::Text(body.into())).await.is_err() {
                            break;
                        }
                    }
                    // Skip this cycle; the next event publishes again.
                    Err(err) => warn!(error = %err, "failed to encode snapshot"),
                }
            }
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(error = %err, "websocket receive error");
                        break;
                    }
                }
            }
        }
    }

    // Cascade: root watch first, then the registry task (which stops every
    // dependent watcher on its way out).
    root.stop();
    registry.stop();
    info!(ns = %namespace, "topology stream closed");
}

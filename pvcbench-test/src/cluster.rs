//! An in-process fake Kubernetes API server for claim/volume lifecycle tests.
//!
//! The fake models just enough of the core/v1 API for the pvcbench client:
//! namespaced claim create/get/list/delete and cluster-scoped volume
//! get/list, plus a tiny state machine driving claim binding and volume
//! release so that wait loops have real phase transitions to observe.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};

/// Knobs for the fake cluster's phase transitions.
#[derive(Clone, Copy, Debug)]
pub struct ClusterBehavior {
    /// Number of status reads before a pending claim reports `Bound` and a
    /// backing volume appears. `None` means claims never bind.
    pub bind_after_polls: Option<u32>,
    /// Number of volume reads after the owning claim was deleted before the
    /// volume disappears (reads return 404 from then on).
    pub release_after_polls: u32,
    /// When set, every volume read fails with a 500.
    pub fail_volume_reads: bool,
}

impl Default for ClusterBehavior {
    fn default() -> Self {
        Self {
            bind_after_polls: Some(2),
            release_after_polls: 2,
            fail_volume_reads: false,
        }
    }
}

#[derive(Debug)]
struct ClaimRecord {
    namespace: String,
    manifest: Value,
    phase: String,
    polls: u32,
    volume_name: Option<String>,
}

#[derive(Debug)]
struct VolumeRecord {
    phase: String,
    released: bool,
    polls_after_release: u32,
}

#[derive(Debug, Default)]
struct ClusterState {
    behavior: ClusterBehavior,
    claims: HashMap<String, ClaimRecord>,
    volumes: HashMap<String, VolumeRecord>,
    delete_counts: HashMap<String, u32>,
}

type SharedState = Arc<Mutex<ClusterState>>;

/// An in-process fake Kubernetes API server.
///
/// It listens on a random available port on localhost and is torn down when
/// dropped.
#[derive(Debug)]
pub struct TestCluster {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: SharedState,
}

impl TestCluster {
    /// Starts a fake cluster with the given behavior.
    pub fn new(behavior: ClusterBehavior) -> Self {
        let state: SharedState = Arc::new(Mutex::new(ClusterState {
            behavior,
            ..Default::default()
        }));

        let router = Router::new()
            .route(
                "/api/v1/namespaces/{ns}/persistentvolumeclaims",
                routing::get(list_claims).post(create_claim),
            )
            .route(
                "/api/v1/namespaces/{ns}/persistentvolumeclaims/{name}",
                routing::get(get_claim).delete(delete_claim),
            )
            .route("/api/v1/persistentvolumeclaims", routing::get(list_claims))
            .route("/api/v1/persistentvolumes", routing::get(list_volumes))
            .route("/api/v1/persistentvolumes/{name}", routing::get(get_volume))
            .with_state(Arc::clone(&state));

        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// The base URL of the fake API server.
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.socket.port())
    }

    /// Whether a claim with the given name currently exists.
    pub fn claim_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().claims.contains_key(name)
    }

    /// The number of claims currently stored.
    pub fn claim_count(&self) -> usize {
        self.state.lock().unwrap().claims.len()
    }

    /// Whether a volume with the given name currently exists.
    pub fn volume_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().volumes.contains_key(name)
    }

    /// How many DELETE calls were made against the given claim name.
    pub fn delete_count(&self, name: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .delete_counts
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn status_error(code: StatusCode, reason: &str, message: String) -> Response {
    let body = json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code.as_u16(),
    });
    (code, Json(body)).into_response()
}

fn not_found(kind: &str, name: &str) -> Response {
    status_error(
        StatusCode::NOT_FOUND,
        "NotFound",
        format!("{kind} \"{name}\" not found"),
    )
}

fn render_claim(name: &str, record: &ClaimRecord) -> Value {
    let mut spec = record
        .manifest
        .get("spec")
        .cloned()
        .unwrap_or_else(|| json!({}));
    if let Some(volume_name) = &record.volume_name {
        spec["volumeName"] = json!(volume_name);
    }

    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": {
            "name": name,
            "namespace": record.namespace,
            "resourceVersion": "1",
            "annotations": record.manifest.pointer("/metadata/annotations").cloned().unwrap_or(json!({})),
        },
        "spec": spec,
        "status": { "phase": record.phase },
    })
}

fn render_volume(name: &str, record: &VolumeRecord) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolume",
        "metadata": { "name": name, "resourceVersion": "1" },
        "spec": {},
        "status": { "phase": record.phase },
    })
}

async fn create_claim(
    State(state): State<SharedState>,
    Path(ns): Path<String>,
    Json(manifest): Json<Value>,
) -> Response {
    let Some(name) = manifest
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .map(str::to_owned)
    else {
        return status_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Invalid",
            "metadata.name is required".into(),
        );
    };

    let mut state = state.lock().unwrap();
    if state.claims.contains_key(&name) {
        return status_error(
            StatusCode::CONFLICT,
            "AlreadyExists",
            format!("persistentvolumeclaims \"{name}\" already exists"),
        );
    }

    let record = ClaimRecord {
        namespace: ns,
        manifest,
        phase: "Pending".to_owned(),
        polls: 0,
        volume_name: None,
    };
    let rendered = render_claim(&name, &record);
    state.claims.insert(name, record);

    (StatusCode::CREATED, Json(rendered)).into_response()
}

async fn get_claim(
    State(state): State<SharedState>,
    Path((_ns, name)): Path<(String, String)>,
) -> Response {
    let mut state = state.lock().unwrap();
    let behavior = state.behavior;

    let Some(record) = state.claims.get_mut(&name) else {
        return not_found("persistentvolumeclaims", &name);
    };

    record.polls += 1;
    let should_bind = record.phase != "Bound"
        && behavior
            .bind_after_polls
            .is_some_and(|polls| record.polls >= polls);
    if should_bind {
        record.phase = "Bound".to_owned();
        record.volume_name = Some(format!("pv-{name}"));
    }
    let rendered = render_claim(&name, record);

    if should_bind {
        state.volumes.insert(
            format!("pv-{name}"),
            VolumeRecord {
                phase: "Bound".to_owned(),
                released: false,
                polls_after_release: 0,
            },
        );
    }

    Json(rendered).into_response()
}

async fn delete_claim(
    State(state): State<SharedState>,
    Path((_ns, name)): Path<(String, String)>,
) -> Response {
    let mut state = state.lock().unwrap();
    *state.delete_counts.entry(name.clone()).or_default() += 1;

    let Some(record) = state.claims.remove(&name) else {
        return not_found("persistentvolumeclaims", &name);
    };

    if let Some(volume_name) = record.volume_name
        && let Some(volume) = state.volumes.get_mut(&volume_name)
    {
        volume.phase = "Released".to_owned();
        volume.released = true;
    }

    Json(json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Success",
        "code": 200,
    }))
    .into_response()
}

async fn list_claims(State(state): State<SharedState>) -> Response {
    let state = state.lock().unwrap();
    let items: Vec<_> = state
        .claims
        .iter()
        .map(|(name, record)| render_claim(name, record))
        .collect();

    Json(json!({
        "kind": "PersistentVolumeClaimList",
        "apiVersion": "v1",
        "metadata": { "resourceVersion": "1" },
        "items": items,
    }))
    .into_response()
}

async fn get_volume(State(state): State<SharedState>, Path(name): Path<String>) -> Response {
    let mut state = state.lock().unwrap();
    let behavior = state.behavior;

    if behavior.fail_volume_reads {
        return status_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "InternalError",
            "injected volume read failure".into(),
        );
    }

    let Some(record) = state.volumes.get_mut(&name) else {
        return not_found("persistentvolumes", &name);
    };

    if record.released {
        record.polls_after_release += 1;
        if record.polls_after_release >= behavior.release_after_polls {
            state.volumes.remove(&name);
            return not_found("persistentvolumes", &name);
        }
    }

    Json(render_volume(&name, record)).into_response()
}

async fn list_volumes(State(state): State<SharedState>) -> Response {
    let state = state.lock().unwrap();
    let items: Vec<_> = state
        .volumes
        .iter()
        .map(|(name, record)| render_volume(name, record))
        .collect();

    Json(json!({
        "kind": "PersistentVolumeList",
        "apiVersion": "v1",
        "metadata": { "resourceVersion": "1" },
        "items": items,
    }))
    .into_response()
}

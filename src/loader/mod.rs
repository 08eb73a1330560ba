//! Asynchronous engine reload pipeline.
//!
//! Reload requests are kept ordered by urgency. `build` constructs a fresh
//! engine on a dedicated worker thread; the session handler installs the
//! result only when no session exists.

mod request;

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::engine::{Engine, EngineBuilder};

pub use request::{
    EngineReloadRequest, EngineReloadResponse, ReloadStatus, DEFAULT_RELOAD_PRIORITY,
};

#[derive(Debug, Clone)]
struct RequestData {
    id: u64,
    priority: u32,
    sequence_id: u64,
    request: EngineReloadRequest,
}

#[derive(Debug, Default)]
struct PendingRequests {
    /// Sorted by (priority asc, sequence_id desc); the front is built next.
    requests: Vec<RequestData>,
    unregistered: HashSet<u64>,
    sequence_id: u64,
}

impl PendingRequests {
    fn front_id(&self) -> u64 {
        self.requests.first().map(|r| r.id).unwrap_or(0)
    }

    fn sort(&mut self) {
        self.requests.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.sequence_id.cmp(&a.sequence_id))
        });
    }
}

/// Result of a build, owning the new engine on success.
#[derive(Debug)]
pub struct LoaderResponse {
    pub id: u64,
    pub response: EngineReloadResponse,
    pub engine: Option<Engine>,
}

impl LoaderResponse {
    fn failed(id: u64, request: Option<EngineReloadRequest>, status: ReloadStatus) -> Self {
        Self {
            id,
            response: EngineReloadResponse {
                status,
                request_id: id,
                request,
            },
            engine: None,
        }
    }

    pub fn status(&self) -> ReloadStatus {
        self.response.status
    }
}

#[derive(Debug)]
enum BuildState {
    Running(JoinHandle<LoaderResponse>),
    Finished(LoaderResponse),
}

/// Handle to an in-flight build.
#[derive(Debug)]
pub struct BuildHandle {
    id: u64,
    state: BuildState,
}

impl BuildHandle {
    /// Fingerprint of the request being built.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_ready(&self) -> bool {
        match &self.state {
            BuildState::Running(handle) => handle.is_finished(),
            BuildState::Finished(_) => true,
        }
    }

    /// The result, once the build has been waited on.
    pub fn response(&self) -> Option<&LoaderResponse> {
        match &self.state {
            BuildState::Finished(response) => Some(response),
            BuildState::Running(_) => None,
        }
    }

    /// Block until the build finishes, keeping the result in the handle.
    pub fn wait(self) -> Self {
        let id = self.id;
        Self {
            id,
            state: BuildState::Finished(self.into_response()),
        }
    }

    /// Block until the build finishes.
    pub fn into_response(self) -> LoaderResponse {
        match self.state {
            BuildState::Finished(response) => response,
            BuildState::Running(handle) => match handle.join() {
                Ok(response) => response,
                Err(_) => {
                    warn!(request_id = self.id, "engine build thread panicked");
                    LoaderResponse::failed(self.id, None, ReloadStatus::UnknownError)
                }
            },
        }
    }
}

/// Priority-ordered reload requests plus the engine build worker.
pub struct DataLoader {
    builder: Arc<dyn EngineBuilder>,
    pending: Arc<RwLock<PendingRequests>>,
}

impl DataLoader {
    pub fn new(builder: Arc<dyn EngineBuilder>) -> Self {
        Self {
            builder,
            pending: Arc::new(RwLock::new(PendingRequests::default())),
        }
    }

    /// Stable, non-zero identity of a request's content.
    pub fn fingerprint(request: &EngineReloadRequest) -> u64 {
        let bytes = serde_json::to_vec(request)
            .unwrap_or_else(|_| format!("{:?}", request).into_bytes());
        let digest = Sha256::digest(&bytes);
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest[..8]);
        match u64::from_le_bytes(raw) {
            0 => 1,
            id => id,
        }
    }

    /// Register a request and return the id of the request now at the front.
    pub fn register_request(&self, request: &EngineReloadRequest) -> u64 {
        let id = Self::fingerprint(request);
        let mut pending = self.pending.write();

        if pending.front_id() == id {
            return id;
        }
        if pending.unregistered.contains(&id) {
            debug!(request_id = id, "ignoring previously unregistered reload request");
            return pending.front_id();
        }

        pending.sequence_id += 1;
        let sequence_id = pending.sequence_id;
        match pending.requests.iter_mut().find(|r| r.id == id) {
            Some(existing) => {
                existing.priority = request.priority;
                existing.sequence_id = sequence_id;
                existing.request = request.clone();
            }
            None => pending.requests.push(RequestData {
                id,
                priority: request.priority,
                sequence_id,
                request: request.clone(),
            }),
        }
        pending.sort();

        debug!(
            request_id = id,
            priority = request.priority,
            front = pending.front_id(),
            "reload request registered"
        );
        pending.front_id()
    }

    /// Drop a request and remember it so late resubmissions are ignored.
    pub fn unregister_request(&self, id: u64) -> u64 {
        let mut pending = self.pending.write();
        pending.requests.retain(|r| r.id != id);
        pending.unregistered.insert(id);
        pending.front_id()
    }

    /// Id of the most urgent pending request, or 0.
    pub fn front_id(&self) -> u64 {
        self.pending.read().front_id()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.read().requests.len()
    }

    /// Discard every pending request and restart sequence numbering.
    pub fn clear(&self) {
        let mut pending = self.pending.write();
        pending.requests.clear();
        pending.sequence_id = 0;
    }

    /// Start building the engine for request `id` on a worker thread.
    pub fn build(&self, id: u64) -> BuildHandle {
        let builder = self.builder.clone();
        let pending = self.pending.clone();
        let spawned = thread::Builder::new()
            .name("engine-loader".into())
            .spawn(move || build_engine(builder.as_ref(), &pending, id));

        let state = match spawned {
            Ok(handle) => BuildState::Running(handle),
            Err(e) => {
                warn!(request_id = id, error = %e, "failed to spawn loader thread");
                BuildState::Finished(LoaderResponse::failed(id, None, ReloadStatus::UnknownError))
            }
        };
        BuildHandle { id, state }
    }
}

fn build_engine(
    builder: &dyn EngineBuilder,
    pending: &RwLock<PendingRequests>,
    id: u64,
) -> LoaderResponse {
    let request = {
        let pending = pending.read();
        pending
            .requests
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.request.clone())
    };
    let Some(request) = request else {
        debug!(request_id = id, "reload request no longer pending");
        return LoaderResponse::failed(id, None, ReloadStatus::DataMissing);
    };

    let modules = match builder.build(&request.file_path, request.magic_number.as_deref()) {
        Ok(modules) => modules,
        Err(e) => {
            warn!(request_id = id, path = %request.file_path.display(), error = %e, "engine data rejected");
            let status = ReloadStatus::from(&e);
            return LoaderResponse::failed(id, Some(request), status);
        }
    };

    if let Some(location) = &request.install_location {
        if let Err(e) = install_data_file(&request.file_path, location) {
            warn!(request_id = id, location = %location.display(), error = %e, "failed to install data file");
            return LoaderResponse::failed(id, Some(request), ReloadStatus::InstallFailure);
        }
    }

    let engine = match Engine::new(modules) {
        Ok(engine) => engine,
        Err(e) => {
            warn!(request_id = id, error = %e, "failed to initialize engine");
            return LoaderResponse::failed(id, Some(request), ReloadStatus::DataBroken);
        }
    };

    info!(
        request_id = id,
        entries = engine.entry_count(),
        "engine built, ready to reload"
    );
    LoaderResponse {
        id,
        response: EngineReloadResponse {
            status: ReloadStatus::ReloadReady,
            request_id: id,
            request: Some(request),
        },
        engine: Some(engine),
    }
}

/// Copy `source` to `target` through a temporary sibling and a rename.
fn install_data_file(source: &Path, target: &Path) -> std::io::Result<()> {
    if source == target {
        return Ok(());
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".into());
    let staging = target.with_file_name(format!(".{}.installing", file_name));

    let result = fs::copy(source, &staging).and_then(|_| fs::rename(&staging, target));
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

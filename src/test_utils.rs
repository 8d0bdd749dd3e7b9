// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a mocked Kubernetes API and an on-disk workspace for building plans.

use crate::config::Config;
use crate::deploy::auth_mode::PollSettings;
use crate::deploy::backend::{
    ChartInstaller, ClusterApi, ClusterState, ImageBuilder, ManifestApplier, UpdateStatus,
};
use crate::error::{Result as StackResult, StackError};
use crate::types::handles::AuthenticationMode;
use crate::types::resource::{HelmChart, ImageAsset, Manifest};
use crate::types::AccessEntry;
use async_trait::async_trait;
use http::{Request, Response};
use kube::client::Body;
use kube::Client;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::TempDir;
use tower::Service;

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(("GET".to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    /// Add a response for POST requests matching the exact path
    pub fn on_post(self, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(("POST".to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    /// Add a response for PATCH requests (server-side apply) matching the exact path
    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(("PATCH".to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "https://kubernetes.default.svc")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();

        // Try exact match first
        if let Some(resp) = responses.get(&(method.to_string(), path.to_string())) {
            return Some(resp.clone());
        }

        // Try prefix match for paths like /api/v1/namespaces/foo
        for ((m, p), resp) in responses.iter() {
            if m == method && path.starts_with(p) {
                return Some(resp.clone());
            }
        }

        None
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let response = self.find_response(&method, &path);

        Box::pin(async move {
            match response {
                Some((status, body)) => Ok(Response::builder()
                    .status(status)
                    .header("content-type", "application/json")
                    .body(Body::from(body.into_bytes()))
                    .unwrap()),
                None => {
                    // Default 404 for unmatched requests
                    let body = r#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"not found","reason":"NotFound","code":404}"#;
                    Ok(Response::builder()
                        .status(404)
                        .header("content-type", "application/json")
                        .body(Body::from(body.as_bytes().to_vec()))
                        .unwrap())
                }
            }
        })
    }
}

/// Create a mock namespace JSON response
pub fn namespace_json(name: &str) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "uid": "test-uid"
        }
    })
    .to_string()
}

/// Discovery response listing a single resource of a group version
pub fn api_resource_list_json(group_version: &str, plural: &str, kind: &str, namespaced: bool) -> String {
    serde_json::json!({
        "kind": "APIResourceList",
        "apiVersion": "v1",
        "groupVersion": group_version,
        "resources": [{
            "name": plural,
            "singularName": kind.to_lowercase(),
            "namespaced": namespaced,
            "kind": kind,
            "verbs": ["create", "delete", "get", "list", "patch", "update", "watch"]
        }]
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

const TEMPLATE: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: streamlit
spec:
  template:
    spec:
      containers:
        - name: streamlit
          image: __IMAGE__
---
apiVersion: v1
kind: Service
metadata:
  name: streamlit
"#;

/// A build context and manifest template in a temporary directory, plus a
/// configuration pointing at them. Keep the directory alive for the test.
pub fn make_workspace() -> (TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let context = dir.path().join("docker");
    fs::create_dir(&context).unwrap();
    fs::write(context.join("Dockerfile"), "FROM python:3.11-slim\n").unwrap();
    fs::write(dir.path().join("streamlit.yaml"), TEMPLATE).unwrap();

    let mut config = Config::new(
        "123456789012",
        "eu-central-1",
        "arn:aws:iam::123456789012:role/admin",
    );
    config.build_context = context;
    config.manifest_template = dir.path().join("streamlit.yaml");
    (dir, config)
}

/// Millisecond polling so backoff loops finish quickly
pub fn make_poll() -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(4),
        timeout: Duration::from_millis(50),
    }
}

/// Calls recorded by the fake backends, shared to check ordering across them
pub type CallLog = Arc<Mutex<Vec<String>>>;

fn record(log: &CallLog, call: String) {
    log.lock().unwrap().push(call);
}

/// Pop the next scripted value, repeating the last one once the script runs out
fn next_scripted<T: Clone>(script: &Mutex<VecDeque<T>>, fallback: T) -> T {
    let mut script = script.lock().unwrap();
    if script.len() > 1 {
        script.pop_front().unwrap()
    } else {
        script.front().cloned().unwrap_or(fallback)
    }
}

pub struct FakeCluster {
    log: CallLog,
    states: Mutex<VecDeque<ClusterState>>,
    statuses: Mutex<VecDeque<UpdateStatus>>,
    mode: Mutex<AuthenticationMode>,
    fail_update: bool,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            states: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            mode: Mutex::new(AuthenticationMode::ConfigMap),
            fail_update: false,
        }
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn with_states(self, states: Vec<ClusterState>) -> Self {
        *self.states.lock().unwrap() = states.into();
        self
    }

    pub fn with_statuses(self, statuses: Vec<UpdateStatus>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    pub fn with_mode(self, mode: AuthenticationMode) -> Self {
        *self.mode.lock().unwrap() = mode;
        self
    }

    pub fn failing_update(mut self) -> Self {
        self.fail_update = true;
        self
    }

    /// Number of recorded calls whose name starts with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn cluster_state(&self, cluster: &str) -> StackResult<ClusterState> {
        record(&self.log, format!("cluster_state:{}", cluster));
        Ok(next_scripted(&self.states, ClusterState::Active))
    }

    async fn authentication_mode(&self, cluster: &str) -> StackResult<AuthenticationMode> {
        record(&self.log, format!("auth_mode:{}", cluster));
        Ok(*self.mode.lock().unwrap())
    }

    async fn update_authentication_mode(
        &self,
        cluster: &str,
        mode: AuthenticationMode,
    ) -> StackResult<String> {
        record(&self.log, format!("update_mode:{}:{}", cluster, mode));
        if self.fail_update {
            return Err(StackError::Eks("AccessDeniedException".to_string()));
        }
        Ok("update-1".to_string())
    }

    async fn update_status(&self, cluster: &str, update_id: &str) -> StackResult<UpdateStatus> {
        record(&self.log, format!("update_status:{}:{}", cluster, update_id));
        let status = next_scripted(&self.statuses, UpdateStatus::Successful);
        if status == UpdateStatus::Successful {
            *self.mode.lock().unwrap() = AuthenticationMode::ApiAndConfigMap;
        }
        Ok(status)
    }

    async fn create_access_entry(&self, entry: &AccessEntry) -> StackResult<()> {
        record(&self.log, format!("access_entry:{}", entry.principal_arn));
        Ok(())
    }
}

pub struct FakeImageBuilder {
    log: CallLog,
    fail: bool,
}

impl FakeImageBuilder {
    pub fn new(log: CallLog) -> Self {
        Self { log, fail: false }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl ImageBuilder for FakeImageBuilder {
    async fn build_and_push(&self, asset: &ImageAsset) -> StackResult<()> {
        record(&self.log, format!("build:{}", asset.image.tag()));
        if self.fail {
            return Err(StackError::ImageBuild("docker build exited with 1".to_string()));
        }
        Ok(())
    }
}

pub struct FakeApplier {
    log: CallLog,
}

impl FakeApplier {
    pub fn new(log: CallLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl ManifestApplier for FakeApplier {
    async fn apply(&self, manifest: &Manifest) -> StackResult<usize> {
        record(&self.log, format!("apply:{}", manifest.objects.len()));
        Ok(manifest.objects.len())
    }
}

pub struct FakeCharts {
    log: CallLog,
    fail_release: Option<String>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeCharts {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            fail_release: None,
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, release: &str) -> Self {
        self.fail_release = Some(release.to_string());
        self
    }

    /// Hold every install open for `delay` so overlapping installs show up in `peak`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Most installs seen running at the same time
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChartInstaller for FakeCharts {
    async fn install(&self, chart: &HelmChart) -> StackResult<()> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        record(&self.log, format!("chart:{}", chart.release));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_release.as_deref() == Some(chart.release.as_str()) {
            return Err(StackError::ChartInstall(format!("{} failed", chart.release)));
        }
        Ok(())
    }
}

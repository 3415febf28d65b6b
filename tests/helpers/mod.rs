//! In-memory collaborators and local HTTP servers for pipeline tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use mediagen_worker::models::notification::NotificationPayload;
use mediagen_worker::models::work_item::{StatusUpdate, WorkItem, WorkKind, WorkStatus};
use mediagen_worker::services::inference::{
    InferenceEngine, InferenceError, InferenceInput, InferenceOutput,
};
use mediagen_worker::services::notifier::Notifier;
use mediagen_worker::services::storage::{ArtifactSink, StorageError};
use mediagen_worker::services::store::{StoreError, WorkItemStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Vec-backed store that keeps insertion order as its natural order.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<Vec<WorkItem>>,
    unreachable: AtomicBool,
    fail_update_for: Mutex<Option<Uuid>>,
    closed: AtomicBool,
    find_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn with_items(items: Vec<WorkItem>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Default::default()
        }
    }

    pub fn get(&self, id: Uuid) -> WorkItem {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .expect("item exists")
    }

    pub fn all(&self) -> Vec<WorkItem> {
        self.items.lock().unwrap().clone()
    }

    pub fn count(&self, status: WorkStatus) -> usize {
        self.items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.status == status)
            .count()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn fail_update_for(&self, id: Uuid) {
        *self.fail_update_for.lock().unwrap() = Some(id);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkItemStore for MemoryStore {
    async fn find_pending(
        &self,
        kind: WorkKind,
        scope: Option<&str>,
        limit: u32,
    ) -> Result<Vec<WorkItem>, StoreError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;

        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.status == WorkStatus::Pending && item.kind == kind)
            .filter(|item| scope.map_or(true, |s| item.dataset_id.as_deref() == Some(s)))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: Uuid, update: &StatusUpdate) -> Result<(), StoreError> {
        self.check_reachable()?;
        if *self.fail_update_for.lock().unwrap() == Some(id) {
            return Err(StoreError::Unavailable("write timed out".to_string()));
        }

        let mut items = self.items.lock().unwrap();
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(StoreError::NotFound(id))?;
        item.apply(update, Utc::now());
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_reachable()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Engine whose answers are scripted per input string. Unscripted inputs fail.
#[derive(Default)]
pub struct ScriptedEngine {
    answers: HashMap<String, Result<InferenceOutput, String>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    released: AtomicBool,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn caption(mut self, input: &str, text: &str) -> Self {
        self.answers.insert(
            input.to_string(),
            Ok(InferenceOutput::Caption {
                text: text.to_string(),
                confidence: None,
            }),
        );
        self
    }

    pub fn image(mut self, input: &str, bytes: &[u8]) -> Self {
        self.answers.insert(
            input.to_string(),
            Ok(InferenceOutput::Image {
                bytes: bytes.to_vec(),
                content_type: "image/png".to_string(),
            }),
        );
        self
    }

    pub fn failure(mut self, input: &str, message: &str) -> Self {
        self.answers
            .insert(input.to_string(), Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    fn model_id(&self) -> &str {
        "@cf/test/scripted"
    }

    async fn infer(&self, input: &InferenceInput) -> Result<InferenceOutput, InferenceError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(InferenceError::Released);
        }

        let key = match input {
            InferenceInput::ImageRef(reference) => reference.clone(),
            InferenceInput::Prompt(prompt) => prompt.clone(),
        };
        self.calls.lock().unwrap().push(key.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.answers.get(&key) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(message)) => Err(InferenceError::Api {
                status: 500,
                body: message.clone(),
            }),
            None => Err(InferenceError::EmptyOutput),
        }
    }

    async fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// HashMap-backed artifact sink using `mem://` references.
#[derive(Default)]
pub struct MemorySink {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.failing.store(true, Ordering::SeqCst);
        sink
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn store(
        &self,
        data: &[u8],
        name: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Status {
                status: 503,
                key: name.to_string(),
            });
        }
        let reference = format!("mem://artifacts/{}", name);
        self.objects
            .lock()
            .unwrap()
            .insert(reference.clone(), data.to_vec());
        Ok(reference)
    }

    async fn delete(&self, reference: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(reference);
        Ok(())
    }

    async fn fetch(&self, reference: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.objects.lock().unwrap().get(reference).cloned())
    }
}

/// Keeps every payload it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotificationPayload>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<NotificationPayload> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, payload: &NotificationPayload) {
        self.sent.lock().unwrap().push(payload.clone());
    }
}

/// Serve `app` on an ephemeral localhost port and return its base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{}", addr)
}

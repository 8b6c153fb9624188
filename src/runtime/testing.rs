//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use crate::generation::{GenerationError, GenerationRequest, ImageService};
use crate::job::{Job, JobId, JobStatus, RequestKind, UserId};
use crate::queue::JobExecutor;
use crate::rate_limiter::RateLimitSettings;
use crate::state_machine::ImageRef;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Mock Notifier
// ============================================================================

/// A message the bot tried to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        user_id: UserId,
        text: String,
    },
    Image {
        user_id: UserId,
        image: ImageRef,
        caption: String,
    },
    Menu {
        user_id: UserId,
        text: String,
    },
}

/// Notifier that records everything it is asked to send
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<Sent>>,
    fail: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery fail (after recording it)
    pub fn fail_all(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    fn record(&self, message: Sent) -> Result<(), String> {
        self.sent.lock().unwrap().push(message);
        if self.fail.load(Ordering::SeqCst) {
            Err("mock delivery failure".to_string())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_text(&self, user_id: UserId, text: &str) -> Result<(), String> {
        self.record(Sent::Text {
            user_id,
            text: text.to_string(),
        })
    }

    async fn send_image(
        &self,
        user_id: UserId,
        image: &ImageRef,
        caption: &str,
    ) -> Result<(), String> {
        self.record(Sent::Image {
            user_id,
            image: image.clone(),
            caption: caption.to_string(),
        })
    }

    async fn show_menu(&self, user_id: UserId, text: &str) -> Result<(), String> {
        self.record(Sent::Menu {
            user_id,
            text: text.to_string(),
        })
    }
}

// ============================================================================
// Mock Generator
// ============================================================================

/// Arguments of one `generate` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateCall {
    pub images: Vec<ImageRef>,
    pub brief: String,
    pub kind: RequestKind,
}

/// Generator that returns queued results
#[derive(Default)]
pub struct MockGenerator {
    results: Mutex<VecDeque<Result<ImageRef, GenerationError>>>,
    calls: Mutex<Vec<GenerateCall>>,
    panic_next: AtomicBool,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_result(&self, result: Result<ImageRef, GenerationError>) {
        self.results.lock().unwrap().push_back(result);
    }

    /// Panic inside the next call
    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn recorded_calls(&self) -> Vec<GenerateCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for MockGenerator {
    async fn generate(
        &self,
        images: &[ImageRef],
        brief: &str,
        kind: RequestKind,
    ) -> Result<ImageRef, GenerationError> {
        self.calls.lock().unwrap().push(GenerateCall {
            images: images.to_vec(),
            brief: brief.to_string(),
            kind,
        });
        assert!(
            !self.panic_next.swap(false, Ordering::SeqCst),
            "mock generator exploded"
        );
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::network("No mock result queued")))
    }
}

/// `ImageService` double for the service-level wrappers
pub struct MockImageService {
    model_id: String,
    results: Mutex<VecDeque<Result<ImageRef, GenerationError>>>,
    calls: AtomicUsize,
}

impl MockImageService {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            results: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn queue_result(&self, result: Result<ImageRef, GenerationError>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageService for MockImageService {
    async fn generate(&self, _request: &GenerationRequest<'_>) -> Result<ImageRef, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::network("No mock result queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// In-Memory Job Store
// ============================================================================

/// Job store keeping every saved snapshot
#[derive(Default)]
pub struct InMemoryJobStore {
    history: Mutex<HashMap<JobId, Vec<Job>>>,
    failing: Mutex<HashSet<&'static str>>,
    settings: Mutex<Option<RateLimitSettings>>,
    settings_unreadable: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to save jobs in this status
    pub fn fail_on_status(&self, status: JobStatus) {
        self.failing.lock().unwrap().insert(status.as_str());
    }

    pub fn set_settings(&self, settings: RateLimitSettings) {
        *self.settings.lock().unwrap() = Some(settings);
    }

    /// Make `load_settings` fail
    pub fn break_settings(&self) {
        self.settings_unreadable.store(true, Ordering::SeqCst);
    }

    pub fn settings(&self) -> Option<RateLimitSettings> {
        *self.settings.lock().unwrap()
    }

    /// Statuses of every successful save, oldest first
    pub fn statuses(&self, id: JobId) -> Vec<JobStatus> {
        self.history
            .lock()
            .unwrap()
            .get(&id)
            .map(|saves| saves.iter().map(Job::status).collect())
            .unwrap_or_default()
    }

    /// Latest saved snapshot
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.history
            .lock()
            .unwrap()
            .get(&id)
            .and_then(|saves| saves.last().cloned())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save_job(&self, job: &Job) -> Result<(), String> {
        if self.failing.lock().unwrap().contains(job.status().as_str()) {
            return Err(format!("mock store refuses {} jobs", job.status()));
        }
        self.history
            .lock()
            .unwrap()
            .entry(job.id())
            .or_default()
            .push(job.clone());
        Ok(())
    }

    async fn load_settings(&self) -> Result<Option<RateLimitSettings>, String> {
        if self.settings_unreadable.load(Ordering::SeqCst) {
            return Err("mock settings row is unreadable".to_string());
        }
        Ok(*self.settings.lock().unwrap())
    }

    async fn save_settings(&self, settings: RateLimitSettings) -> Result<(), String> {
        *self.settings.lock().unwrap() = Some(settings);
        Ok(())
    }
}

// ============================================================================
// Recording Executor
// ============================================================================

/// Executor that records dispatch order and time
#[derive(Default)]
pub struct RecordingExecutor {
    executed: Mutex<Vec<(Job, Instant)>>,
    finished: AtomicUsize,
    hang: bool,
    delay: Option<Duration>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executions never finish
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    /// Executions take `delay` to finish
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn executed(&self) -> Vec<(Job, Instant)> {
        self.executed.lock().unwrap().clone()
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobExecutor for RecordingExecutor {
    async fn execute(&self, job: Job) {
        self.executed.lock().unwrap().push((job, Instant::now()));
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

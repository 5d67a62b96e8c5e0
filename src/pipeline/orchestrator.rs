use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::StreamEvent;
use super::formatter::{Section, format_response};
use super::{knowledge, prompt, thinking_filter};
use crate::error::PipelineError;
use crate::models::{ChatMessage, PetProfile};
use crate::upstream::{BackendFactory, ChatBackend, GenerationParams, UpstreamHandle};

const EVENT_BUFFER: usize = 100;

// ============================================================================
// ASK PIPELINE (shared, one per process)
// ============================================================================

pub struct AskPipeline<F: BackendFactory> {
    upstream: UpstreamHandle<F>,
    api_key: Option<String>,
    params: GenerationParams,
}

impl<F: BackendFactory> AskPipeline<F> {
    pub fn new(factory: F, api_key: Option<String>, params: GenerationParams) -> Self {
        Self {
            upstream: UpstreamHandle::new(factory),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            params,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Starts answering `question` in the background and returns the event
    /// receiver. Dropping the receiver stops the upstream stream.
    pub fn handle_request_stream(
        self: &Arc<Self>,
        question: String,
        profile: Option<PetProfile>,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let pipeline = Arc::clone(self);

        tokio::spawn(async move {
            Orchestrator::new(tx)
                .run(&pipeline, &question, profile.as_ref())
                .await;
        });

        rx
    }
}

/// `[system, user]` for one question. The user turn carries the knowledge
/// snippet when the question names a known food.
pub fn build_messages(question: &str, profile: Option<&PetProfile>) -> Vec<ChatMessage> {
    let knowledge = knowledge::lookup(question);
    vec![
        ChatMessage::system(prompt::build_system_prompt(profile)),
        ChatMessage::user(prompt::build_user_prompt(question, knowledge.as_deref())),
    ]
}

/// Reformatted answer, or `None` when there is nothing to send: empty answer
/// or formatting left it unchanged.
pub fn finalize_answer(answer: &str) -> Option<String> {
    if answer.is_empty() {
        return None;
    }
    let formatted = format_response(answer);
    (formatted != answer).then_some(formatted)
}

// ============================================================================
// ORCHESTRATOR (one per request)
// ============================================================================

pub struct Orchestrator {
    request_id: String,
    event_tx: mpsc::Sender<StreamEvent>,
    started: Instant,
}

impl Orchestrator {
    pub fn new(event_tx: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            request_id: Uuid::now_v7().to_string(),
            event_tx,
            started: Instant::now(),
        }
    }

    async fn emit(&self, event: StreamEvent) -> Result<(), PipelineError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| PipelineError::Disconnected)
    }

    /// Drives one request to its terminal event.
    pub async fn run<F: BackendFactory>(
        self,
        pipeline: &AskPipeline<F>,
        question: &str,
        profile: Option<&PetProfile>,
    ) {
        let result = self.process(pipeline, question, profile).await;
        let elapsed = self.started.elapsed().as_secs_f64();

        match result {
            Ok(()) => {
                log::info!("[{}] ✅ Stream completed in {:.3}s", self.request_id, elapsed);
            }
            Err(PipelineError::Disconnected) => {
                log::info!(
                    "[{}] 🔌 Caller disconnected after {:.3}s, upstream released",
                    self.request_id,
                    elapsed
                );
            }
            Err(err) => {
                match &err {
                    PipelineError::MissingCredential => {
                        log::error!("[{}] ❌ AI service is not configured", self.request_id)
                    }
                    other => log::error!("[{}] ❌ {}", self.request_id, other),
                }
                if let Some(message) = err.user_message() {
                    // Nobody to tell if this fails too.
                    let _ = self.emit(StreamEvent::Error(message.to_string())).await;
                }
            }
        }
    }

    async fn process<F: BackendFactory>(
        &self,
        pipeline: &AskPipeline<F>,
        question: &str,
        profile: Option<&PetProfile>,
    ) -> Result<(), PipelineError> {
        let api_key = pipeline
            .api_key
            .as_deref()
            .ok_or(PipelineError::MissingCredential)?;

        // Before any upstream I/O.
        self.emit(StreamEvent::thinking()).await?;

        let client = pipeline
            .upstream
            .client(api_key)
            .await
            .map_err(PipelineError::ClientInit)?;

        let request = pipeline.params.request(build_messages(question, profile));
        log::debug!(
            "[{}] 📨 Calling {} (max_tokens={}, temperature={}, top_p={})",
            self.request_id,
            request.model,
            request.max_tokens,
            request.temperature,
            request.top_p
        );

        let mut chunks = client.stream_chat(request).await?;
        let mut answer = String::new();
        let mut first_fragment = true;

        loop {
            // Chunks that emit nothing never hit a failed send, so watch the
            // receiver directly.
            let next = tokio::select! {
                biased;
                _ = self.event_tx.closed() => return Err(PipelineError::Disconnected),
                next = chunks.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            let Some(fragment) = chunk.fragment() else {
                continue;
            };

            answer.push_str(fragment);

            let visible = thinking_filter::filter(fragment);
            if visible.is_empty() {
                continue;
            }

            if first_fragment {
                first_fragment = false;
                log::info!(
                    "[{}] ⚡ First fragment after {:.3}s",
                    self.request_id,
                    self.started.elapsed().as_secs_f64()
                );
            }

            self.emit(StreamEvent::Content(visible)).await?;
        }
        drop(chunks);

        log::debug!(
            "[{}] 📝 Raw answer (first 200 chars): {:?}",
            self.request_id,
            answer.chars().take(200).collect::<String>()
        );
        if !answer.is_empty() && !answer.contains(Section::FeedingAdvice.marker()) {
            log::warn!(
                "[{}] ⚠️ Answer has no {} section, possibly truncated by max_tokens",
                self.request_id,
                Section::FeedingAdvice.marker()
            );
        }

        if let Some(formatted) = finalize_answer(&answer) {
            self.emit(StreamEvent::Formatted(formatted)).await?;
        }

        self.emit(StreamEvent::done()).await
    }
}

// ============================================================================
// TESTS
// ============================================================================

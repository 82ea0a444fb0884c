// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat session facade
//!
//! Ties the coordinator, the retrying issuer and stream sessions together
//! behind `upload`, `ask` and `cancel_ask`, and publishes the resulting
//! conversation state through a `watch` channel.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::auth::{SessionProvider, StaticSession};
use crate::client::api::{decode_answer, decode_upload, ChatApi, UploadFile, UploadReceipt};
use crate::client::http::HttpTransport;
use crate::client::retry::{RetryConfig, RetryPolicy, RetryingRequestIssuer};
use crate::client::transport::Transport;
use crate::config::{AskMode, Settings, UserMode};
use crate::conversation::{Conversation, Message, MessageId};
use crate::coordinator::{Completion, OperationCoordinator, Slot};
use crate::error::{ChatError, ErrorInfo, Result};
use crate::outcome::Outcome;
use crate::stream::event::{Citation, Insight, Telemetry};
use crate::stream::session::{StreamResult, StreamSession};

const CLEARED_MESSAGE: &str = "Conversation cleared. Ask a new question about your contract.";

/// Observable session state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub messages: Vec<Message>,
    pub is_uploading: bool,
    pub is_asking: bool,
    /// An ask is running in streaming mode
    pub is_streaming: bool,
    /// Insights of the most recent completed ask
    pub insights: Vec<Insight>,
    /// Contract the conversation is about, set by a successful upload
    pub context_id: Option<String>,
    pub last_telemetry: Option<Telemetry>,
}

impl ChatState {
    pub fn is_loading(&self) -> bool {
        self.is_uploading || self.is_asking
    }
}

/// How a facade operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// A result message was committed
    Succeeded(MessageId),
    /// An error message was committed
    Failed(MessageId),
    /// Cancelled or superseded; nothing was committed
    Discarded,
}

impl Settled {
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Settled::Succeeded(id) | Settled::Failed(id) => Some(*id),
            Settled::Discarded => None,
        }
    }
}

struct Answer {
    text: String,
    citations: Vec<Citation>,
    insights: Vec<Insight>,
    telemetry: Option<Telemetry>,
}

impl From<StreamResult> for Answer {
    fn from(result: StreamResult) -> Self {
        Self {
            text: result.answer,
            citations: result.citations,
            insights: result.insights,
            telemetry: result.telemetry,
        }
    }
}

#[derive(Default)]
struct Shared {
    conversation: Conversation,
    insights: Vec<Insight>,
    context_id: Option<String>,
    last_telemetry: Option<Telemetry>,
}

struct Inner {
    settings: Settings,
    mode: AskMode,
    user_mode: UserMode,
    transport: Arc<dyn Transport>,
    issuer: RetryingRequestIssuer,
    api: ChatApi,
    auth: Arc<dyn SessionProvider>,
    coordinator: OperationCoordinator,
    shared: Mutex<Shared>,
    state_tx: watch::Sender<ChatState>,
}

/// A contract chat conversation
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

/// Builder for creating ChatSession instances
pub struct ChatSessionBuilder {
    settings: Settings,
    transport: Option<Arc<dyn Transport>>,
    auth: Option<Arc<dyn SessionProvider>>,
    mode: Option<AskMode>,
    user_mode: Option<UserMode>,
}

impl ChatSessionBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            transport: None,
            auth: None,
            mode: None,
            user_mode: None,
        }
    }

    /// Use a specific transport instead of the HTTP one
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn SessionProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Override the configured ask mode
    pub fn with_mode(mut self, mode: AskMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_user_mode(mut self, user_mode: UserMode) -> Self {
        self.user_mode = Some(user_mode);
        self
    }

    pub fn build(self) -> Result<ChatSession> {
        self.settings.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::from_settings(&self.settings)?),
        };
        let auth = self
            .auth
            .unwrap_or_else(|| Arc::new(StaticSession::premium()));

        let mut shared = Shared::default();
        let welcome = self.settings.chat.welcome_message.trim();
        if !welcome.is_empty() {
            shared.conversation.push(Message::system(welcome));
        }

        let (state_tx, _) = watch::channel(ChatState::default());
        let inner = Inner {
            mode: self.mode.unwrap_or(self.settings.chat.mode),
            user_mode: self.user_mode.unwrap_or(self.settings.chat.user_mode),
            issuer: RetryingRequestIssuer::new(transport.clone()),
            api: ChatApi::new(&self.settings.backend),
            transport,
            auth,
            coordinator: OperationCoordinator::new(),
            shared: Mutex::new(shared),
            state_tx,
            settings: self.settings,
        };
        inner.publish();

        Ok(ChatSession {
            inner: Arc::new(inner),
        })
    }
}

impl ChatSession {
    pub fn builder(settings: Settings) -> ChatSessionBuilder {
        ChatSessionBuilder::new(settings)
    }

    pub fn mode(&self) -> AskMode {
        self.inner.mode
    }

    pub fn user_mode(&self) -> UserMode {
        self.inner.user_mode
    }

    /// Current state snapshot
    pub fn state(&self) -> ChatState {
        self.inner.snapshot()
    }

    /// Receive every published state change
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.inner.state_tx.subscribe()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock_shared().conversation.messages().to_vec()
    }

    pub fn context_id(&self) -> Option<String> {
        self.inner.lock_shared().context_id.clone()
    }

    /// Upload a contract for indexing, superseding any upload in progress
    pub async fn upload(&self, file: UploadFile) -> Result<Settled> {
        if file.is_empty() {
            return Err(ChatError::InvalidInput(format!(
                "{} is empty",
                file.file_name
            )));
        }
        if let Err(rejection) = self.inner.check_gate() {
            return Ok(self.reject(rejection));
        }

        let inner = self.inner.clone();
        tracing::info!(
            target: "contract_chat.chat",
            file = %file.file_name,
            bytes = file.len(),
            "uploading contract"
        );

        let handle = self.inner.coordinator.run_exclusive(Slot::Upload, |token| {
            let inner = inner.clone();
            async move {
                let outcome = inner.perform_upload(&file, &token).await;
                (file.file_name, outcome)
            }
        });
        let handle = {
            let inner = inner.clone();
            handle.on_abandon(move || inner.publish())
        };
        self.publish();

        let completion = handle
            .settle(|(file_name, outcome)| inner.commit_upload(&file_name, outcome))
            .await;
        self.publish();

        Ok(completion.finished().unwrap_or(Settled::Discarded))
    }

    /// Ask a question, superseding any ask in progress.
    ///
    /// The user message (and, when streaming, an empty placeholder) is in the
    /// conversation before any network activity starts.
    pub async fn ask(&self, question: &str) -> Result<Settled> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::InvalidInput("question is empty".to_string()));
        }
        if let Err(rejection) = self.inner.check_gate() {
            return Ok(self.reject(rejection));
        }

        let inner = self.inner.clone();
        let question = question.to_string();
        let streaming = inner.mode == AskMode::Streaming;
        let mut placeholder = None;

        let handle = self.inner.coordinator.run_exclusive(Slot::Ask, |token| {
            let context_id = {
                let mut shared = inner.lock_shared();
                if let Some(stale) = shared.conversation.discard_in_flight() {
                    tracing::debug!(
                        target: "contract_chat.chat",
                        %stale,
                        "rolled back placeholder of superseded ask"
                    );
                }
                shared.insights.clear();
                shared.conversation.push(Message::user(question.clone()));
                if streaming {
                    placeholder = shared.conversation.push_placeholder().ok();
                }
                shared.context_id.clone()
            };

            let inner = inner.clone();
            async move {
                inner
                    .perform_ask(&question, context_id.as_deref(), &token)
                    .await
            }
        });
        let handle = {
            let inner = inner.clone();
            handle.on_abandon(move || inner.abandon_ask(placeholder))
        };
        self.publish();

        let completion = handle
            .settle(|outcome| inner.commit_ask(placeholder, outcome))
            .await;

        let settled = match completion {
            Completion::Finished(settled) => settled,
            Completion::Discarded => {
                if let Some(id) = placeholder {
                    self.inner.lock_shared().conversation.discard_placeholder(id);
                }
                Settled::Discarded
            }
        };
        self.publish();

        Ok(settled)
    }

    /// Re-ask the most recent question
    pub async fn retry_last(&self) -> Result<Settled> {
        let question = self
            .inner
            .lock_shared()
            .conversation
            .last_question()
            .map(str::to_string);

        match question {
            Some(question) => self.ask(&question).await,
            None => Err(ChatError::InvalidInput(
                "there is no question to retry".to_string(),
            )),
        }
    }

    /// Cancel the current ask and roll back its placeholder. Idempotent.
    pub fn cancel_ask(&self) -> bool {
        let inner = &self.inner;
        let cancelled = inner.coordinator.cancel_with(&[Slot::Ask], |cancelled| {
            inner.lock_shared().conversation.discard_in_flight();
            cancelled > 0
        });
        if cancelled {
            tracing::info!(target: "contract_chat.chat", "ask cancelled");
        }
        self.publish();
        cancelled
    }

    pub fn cancel_upload(&self) -> bool {
        let cancelled = self.inner.coordinator.cancel(Slot::Upload);
        self.publish();
        cancelled
    }

    /// Cancel everything and start over; the contract context is kept
    pub fn clear(&self) {
        let inner = &self.inner;
        inner.coordinator.cancel_with(&Slot::ALL, |_| {
            let mut shared = inner.lock_shared();
            shared
                .conversation
                .replace_all(vec![Message::system(CLEARED_MESSAGE)]);
            shared.insights.clear();
            shared.last_telemetry = None;
        });
        self.publish();
    }

    fn reject(&self, rejection: ErrorInfo) -> Settled {
        tracing::info!(target: "contract_chat.chat", reason = %rejection.message, "operation not allowed");
        let id = self
            .inner
            .lock_shared()
            .conversation
            .push(Message::error(rejection));
        self.publish();
        Settled::Failed(id)
    }

    fn publish(&self) {
        self.inner.publish();
    }
}

impl Inner {
    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Conversation lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn snapshot(&self) -> ChatState {
        let is_uploading = self.coordinator.is_busy(Slot::Upload);
        let is_asking = self.coordinator.is_busy(Slot::Ask);
        let shared = self.lock_shared();
        ChatState {
            messages: shared.conversation.messages().to_vec(),
            is_uploading,
            is_asking,
            is_streaming: is_asking && self.mode == AskMode::Streaming,
            insights: shared.insights.clone(),
            context_id: shared.context_id.clone(),
            last_telemetry: shared.last_telemetry.clone(),
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.snapshot());
    }

    /// The ask was dropped before it settled; its placeholder must not linger
    fn abandon_ask(&self, placeholder: Option<MessageId>) {
        if let Some(id) = placeholder {
            if self.lock_shared().conversation.discard_placeholder(id) {
                tracing::debug!(
                    target: "contract_chat.chat",
                    %id,
                    "rolled back placeholder of abandoned ask"
                );
            }
        }
        self.publish();
    }

    fn check_gate(&self) -> std::result::Result<(), ErrorInfo> {
        let auth = self.auth.snapshot();
        if !auth.is_authenticated {
            return Err(ErrorInfo::client_rejection(
                Some(401),
                "Please sign in to use the contract chat.",
            ));
        }
        if !auth.is_premium_tier {
            return Err(ErrorInfo::client_rejection(
                Some(403),
                "The contract chat is available on the Premium plan.",
            ));
        }
        Ok(())
    }

    fn request_policy(&self) -> RetryPolicy {
        RetryPolicy::new(RetryConfig::from(&self.settings.resilience))
            .with_attempt_timeout(self.settings.request_timeout())
    }

    async fn perform_upload(
        &self,
        file: &UploadFile,
        token: &CancellationToken,
    ) -> Outcome<UploadReceipt> {
        let request = self.api.upload_request(file);
        let policy = self
            .request_policy()
            .with_max_retries(self.settings.resilience.upload_max_retries);

        self.issuer
            .issue(&request, &policy, token)
            .await
            .and_then(|response| decode_upload(&response))
    }

    async fn perform_ask(
        &self,
        question: &str,
        context_id: Option<&str>,
        token: &CancellationToken,
    ) -> Outcome<Answer> {
        match self.mode {
            AskMode::SingleShot => {
                let request = match self.api.ask_request(question, context_id.is_some()) {
                    Ok(request) => request,
                    Err(e) => return Outcome::Failed(encode_failure(e)),
                };
                self.issuer
                    .issue(&request, &self.request_policy(), token)
                    .await
                    .and_then(|response| decode_answer(&response))
                    .map(|text| Answer {
                        text,
                        citations: Vec::new(),
                        insights: Vec::new(),
                        telemetry: None,
                    })
            }
            AskMode::Streaming => {
                let request = match self.api.stream_request(question, context_id, self.user_mode)
                {
                    Ok(request) => request,
                    Err(e) => return Outcome::Failed(encode_failure(e)),
                };
                let mut session = StreamSession::new(self.transport.clone(), token.clone())
                    .with_timeout(self.settings.stream_timeout());
                match session.start(&request).await {
                    Ok(outcome) => outcome.map(Answer::from).map_err(|failure| {
                        if !failure.partial_answer.is_empty() {
                            tracing::debug!(
                                target: "contract_chat.chat",
                                partial_len = failure.partial_answer.len(),
                                "dropping partial answer of failed stream"
                            );
                        }
                        failure.error
                    }),
                    Err(e) => Outcome::Failed(ErrorInfo::protocol(e.to_string())),
                }
            }
        }
    }

    /// Runs inside the coordinator's critical section
    fn commit_upload(&self, file_name: &str, outcome: Outcome<UploadReceipt>) -> Settled {
        let mut shared = self.lock_shared();
        match outcome {
            Outcome::Success(receipt) => {
                let summary = upload_summary(file_name, &receipt);
                if let Some(data) = receipt.data {
                    tracing::info!(
                        target: "contract_chat.chat",
                        contract_id = %data.contract_id,
                        chunks = data.chunks_indexed,
                        "contract indexed"
                    );
                    shared.context_id = Some(data.contract_id);
                }
                Settled::Succeeded(shared.conversation.push(Message::system(summary)))
            }
            Outcome::Failed(error) => {
                tracing::warn!(target: "contract_chat.chat", %error, "upload failed");
                Settled::Failed(shared.conversation.push(Message::error(error)))
            }
            Outcome::Cancelled => Settled::Discarded,
        }
    }

    /// Runs inside the coordinator's critical section
    fn commit_ask(&self, placeholder: Option<MessageId>, outcome: Outcome<Answer>) -> Settled {
        let mut shared = self.lock_shared();
        match outcome {
            Outcome::Success(answer) => {
                shared.insights = answer.insights;
                shared.last_telemetry = answer.telemetry;
                let id = match placeholder {
                    Some(id) if shared.conversation.in_flight() == Some(id) => {
                        shared
                            .conversation
                            .finalize_placeholder(id, answer.text, answer.citations);
                        id
                    }
                    _ => shared
                        .conversation
                        .push(Message::assistant(answer.text, answer.citations)),
                };
                Settled::Succeeded(id)
            }
            Outcome::Failed(error) => {
                if let Some(id) = placeholder {
                    shared.conversation.discard_placeholder(id);
                }
                tracing::warn!(target: "contract_chat.chat", %error, "ask failed");
                Settled::Failed(shared.conversation.push(Message::error(error)))
            }
            Outcome::Cancelled => {
                if let Some(id) = placeholder {
                    shared.conversation.discard_placeholder(id);
                }
                Settled::Discarded
            }
        }
    }
}

fn encode_failure(error: ChatError) -> ErrorInfo {
    ErrorInfo::protocol(format!("could not encode request: {}", error))
}

fn upload_summary(file_name: &str, receipt: &UploadReceipt) -> String {
    match &receipt.data {
        Some(data) => format!(
            "\"{}\" analyzed: {} sections indexed in {:.1}s. You can now ask questions about this contract.",
            file_name,
            data.chunks_indexed,
            data.processing_time_ms as f64 / 1000.0
        ),
        None if !receipt.message.trim().is_empty() => receipt.message.clone(),
        None => format!("\"{}\" uploaded.", file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock_transport::{MockReply, MockTransport};
    use crate::conversation::Role;

    fn session_with(transport: MockTransport, mode: AskMode) -> ChatSession {
        ChatSession::builder(Settings::default())
            .with_transport(Arc::new(transport))
            .with_mode(mode)
            .build()
            .unwrap()
    }

    #[test]
    fn test_welcome_message() {
        let session = session_with(MockTransport::new(), AskMode::Streaming);
        let messages = session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::System);
        assert!(!session.state().is_loading());
    }

    #[test]
    fn test_invalid_settings_fail_build() {
        let mut settings = Settings::default();
        settings.backend.base_url = "ftp://nope".to_string();
        let result = ChatSession::builder(settings)
            .with_transport(Arc::new(MockTransport::new()))
            .build();
        assert!(matches!(result, Err(ChatError::Config(_))));
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let session = session_with(MockTransport::new(), AskMode::SingleShot);
        assert!(matches!(
            session.ask("   ").await,
            Err(ChatError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_single_shot_answer_appended() {
        let transport =
            MockTransport::new().with_reply("/ask", MockReply::ok(r#"{"answer":"Yes."}"#));
        let session = session_with(transport.clone(), AskMode::SingleShot);

        let settled = session.ask("Is there a non-compete?").await.unwrap();

        let messages = session.messages();
        let answer = messages.last().unwrap();
        assert_eq!(settled, Settled::Succeeded(answer.id));
        assert_eq!(answer.role, Role::Assistant);
        assert_eq!(answer.text, "Yes.");
        assert_eq!(messages[messages.len() - 2].text, "Is there a non-compete?");
        assert!(!session.state().is_asking);
    }

    #[test]
    fn test_upload_summary_mentions_counts() {
        let receipt = UploadReceipt {
            message: String::new(),
            data: Some(crate::client::api::UploadData {
                contract_id: "c".into(),
                chunks_indexed: 14,
                processing_time_ms: 2500,
            }),
        };
        let text = upload_summary("nda.pdf", &receipt);
        assert!(text.contains("14 sections"));
        assert!(text.contains("2.5s"));
    }
}

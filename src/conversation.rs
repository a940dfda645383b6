//! One conversational turn: post the user's message, run the assistant,
//! wait for its answer, and categorize the message on the side.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::assistant::{AssistantId, RunLauncher, ThreadId};
use crate::classifier::{Category, Classifier};
use crate::error::TransportError;
use crate::poller::{PollConfig, PollOutcome, RunPoller};

/// Default bound on a side classification.
pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on a single call to the remote service.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// What a turn produced.
#[derive(Debug)]
pub struct ChatReply {
    /// How the wait for the assistant ended.
    pub outcome: PollOutcome,
    /// Category of the user's message; `None` when classification is
    /// disabled, failed or timed out.
    pub category: Option<Category>,
}

/// Drives conversational turns against a fixed assistant.
///
/// Immutable once built; share it behind an `Arc`.
pub struct ChatService {
    launcher: Arc<dyn RunLauncher>,
    poller: RunPoller,
    assistant_id: AssistantId,
    poll: PollConfig,
    classifier: Option<Classifier>,
    classify_timeout: Duration,
    call_timeout: Duration,
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("assistant_id", &self.assistant_id)
            .field("poll", &self.poll)
            .field("classifier", &self.classifier)
            .field("classify_timeout", &self.classify_timeout)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl ChatService {
    pub fn new(
        launcher: Arc<dyn RunLauncher>,
        poller: RunPoller,
        assistant_id: AssistantId,
        poll: PollConfig,
    ) -> Self {
        Self {
            launcher,
            poller,
            assistant_id,
            poll,
            classifier: None,
            classify_timeout: DEFAULT_CLASSIFY_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Upper bound on one remote call, as enforced by the transport.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Categorize each message with `classifier`, giving up after `timeout`.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Classifier, timeout: Duration) -> Self {
        self.classifier = Some(classifier);
        self.classify_timeout = timeout;
        self
    }

    #[must_use]
    pub fn assistant_id(&self) -> &AssistantId {
        &self.assistant_id
    }

    /// Longest a turn can take before [`respond`](Self::respond) returns:
    /// two launch calls, one joined fetch per attempt and the poll budget.
    /// Saturates at [`Duration::MAX`].
    #[must_use]
    pub fn max_turn_duration(&self) -> Duration {
        self.poll
            .max_attempts()
            .checked_add(2)
            .and_then(|calls| self.call_timeout.checked_mul(calls))
            .and_then(|calls| calls.checked_add(self.poll.budget()))
            .unwrap_or(Duration::MAX)
    }

    /// Run one turn on `thread_id`.
    ///
    /// Classification runs alongside the run and never fails the turn.
    /// Errors are returned only when the message could not be posted or
    /// the run could not be started, in which case a pending classification
    /// is dropped; everything after that is reported through
    /// [`ChatReply::outcome`].
    #[instrument(skip_all, fields(thread_id = %thread_id, assistant_id = %self.assistant_id))]
    pub async fn respond(
        &self,
        thread_id: &ThreadId,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, TransportError> {
        let (category, outcome) = tokio::try_join!(
            async { Ok::<_, TransportError>(self.categorize(message).await) },
            self.run_turn(thread_id, message, cancel),
        )?;

        debug!(
            outcome = outcome.kind(),
            category = ?category.as_ref().map(Category::label),
            "turn finished"
        );
        Ok(ChatReply { outcome, category })
    }

    async fn run_turn(
        &self,
        thread_id: &ThreadId,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, TransportError> {
        self.launcher.post_user_message(thread_id, message).await?;
        let run_id = self.launcher.start_run(thread_id, &self.assistant_id).await?;
        debug!(run_id = %run_id, "run started");

        Ok(self
            .poller
            .await_completion(thread_id, &run_id, &self.poll, cancel)
            .await)
    }

    async fn categorize(&self, message: &str) -> Option<Category> {
        let classifier = self.classifier.as_ref()?;
        match tokio::time::timeout(self.classify_timeout, classifier.classify(message)).await {
            Ok(Ok(category)) => Some(category),
            Ok(Err(err)) => {
                warn!(error = %err, "classification failed; replying without a category");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = u64::try_from(self.classify_timeout.as_millis()).unwrap_or(u64::MAX),
                    "classification timed out; replying without a category"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{
        ChatCompleter, ChatPrompt, MessageList, MessageSource, RunId, RunStatus, RunStatusSource,
    };
    use crate::classifier::Vocabulary;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Remote {
        fail_post: bool,
        fetch_delay: Duration,
        posted: Mutex<Vec<(String, String)>>,
        started_with: Mutex<Option<String>>,
    }

    #[async_trait::async_trait]
    impl RunLauncher for Remote {
        async fn post_user_message(
            &self,
            thread_id: &ThreadId,
            content: &str,
        ) -> Result<(), TransportError> {
            if self.fail_post {
                return Err(TransportError::Api {
                    status: 404,
                    message: "No thread found".to_string(),
                });
            }
            self.posted
                .lock()
                .unwrap()
                .push((thread_id.to_string(), content.to_string()));
            Ok(())
        }

        async fn start_run(
            &self,
            _thread_id: &ThreadId,
            assistant_id: &AssistantId,
        ) -> Result<RunId, TransportError> {
            *self.started_with.lock().unwrap() = Some(assistant_id.to_string());
            Ok(RunId::new("run_42"))
        }
    }

    #[async_trait::async_trait]
    impl RunStatusSource for Remote {
        async fn fetch_run_status(
            &self,
            _thread_id: &ThreadId,
            run_id: &RunId,
        ) -> Result<RunStatus, TransportError> {
            assert_eq!(run_id.as_str(), "run_42");
            tokio::time::sleep(self.fetch_delay).await;
            Ok(RunStatus::Completed)
        }
    }

    #[async_trait::async_trait]
    impl MessageSource for Remote {
        async fn fetch_messages(&self, _thread_id: &ThreadId) -> Result<MessageList, TransportError> {
            tokio::time::sleep(self.fetch_delay).await;
            Ok(MessageList::new(serde_json::json!({ "object": "list", "data": [] })))
        }
    }

    /// Completer that answers after `delay`, or fails.
    struct SlowAnswer {
        delay: Duration,
        reply: Option<&'static str>,
    }

    #[async_trait::async_trait]
    impl ChatCompleter for SlowAnswer {
        async fn complete_chat(
            &self,
            _prompt: &ChatPrompt,
            _temperature: f32,
        ) -> Result<String, TransportError> {
            tokio::time::sleep(self.delay).await;
            self.reply
                .map(str::to_string)
                .ok_or_else(|| TransportError::Decode("no choices".to_string()))
        }
    }

    fn service(remote: &Arc<Remote>) -> ChatService {
        let poller = RunPoller::new(
            Arc::clone(remote) as Arc<dyn RunStatusSource>,
            Arc::clone(remote) as Arc<dyn MessageSource>,
        );
        ChatService::new(
            Arc::clone(remote) as Arc<dyn RunLauncher>,
            poller,
            AssistantId::new("asst_1"),
            PollConfig::new(3, Duration::from_millis(100)).unwrap(),
        )
    }

    fn classifier(delay: Duration, reply: Option<&'static str>) -> Classifier {
        Classifier::new(
            Arc::new(SlowAnswer { delay, reply }),
            "gpt-3.5-turbo",
            Vocabulary::restaurant_topics(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn turn_posts_message_runs_assistant_and_classifies() {
        let remote = Arc::new(Remote::default());
        let chat = service(&remote)
            .with_classifier(classifier(Duration::from_millis(50), Some("3")), Duration::from_secs(1));

        let reply = chat
            .respond(&ThreadId::new("thread_9"), "Quiero reservar", &CancellationToken::new())
            .await
            .unwrap();

        assert!(reply.outcome.is_success());
        assert_eq!(reply.category.unwrap().label(), "3");
        assert_eq!(
            remote.posted.lock().unwrap().as_slice(),
            &[("thread_9".to_string(), "Quiero reservar".to_string())]
        );
        assert_eq!(remote.started_with.lock().unwrap().as_deref(), Some("asst_1"));
    }

    #[tokio::test(start_paused = true)]
    async fn classification_failure_leaves_category_empty() {
        let remote = Arc::new(Remote::default());
        let chat = service(&remote)
            .with_classifier(classifier(Duration::ZERO, None), Duration::from_secs(1));

        let reply = chat
            .respond(&ThreadId::new("thread_9"), "hola", &CancellationToken::new())
            .await
            .unwrap();

        assert!(reply.outcome.is_success());
        assert!(reply.category.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_classification_is_abandoned_after_timeout() {
        let remote = Arc::new(Remote::default());
        let chat = service(&remote).with_classifier(
            classifier(Duration::from_secs(60), Some("1")),
            Duration::from_secs(2),
        );

        let started = tokio::time::Instant::now();
        let reply = chat
            .respond(&ThreadId::new("thread_9"), "hola", &CancellationToken::new())
            .await
            .unwrap();

        assert!(reply.category.is_none());
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn without_classifier_category_is_absent() {
        let remote = Arc::new(Remote::default());
        let reply = service(&remote)
            .respond(&ThreadId::new("thread_9"), "hola", &CancellationToken::new())
            .await
            .unwrap();

        assert!(reply.outcome.is_success());
        assert!(reply.category.is_none());
    }

    #[tokio::test]
    async fn post_failure_is_an_error() {
        let remote = Arc::new(Remote {
            fail_post: true,
            ..Remote::default()
        });
        let err = service(&remote)
            .respond(&ThreadId::new("missing"), "hola", &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert!(remote.started_with.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn classification_overlaps_the_run() {
        let remote = Arc::new(Remote {
            fetch_delay: Duration::from_secs(1),
            ..Remote::default()
        });
        let chat = service(&remote).with_classifier(
            classifier(Duration::from_millis(1500), Some("1")),
            Duration::from_secs(5),
        );

        let started = tokio::time::Instant::now();
        let reply = chat
            .respond(&ThreadId::new("thread_9"), "hola", &CancellationToken::new())
            .await
            .unwrap();

        assert!(reply.outcome.is_success());
        assert_eq!(reply.category.unwrap().label(), "1");
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn launch_failure_does_not_wait_for_classification() {
        let remote = Arc::new(Remote {
            fail_post: true,
            ..Remote::default()
        });
        let chat = service(&remote).with_classifier(
            classifier(Duration::from_secs(60), Some("1")),
            Duration::from_secs(30),
        );

        let started = tokio::time::Instant::now();
        let err = chat
            .respond(&ThreadId::new("missing"), "hola", &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn max_turn_duration_covers_launch_fetches_and_sleeps() {
        let remote = Arc::new(Remote::default());
        let chat = service(&remote).with_call_timeout(Duration::from_secs(1));

        // 3 attempts: 2 launch calls + 3 fetches at 1s, plus 2 sleeps of 100ms
        assert_eq!(chat.max_turn_duration(), Duration::from_millis(5_200));
    }

    #[test]
    fn max_turn_duration_saturates() {
        let remote = Arc::new(Remote::default());
        let chat = service(&remote).with_call_timeout(Duration::MAX);
        assert_eq!(chat.max_turn_duration(), Duration::MAX);
    }
}

//! Turn-taking between the user, the coach and the summary extractor.
//!
//! All session state sits behind one mutex that is never held across an
//! await. Each reset advances an epoch; remote calls capture the epoch they
//! were issued under and their results are dropped if it has moved on.

use crate::agent::CoachingClient;
use crate::conversation::{Message, MessageStore};
use crate::summary::{decode_summary, SummaryRecord, SummaryStore};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

/// Substituted for the coach's reply when the conversation call fails
pub const FALLBACK_REPLY: &str =
    "Sorry, communication seems a little unstable. Could you please try again?";

/// Message count at which summary extraction starts
pub const SUMMARY_THRESHOLD: usize = 3;

/// What happened to a send request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Empty input or a send already in flight; nothing changed.
    Rejected,
    /// The coach's reply was appended.
    Replied,
    /// The call failed and the fallback reply was appended.
    Fallback,
    /// The session was reset while the call was in flight; the reply was dropped.
    Stale,
}

/// Result of [`Orchestrator::send_user_message`].
#[derive(Debug)]
pub struct SendReport {
    pub outcome: SendOutcome,
    /// Background summary refresh started by this send, if any
    pub summary_task: Option<JoinHandle<RefreshOutcome>>,
}

/// What happened to a summary refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The payload was merged; carries the number of fields it set.
    Merged(usize),
    /// The call failed or the payload did not decode; the summary is unchanged.
    Discarded,
    /// The session was reset while the call was in flight.
    Stale,
}

/// Consistent copy of the session state for presentation.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub identity: Option<String>,
    pub messages: Vec<Message>,
    pub summary: Option<SummaryRecord>,
    pub sending: bool,
    pub summarizing: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    epoch: u64,
    identity: Option<String>,
    messages: MessageStore,
    summary: SummaryStore,
    sending: bool,
    summarizing: usize,
}

impl SessionState {
    /// Start over under a new epoch.
    fn clear(&mut self) {
        self.epoch += 1;
        self.identity = None;
        self.messages.clear();
        self.summary.reset();
        self.sending = false;
        self.summarizing = 0;
    }
}

type SharedState = Arc<Mutex<SessionState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the sending flag on every exit path, unless the session was reset
/// in the meantime.
struct SendingGuard {
    state: SharedState,
    epoch: u64,
}

impl Drop for SendingGuard {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if state.epoch == self.epoch {
            state.sending = false;
        }
    }
}

/// Decrements the in-flight extraction count on every exit path.
struct SummarizingGuard {
    state: SharedState,
    epoch: u64,
}

impl SummarizingGuard {
    fn acquire(state: &SharedState) -> Self {
        let mut locked = lock(state);
        locked.summarizing += 1;
        Self {
            state: Arc::clone(state),
            epoch: locked.epoch,
        }
    }
}

impl Drop for SummarizingGuard {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if state.epoch == self.epoch {
            state.summarizing = state.summarizing.saturating_sub(1);
        }
    }
}

fn greeting(identity: &str) -> String {
    format!(
        "Hello, {identity}. I'm your life-improvement coach. Today I'd like to hear about \
         anything in your daily life you'd like to change a little, or anything that just \
         doesn't seem to be going well.\n\n\
         \"I want to get up earlier\", \"I keep procrastinating\", \"my workspace is a mess\": \
         however small it is, that's fine. To start, could you tell me what's on your mind \
         right now?"
    )
}

/// Drives one conversation session.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<dyn CoachingClient>,
    state: SharedState,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn CoachingClient>) -> Self {
        Self {
            client,
            state: SharedState::default(),
        }
    }

    /// Bind the conversation to `identity` and greet if it has not started yet.
    ///
    /// A different identity than the bound one starts a fresh session first.
    pub fn initialize_session(&self, identity: &str) {
        let mut state = lock(&self.state);
        if state
            .identity
            .as_deref()
            .is_some_and(|current| current != identity)
        {
            state.clear();
        }
        state.identity = Some(identity.to_string());
        if state.messages.is_empty() {
            state.messages.push(Message::assistant(greeting(identity)));
        }
    }

    /// Run one full turn: append the user's text, ask the coach, append the reply.
    ///
    /// Failures never escape; they are absorbed into the fallback reply. When
    /// the turn succeeds and the log has reached [`SUMMARY_THRESHOLD`]
    /// messages, a summary refresh is spawned and returned without awaiting it.
    pub async fn send_user_message(&self, text: &str) -> SendReport {
        if text.trim().is_empty() {
            return SendReport::rejected();
        }

        let (history, guard) = {
            let mut state = lock(&self.state);
            if state.sending {
                tracing::debug!("send rejected: another send is in flight");
                return SendReport::rejected();
            }
            state.sending = true;
            state.messages.push(Message::user(text));
            let guard = SendingGuard {
                state: Arc::clone(&self.state),
                epoch: state.epoch,
            };
            (state.messages.to_vec(), guard)
        };

        let (outcome, reply) = match self.client.continue_conversation(&history).await {
            Ok(reply) if !reply.trim().is_empty() => (SendOutcome::Replied, reply),
            Ok(_) => {
                tracing::warn!("coach returned an empty reply");
                (SendOutcome::Fallback, FALLBACK_REPLY.to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "conversation request failed");
                (SendOutcome::Fallback, FALLBACK_REPLY.to_string())
            }
        };

        let updated = {
            let mut state = lock(&self.state);
            if state.epoch != guard.epoch {
                tracing::debug!("discarding reply for a session that was reset");
                return SendReport {
                    outcome: SendOutcome::Stale,
                    summary_task: None,
                };
            }
            state.messages.push(Message::assistant(reply));
            state.messages.to_vec()
        };
        drop(guard);

        let summary_task = (outcome == SendOutcome::Replied && updated.len() >= SUMMARY_THRESHOLD)
            .then(|| {
                let this = self.clone();
                tokio::spawn(async move { this.refresh_summary(updated).await })
            });

        SendReport {
            outcome,
            summary_task,
        }
    }

    /// Extract a summary from `history` and merge it into the session's record.
    ///
    /// Extraction or decode failures leave the record untouched.
    pub async fn refresh_summary(&self, history: Vec<Message>) -> RefreshOutcome {
        let guard = SummarizingGuard::acquire(&self.state);

        let record = match self.client.extract_summary(&history).await {
            Ok(payload) => match decode_summary(&payload) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse summary payload");
                    return RefreshOutcome::Discarded;
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "summary extraction failed");
                return RefreshOutcome::Discarded;
            }
        };

        let mut state = lock(&self.state);
        if state.epoch != guard.epoch {
            tracing::debug!("discarding summary for a session that was reset");
            return RefreshOutcome::Stale;
        }
        let fields = record.field_count();
        state.summary.merge(record);
        tracing::debug!(fields, "merged summary");
        RefreshOutcome::Merged(fields)
    }

    /// Clear the conversation, the summary and both progress flags at once.
    ///
    /// Calls still in flight complete, but their results are discarded.
    pub fn reset_session(&self) {
        lock(&self.state).clear();
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = lock(&self.state);
        Snapshot {
            identity: state.identity.clone(),
            messages: state.messages.to_vec(),
            summary: state.summary.get().cloned(),
            sending: state.sending,
            summarizing: state.summarizing > 0,
        }
    }

    pub fn message_count(&self) -> usize {
        lock(&self.state).messages.len()
    }

    pub fn is_sending(&self) -> bool {
        lock(&self.state).sending
    }

    pub fn is_summarizing(&self) -> bool {
        lock(&self.state).summarizing > 0
    }
}

impl SendReport {
    fn rejected() -> Self {
        Self {
            outcome: SendOutcome::Rejected,
            summary_task: None,
        }
    }
}

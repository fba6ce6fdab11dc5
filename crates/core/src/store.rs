use std::collections::VecDeque;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::submission::{SourceMessageId, Submission, SubmissionDraft, SubmissionId};
use crate::errors::SubmissionError;

pub const DEFAULT_CAPACITY: usize = 20;
pub const DEFAULT_RECENT_LIMIT: usize = 3;

/// Bounded, insertion-ordered submission list shared by the ingress listener
/// and the HTTP API.
///
/// Every operation takes the lock once and never suspends while holding it, so
/// each create or verification change is atomic with respect to the others.
pub struct SubmissionStore {
    capacity: usize,
    state: RwLock<StoreState>,
}

struct StoreState {
    submissions: VecDeque<Submission>,
    next_id: u64,
}

impl Default for SubmissionStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SubmissionStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: RwLock::new(StoreState {
                submissions: VecDeque::with_capacity(capacity + 1),
                next_id: 1,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.submissions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// The last `limit` submissions, oldest first.
    pub async fn list_recent(&self, limit: usize) -> Vec<Submission> {
        let state = self.state.read().await;
        let skip = state.submissions.len().saturating_sub(limit);
        state.submissions.iter().skip(skip).cloned().collect()
    }

    pub async fn snapshot(&self) -> Vec<Submission> {
        self.state.read().await.submissions.iter().cloned().collect()
    }

    pub async fn create(&self, draft: SubmissionDraft) -> Result<Submission, SubmissionError> {
        let draft = draft.validate()?;

        let mut state = self.state.write().await;
        let id = SubmissionId(state.next_id);
        state.next_id += 1;

        let submission = Submission {
            id,
            source_message_id: draft.source_message_id,
            conversion: draft.conversion,
            price: draft.price,
            stock: draft.stock,
            image: draft.image,
            verified: false,
            created_at: Utc::now(),
        };
        state.submissions.push_back(submission.clone());

        while state.submissions.len() > self.capacity {
            if let Some(evicted) = state.submissions.pop_front() {
                debug!(
                    event_name = "store.submission.evicted",
                    submission_id = %evicted.id,
                    capacity = self.capacity,
                    "evicted oldest submission"
                );
            }
        }

        Ok(submission)
    }

    pub async fn set_verified(
        &self,
        id: SubmissionId,
        verified: bool,
    ) -> Result<Submission, SubmissionError> {
        let mut state = self.state.write().await;
        let submission = state
            .submissions
            .iter_mut()
            .find(|submission| submission.id == id)
            .ok_or(SubmissionError::NotFound(id))?;

        submission.verified = verified;
        Ok(submission.clone())
    }

    /// Returns `None` when no tracked submission came from `message_id`,
    /// including submissions that have already been evicted.
    pub async fn set_verified_for_message(
        &self,
        message_id: &SourceMessageId,
        verified: bool,
    ) -> Option<Submission> {
        let mut state = self.state.write().await;
        let submission = state
            .submissions
            .iter_mut()
            .find(|submission| submission.source_message_id.as_ref() == Some(message_id))?;

        submission.verified = verified;
        Some(submission.clone())
    }
}

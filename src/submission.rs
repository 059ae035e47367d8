use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use url::Url;

use crate::normalize::Extraction;

// ── Input validation ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Please enter a product URL")]
    Empty,
    #[error("Please enter a valid URL")]
    Invalid,
}

/// Accepts anything that parses as an absolute URL. No scheme allow-list.
pub fn validate_url(input: &str) -> Result<Url, InputError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(InputError::Empty);
    }
    Url::parse(input).map_err(|_| InputError::Invalid)
}

// ── Submissions ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SubmissionId(u64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub struct Submission {
    pub id: SubmissionId,
    pub url: Url,
    pub extraction: Extraction,
}

#[derive(Debug, Default)]
struct Slot {
    latest_issued: u64,
    current: Option<Arc<Submission>>,
}

/// Holds the result of the most recent submission.
///
/// Every submission gets an id from [`Session::begin`]; only the result for the
/// latest issued id is accepted, so an older request that resolves late can
/// never replace a newer one.
#[derive(Debug, Default)]
pub struct Session {
    slot: RwLock<Slot>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin(&self) -> SubmissionId {
        let mut slot = self.slot.write().await;
        slot.latest_issued += 1;
        SubmissionId(slot.latest_issued)
    }

    /// Returns `None` when `id` has been superseded.
    pub async fn complete(
        &self,
        id: SubmissionId,
        url: Url,
        extraction: Extraction,
    ) -> Option<Arc<Submission>> {
        let mut slot = self.slot.write().await;
        if id.0 != slot.latest_issued {
            tracing::debug!(
                "discarding result for {} (latest is #{})",
                id,
                slot.latest_issued
            );
            return None;
        }
        let submission = Arc::new(Submission { id, url, extraction });
        slot.current = Some(Arc::clone(&submission));
        Some(submission)
    }

    pub async fn current(&self) -> Option<Arc<Submission>> {
        self.slot.read().await.current.clone()
    }
}

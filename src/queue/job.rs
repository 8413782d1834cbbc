// ABOUTME: Deployment job payload carried through the queue.
// ABOUTME: Serialized as JSON; identity is job_id, removal matches the exact payload.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A unit of deployment work.
///
/// `priority` is carried for observability only; delivery is FIFO.
/// `metadata` holds the deployment parameters the worker reads (see
/// [`crate::worker`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentJob {
    #[serde(default)]
    pub job_id: String,
    pub repository: String,
    pub branch: String,
    pub commit_sha: String,
    pub triggered_by: String,
    #[serde(default)]
    pub priority: i32,
    /// Epoch seconds.
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl DeploymentJob {
    pub fn new(
        repository: impl Into<String>,
        branch: impl Into<String>,
        commit_sha: impl Into<String>,
        triggered_by: impl Into<String>,
    ) -> Self {
        Self {
            job_id: String::new(),
            repository: repository.into(),
            branch: branch.into(),
            commit_sha: commit_sha.into(),
            triggered_by: triggered_by.into(),
            priority: 0,
            created_at: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Fill in a generated `job_id` and `created_at` where the caller left
    /// them blank.
    pub(crate) fn stamp(&mut self) {
        if self.job_id.trim().is_empty() {
            self.job_id = uuid::Uuid::new_v4().to_string();
        }
        if self.created_at == 0 {
            self.created_at = Utc::now().timestamp();
        }
    }

    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// A job handed to a worker together with the exact payload stored in the
/// processing list. Acknowledge with the same `Delivery`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub job: DeploymentJob,
    pub payload: String,
}

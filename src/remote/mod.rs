//! Remote time tracking service: wire types, the API seam and retry policy

pub mod hackaru;
pub mod retry;

pub use hackaru::HackaruApi;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{AuthCredential, TaskId};

/// Failure of a single request, before any retry decision
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Network failure, timeout or server-side error; worth retrying
    #[error("{0}")]
    Transient(String),

    /// The service refused the credential (or the login)
    #[error("unauthorized")]
    Unauthorized,

    /// The service understood and refused the request
    #[error("HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

/// Activity as returned by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub project: Option<ProjectRef>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
}

impl Activity {
    /// Project id, from either the flat field or the embedded project
    pub fn project_id(&self) -> Option<i64> {
        self.project_id.or_else(|| self.project.as_ref().map(|p| p.id))
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }
}

/// Operations the bridge needs from the time tracking service
#[async_trait]
pub trait TimeTrackingApi: Send + Sync {
    /// Exchange email/password for a credential
    async fn login(&self, email: &str, password: &str) -> Result<AuthCredential, RemoteError>;

    /// The activity currently running remotely, if any; also validates the credential
    async fn working(&self, credential: &AuthCredential) -> Result<Option<Activity>, RemoteError>;

    /// Begin tracking `task` at `started_at`
    async fn start(
        &self,
        credential: &AuthCredential,
        task: &TaskId,
        started_at: DateTime<Utc>,
    ) -> Result<Activity, RemoteError>;

    /// Stop the activity `activity_id` at `stopped_at`
    async fn stop(
        &self,
        credential: &AuthCredential,
        activity_id: i64,
        stopped_at: DateTime<Utc>,
    ) -> Result<(), RemoteError>;
}

//! Session Client: sole owner of the remote session and the credential

pub mod client;

pub use client::SessionClient;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Session, TaskId};

/// What the tracking controller needs from a session client
#[async_trait]
pub trait SessionApi: Send {
    /// Make `task` the running activity; a no-op if it already is
    async fn start_activity(&mut self, task: &TaskId) -> Result<Session>;

    /// Stop whatever is running; a no-op when nothing is
    async fn stop_activity(&mut self) -> Result<()>;
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use super::SessionApi;
use crate::error::{BridgeError, Result};
use crate::models::{AuthCredential, Session, TaskId, TaskMapping};
use crate::remote::{Activity, RemoteError, RetryPolicy, TimeTrackingApi};
use crate::repo::CredentialStore;
use crate::utils::format_duration;

/// Supplies the password when a rejected credential has to be replaced mid-run
pub type PasswordSource = Box<dyn Fn() -> Result<String> + Send + Sync>;

/// Wraps the time tracking API with credential handling, retry and the
/// one-running-activity rule
pub struct SessionClient<A: TimeTrackingApi> {
    api: A,
    store: Box<dyn CredentialStore>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    // Used to put config names on activities found running remotely
    mapping: TaskMapping,
    credential: Option<AuthCredential>,
    session: Session,
    relogin: Option<(String, PasswordSource)>,
}

impl<A: TimeTrackingApi> SessionClient<A> {
    pub fn new(api: A, store: Box<dyn CredentialStore>, retry: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            api,
            store,
            retry,
            cancel,
            mapping: TaskMapping::new(),
            credential: None,
            session: Session::None,
            relogin: None,
        }
    }

    pub fn with_mapping(mut self, mapping: TaskMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Log in again as `email` when the service rejects the credential
    pub fn with_relogin(mut self, email: impl Into<String>, password: PasswordSource) -> Self {
        self.relogin = Some((email.into(), password));
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn credential(&self) -> Option<&AuthCredential> {
        self.credential.as_ref()
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Log in with email and password and persist the new credential
    ///
    /// Any failure, including an unreachable endpoint, is an auth error.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<AuthCredential> {
        info!("Logging in as {}", email);
        let credential = match self.api.login(email, password).await {
            Ok(credential) => credential,
            Err(RemoteError::Unauthorized) => {
                return Err(BridgeError::auth(format!("Login refused for {}", email)))
            }
            Err(e) => return Err(BridgeError::auth(format!("Login failed: {}", e))),
        };

        self.store.save(&credential)?;
        self.credential = Some(credential.clone());
        debug!("Credential stored");
        Ok(credential)
    }

    /// Validate a previously persisted credential
    ///
    /// On success the activity currently running remotely (if any) becomes the
    /// session, so a later start stops it first.
    pub async fn resume(&mut self, credential: AuthCredential) -> Result<AuthCredential> {
        let working = self
            .retry
            .run("validate credential", &self.cancel, || self.api.working(&credential))
            .await?;

        self.session = match working {
            Some(activity) => self.adopt(activity),
            None => Session::None,
        };
        if let Session::Running { task, .. } = &self.session {
            info!("Activity already running remotely: {}", task);
        }
        self.credential = Some(credential.clone());
        Ok(credential)
    }

    /// Bootstrap authentication: stored credential first, then password login
    ///
    /// `seed` is tried when nothing is stored. `password` is only called when
    /// an interactive login is actually needed.
    pub async fn authenticate<F>(&mut self, email: &str, seed: Option<AuthCredential>, password: F) -> Result<AuthCredential>
    where
        F: FnOnce() -> Result<String>,
    {
        let stored = self.store.load()?.or(seed);
        if let Some(credential) = stored {
            match self.resume(credential).await {
                Ok(credential) => {
                    info!("Resumed stored session for {}", email);
                    return Ok(credential);
                }
                Err(BridgeError::Auth(reason)) => {
                    warn!("Stored credential rejected ({}); logging in again", reason);
                }
                Err(e) => return Err(e),
            }
        } else {
            debug!("No stored credential");
        }

        let password = password()?;
        let credential = self.login(email, &password).await?;
        // Learn what is running under the fresh credential
        self.resume(credential).await
    }

    fn adopt(&self, activity: Activity) -> Session {
        let project_id = activity.project_id().unwrap_or_default();
        let task = self
            .mapping
            .find(project_id, activity.description())
            .cloned()
            .unwrap_or_else(|| {
                TaskId::new(format!("project-{}", project_id), project_id, activity.description())
            });
        Session::Running {
            task,
            activity_id: activity.id,
            started_at: activity.started_at.unwrap_or_else(Utc::now),
        }
    }

    fn require_credential(&self) -> Result<AuthCredential> {
        self.credential
            .clone()
            .ok_or_else(|| BridgeError::auth("Not logged in"))
    }

    async fn stop_running(&mut self) -> Result<()> {
        let Session::Running { task, activity_id, started_at } = self.session.clone() else {
            return Ok(());
        };
        let stopped_at = Utc::now();
        match self.try_stop(activity_id, stopped_at).await {
            Err(BridgeError::Auth(reason)) => {
                self.replace_credential(&reason).await?;
                self.try_stop(activity_id, stopped_at).await?;
            }
            other => other?,
        }

        info!(
            "Stopped {} after {}",
            task,
            format_duration((stopped_at - started_at).num_seconds().max(0))
        );
        self.session = Session::None;
        Ok(())
    }

    async fn try_stop(&mut self, activity_id: i64, stopped_at: DateTime<Utc>) -> Result<()> {
        let credential = self.require_credential()?;
        self.retry
            .run("stop activity", &self.cancel, || {
                self.api.stop(&credential, activity_id, stopped_at)
            })
            .await
    }

    async fn try_start(&mut self, task: &TaskId, started_at: DateTime<Utc>) -> Result<Activity> {
        let credential = self.require_credential()?;
        self.retry
            .run("start activity", &self.cancel, || {
                self.api.start(&credential, task, started_at)
            })
            .await
    }

    /// Drop a credential the service refused and log in again, if a password is at hand
    async fn replace_credential(&mut self, reason: &str) -> Result<()> {
        warn!("Credential rejected ({}); discarding it", reason);
        self.credential = None;
        if let Err(e) = self.store.clear() {
            warn!("Could not remove stored credential: {}", e);
        }

        let Some((email, password)) = &self.relogin else {
            error!("Re-login required: run `cubetrack login`");
            return Err(BridgeError::auth(format!("credential rejected: {}", reason)));
        };
        let email = email.clone();
        let password = match password() {
            Ok(password) => password,
            Err(e) => {
                error!("Re-login required for {}: {}", email, e);
                return Err(e);
            }
        };
        self.login(&email, &password).await?;
        Ok(())
    }
}

#[async_trait]
impl<A: TimeTrackingApi> SessionApi for SessionClient<A> {
    async fn start_activity(&mut self, task: &TaskId) -> Result<Session> {
        if self.session.task() == Some(task) {
            debug!("{} is already running", task);
            return Ok(self.session.clone());
        }

        // Only one activity may run; a failed stop leaves the old one in place
        self.stop_running().await?;

        let started_at = Utc::now();
        let activity = match self.try_start(task, started_at).await {
            Err(BridgeError::Auth(reason)) => {
                self.replace_credential(&reason).await?;
                self.try_start(task, started_at).await?
            }
            other => other?,
        };

        self.session = Session::Running {
            task: task.clone(),
            activity_id: activity.id,
            started_at: activity.started_at.unwrap_or(started_at),
        };
        info!("Started {}", task);
        Ok(self.session.clone())
    }

    async fn stop_activity(&mut self) -> Result<()> {
        self.stop_running().await
    }
}

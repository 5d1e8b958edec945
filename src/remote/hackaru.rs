//! Hackaru REST client

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

use super::{Activity, RemoteError, TimeTrackingApi};
use crate::error::{BridgeError, Result};
use crate::models::{AuthCredential, TaskId};

pub const DEFAULT_ENDPOINT: &str = "https://api.hackaru.app";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const AUTH_TOKEN_ID: &str = "auth_token_id";
const AUTH_TOKEN_RAW: &str = "auth_token_raw";

/// Client for the Hackaru v1 API
#[derive(Clone)]
pub struct HackaruApi {
    client: Client,
    base_url: String,
}

impl HackaruApi {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .user_agent(concat!("cubetrack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    RemoteError::Transient(e.to_string())
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Map a non-success status to the retry classification
async fn check_status(resp: Response) -> std::result::Result<Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        Err(RemoteError::Unauthorized)
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(RemoteError::Transient(format!("HTTP {}: {}", status.as_u16(), body)))
    } else {
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Pull the auth token pair out of the login response cookies
fn credential_from_cookies(headers: &HeaderMap) -> Option<AuthCredential> {
    let mut token_id = None;
    let mut token_raw = None;

    for value in headers.get_all(SET_COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        let pair = value.split(';').next().unwrap_or("");
        if let Some((name, content)) = pair.split_once('=') {
            match name.trim() {
                AUTH_TOKEN_ID => token_id = Some(content.trim().to_string()),
                AUTH_TOKEN_RAW => token_raw = Some(content.trim().to_string()),
                _ => {}
            }
        }
    }

    match (token_id, token_raw) {
        (Some(id), Some(raw)) if !id.is_empty() && !raw.is_empty() => {
            Some(AuthCredential::new(id, raw))
        }
        _ => None,
    }
}

#[async_trait]
impl TimeTrackingApi for HackaruApi {
    async fn login(&self, email: &str, password: &str) -> std::result::Result<AuthCredential, RemoteError> {
        let body = serde_json::json!({
            "user": { "email": email, "password": password }
        });
        debug!("POST {}", self.url("auth/auth_tokens"));

        let resp = self
            .client
            .post(self.url("auth/auth_tokens"))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let resp = match check_status(resp).await {
            // Bad credentials come back as 401, 403 or 422
            Err(RemoteError::Rejected { status, .. }) if status == 403 || status == 422 => {
                return Err(RemoteError::Unauthorized)
            }
            other => other?,
        };

        credential_from_cookies(resp.headers()).ok_or_else(|| RemoteError::Rejected {
            status: resp.status().as_u16(),
            body: "login response carried no auth token cookies".to_string(),
        })
    }

    async fn working(&self, credential: &AuthCredential) -> std::result::Result<Option<Activity>, RemoteError> {
        debug!("GET {}", self.url("activities/working"));
        let resp = self
            .client
            .get(self.url("activities/working"))
            .header(COOKIE, credential.cookie_header())
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check_status(resp).await?;

        let text = resp.text().await.map_err(transport_error)?;
        let text = text.trim();
        if text.is_empty() || text == "null" || text == "{}" {
            return Ok(None);
        }
        serde_json::from_str(text)
            .map(Some)
            .map_err(|e| RemoteError::Transient(format!("Malformed working activity: {}", e)))
    }

    async fn start(
        &self,
        credential: &AuthCredential,
        task: &TaskId,
        started_at: DateTime<Utc>,
    ) -> std::result::Result<Activity, RemoteError> {
        let body = serde_json::json!({
            "activity": {
                "description": task.description,
                "project_id": task.project_id,
                "started_at": timestamp(started_at),
            }
        });
        debug!("POST {} for {}", self.url("activities"), task);

        let resp = self
            .client
            .post(self.url("activities"))
            .header(COOKIE, credential.cookie_header())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check_status(resp).await?;

        resp.json::<Activity>()
            .await
            .map_err(|e| RemoteError::Transient(format!("Malformed activity response: {}", e)))
    }

    async fn stop(
        &self,
        credential: &AuthCredential,
        activity_id: i64,
        stopped_at: DateTime<Utc>,
    ) -> std::result::Result<(), RemoteError> {
        let path = format!("activities/{}", activity_id);
        let body = serde_json::json!({
            "activity": {
                "id": activity_id,
                "stopped_at": timestamp(stopped_at),
            }
        });
        debug!("PUT {}", self.url(&path));

        let resp = self
            .client
            .put(self.url(&path))
            .header(COOKIE, credential.cookie_header())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(resp).await?;
        Ok(())
    }
}

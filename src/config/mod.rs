//! Configuration file loading and validation
//!
//! The config is a YAML document naming the cube, the Hackaru endpoint, the
//! login email, the tasks and which face selects which task. It is read once
//! at startup; anything malformed is a `BridgeError::Config`.

pub mod paths;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BridgeError, Result};
use crate::models::{AuthCredential, Face, TaskId, TaskMapping, FIRST_TASK_FACE, LAST_TASK_FACE};
use crate::remote::hackaru::DEFAULT_TIMEOUT;
use crate::remote::retry::{RetryPolicy, DEFAULT_ATTEMPTS, DEFAULT_BACKOFF};
use crate::utils::parse_duration;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);
pub const DEFAULT_RECONCILE: Duration = Duration::from_secs(60);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Duration written either as milliseconds or as an expression like `1s`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum DurationValue {
    Millis(u64),
    Text(String),
}

impl DurationValue {
    fn resolve(&self, field: &str) -> Result<Duration> {
        match self {
            DurationValue::Millis(0) => Err(BridgeError::config(format!(
                "{} must be greater than 0",
                field
            ))),
            DurationValue::Millis(ms) => Ok(Duration::from_millis(*ms)),
            DurationValue::Text(text) => parse_duration(text)
                .map_err(|e| BridgeError::config(format!("Invalid {}: {}", field, e))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TaskEntry {
    id: i64,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RetryEntry {
    #[serde(default)]
    attempts: Option<u32>,
    #[serde(default)]
    backoff: Option<DurationValue>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    address: Option<String>,
    endpoint: Option<String>,
    email: Option<String>,
    #[serde(default)]
    tasks: BTreeMap<String, TaskEntry>,
    #[serde(default)]
    mapping: BTreeMap<u8, String>,
    #[serde(default)]
    debounce: Option<DurationValue>,
    #[serde(default)]
    retry: Option<RetryEntry>,
    #[serde(default)]
    reconcile: Option<DurationValue>,
    #[serde(default)]
    request_timeout: Option<DurationValue>,
    #[serde(default)]
    shutdown_timeout: Option<DurationValue>,
    #[serde(default)]
    credential_path: Option<PathBuf>,
    // Token pair pasted straight into the config by older setups
    #[serde(default)]
    authid: Option<String>,
    #[serde(default)]
    authtoken: Option<String>,
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub address: String,
    pub endpoint: String,
    pub email: String,
    pub tasks: BTreeMap<String, TaskId>,
    pub mapping: TaskMapping,
    pub debounce: Duration,
    pub retry: RetryPolicy,
    pub reconcile_interval: Duration,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub credential_path: PathBuf,
    /// Credential given inline in the config, used when nothing is stored yet
    pub seed_credential: Option<AuthCredential>,
}

impl Config {
    /// Load and validate the config at `path`
    pub fn load(path: &Path) -> Result<Config> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let default_credential = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join("credential.json"),
            _ => paths::default_credential_path()?,
        };
        Self::parse(&contents, path, default_credential)
    }

    /// Parse config text; `source` is used to resolve relative paths and in messages
    pub fn parse(contents: &str, source: &Path, default_credential: PathBuf) -> Result<Config> {
        let raw: RawConfig = serde_yaml::from_str(contents).map_err(|e| {
            BridgeError::config(format!("Malformed config {}: {}", source.display(), e))
        })?;

        let address = required(raw.address, "address")?;
        validate_address(&address).map_err(BridgeError::Config)?;
        let endpoint = required(raw.endpoint, "endpoint")?;
        validate_endpoint(&endpoint).map_err(BridgeError::Config)?;
        let email = required(raw.email, "email")?;

        let mut tasks = BTreeMap::new();
        for (name, entry) in raw.tasks {
            validate_non_empty(&name, "Task name").map_err(BridgeError::Config)?;
            let task = TaskId::new(name.clone(), entry.id, entry.description.unwrap_or_default());
            tasks.insert(name, task);
        }

        let mut faces = Vec::new();
        for (face, task_name) in raw.mapping {
            validate_face(face).map_err(BridgeError::Config)?;
            let task = tasks.get(&task_name).ok_or_else(|| {
                BridgeError::config(format!(
                    "Mapping for face {} refers to unknown task '{}'",
                    face, task_name
                ))
            })?;
            faces.push((Face(face), task.clone()));
        }
        let mapping: TaskMapping = faces.into_iter().collect();

        let retry_entry = raw.retry.unwrap_or_default();
        let attempts = retry_entry.attempts.unwrap_or(DEFAULT_ATTEMPTS);
        if attempts == 0 {
            return Err(BridgeError::config("retry.attempts must be at least 1"));
        }
        let backoff = resolve_or(retry_entry.backoff.as_ref(), "retry.backoff", DEFAULT_BACKOFF)?;

        let credential_path = raw
            .credential_path
            .map(|p| paths::resolve_relative(source, &p))
            .unwrap_or(default_credential);

        let seed_credential = match (raw.authid, raw.authtoken) {
            (Some(id), Some(token)) if !id.trim().is_empty() && !token.trim().is_empty() => {
                Some(AuthCredential::new(id.trim(), token.trim()))
            }
            _ => None,
        };

        Ok(Config {
            address,
            endpoint,
            email,
            tasks,
            mapping,
            debounce: resolve_or(raw.debounce.as_ref(), "debounce", DEFAULT_DEBOUNCE)?,
            retry: RetryPolicy::new(attempts, backoff),
            reconcile_interval: resolve_or(raw.reconcile.as_ref(), "reconcile", DEFAULT_RECONCILE)?,
            request_timeout: resolve_or(
                raw.request_timeout.as_ref(),
                "request_timeout",
                DEFAULT_TIMEOUT,
            )?,
            shutdown_timeout: resolve_or(
                raw.shutdown_timeout.as_ref(),
                "shutdown_timeout",
                DEFAULT_SHUTDOWN_TIMEOUT,
            )?,
            credential_path,
            seed_credential,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    let value = value.ok_or_else(|| BridgeError::config(format!("Missing required field '{}'", field)))?;
    validate_non_empty(&value, field).map_err(BridgeError::Config)?;
    Ok(value.trim().to_string())
}

fn resolve_or(value: Option<&DurationValue>, field: &str, default: Duration) -> Result<Duration> {
    value.map(|v| v.resolve(field)).unwrap_or(Ok(default))
}

/// Validate that a string is not empty
pub fn validate_non_empty(value: &str, field_name: &str) -> std::result::Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} cannot be empty", field_name))
    } else {
        Ok(())
    }
}

/// Validate a device address: a MAC (`AA:BB:CC:DD:EE:FF`) or a platform UUID
pub fn validate_address(address: &str) -> std::result::Result<(), String> {
    let address = address.trim();
    let parts: Vec<&str> = address.split(':').collect();
    let is_mac = parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()));

    if is_mac || uuid::Uuid::parse_str(address).is_ok() {
        Ok(())
    } else {
        Err(format!(
            "Invalid device address: '{}'. Expected a MAC address like AA:BB:CC:DD:EE:FF.",
            address
        ))
    }
}

/// Validate the endpoint is an http(s) URL
pub fn validate_endpoint(endpoint: &str) -> std::result::Result<(), String> {
    let endpoint = endpoint.trim();
    let rest = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(format!(
            "Invalid endpoint: '{}'. Endpoint must start with http:// or https://.",
            endpoint
        )),
    }
}

/// Validate a face number can carry a task
pub fn validate_face(face: u8) -> std::result::Result<(), String> {
    if (FIRST_TASK_FACE..=LAST_TASK_FACE).contains(&face) {
        Ok(())
    } else {
        Err(format!(
            "Invalid face {}. Faces are numbered {} to {}.",
            face, FIRST_TASK_FACE, LAST_TASK_FACE
        ))
    }
}

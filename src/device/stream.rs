//! Background worker that owns the device connection and emits stable faces

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{Debouncer, DeviceConnection, Transport};
use crate::error::ConnectionError;
use crate::models::StableFaceEvent;

/// Bounded exponential backoff between reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failed attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Wait before the `attempt`-th reconnect (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub debounce: Duration,
    pub reconnect: ReconnectPolicy,
    pub channel_capacity: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            debounce: crate::config::DEFAULT_DEBOUNCE,
            reconnect: ReconnectPolicy::default(),
            channel_capacity: 16,
        }
    }
}

/// Handle to the running adapter: the event channel plus the worker task
pub struct OrientationStream {
    pub events: mpsc::Receiver<StableFaceEvent>,
    pub worker: JoinHandle<Result<(), ConnectionError>>,
}

impl OrientationStream {
    /// Connect to the device and start delivering stable face events
    ///
    /// The first connect is not retried: failing here is a startup error.
    /// Later disconnects are handled inside the worker and only show up as a
    /// gap in the event sequence. The worker ends when `cancel` fires, when
    /// the receiver is dropped, when the source is exhausted, or (with a
    /// bounded policy) when reconnecting gives up.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        address: &str,
        options: StreamOptions,
        cancel: CancellationToken,
    ) -> Result<OrientationStream, ConnectionError> {
        let connection = transport.connect(address).await?;
        info!("Connected to cube {}", address);

        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
        let worker = Worker {
            transport,
            address: address.to_string(),
            debouncer: Debouncer::new(options.debounce),
            backoff: options.reconnect,
            tx,
            cancel,
        };

        Ok(OrientationStream {
            events: rx,
            worker: tokio::spawn(worker.run(connection)),
        })
    }
}

enum PumpEnd {
    Cancelled,
    ReceiverGone,
    Exhausted,
    Disconnected(ConnectionError),
}

struct Worker {
    transport: Arc<dyn Transport>,
    address: String,
    debouncer: Debouncer,
    backoff: ReconnectPolicy,
    tx: mpsc::Sender<StableFaceEvent>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self, mut connection: Box<dyn DeviceConnection>) -> Result<(), ConnectionError> {
        loop {
            let end = self.pump(connection.as_mut()).await;
            connection.close().await;
            match end {
                PumpEnd::Cancelled | PumpEnd::ReceiverGone => return Ok(()),
                PumpEnd::Exhausted => {
                    info!("Orientation source ended");
                    self.flush_pending().await;
                    return Ok(());
                }
                PumpEnd::Disconnected(err) => {
                    warn!("Disconnected from cube {}: {}", self.address, err);
                    self.debouncer.reset();
                    drop(connection);
                    match self.reconnect().await? {
                        Some(next) => connection = next,
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    /// Read from one connection until it ends
    async fn pump(&mut self, connection: &mut dyn DeviceConnection) -> PumpEnd {
        loop {
            let deadline = self.debouncer.deadline();

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PumpEnd::Cancelled,
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(event) = self.debouncer.poll(Instant::now()) {
                        if !self.emit(event).await {
                            return PumpEnd::ReceiverGone;
                        }
                    }
                }
                reading = connection.next_reading() => match reading {
                    Ok(Some(face)) => {
                        debug!("Orientation: {}", face.value());
                        if let Some(event) = self.debouncer.observe(face, Instant::now()) {
                            if !self.emit(event).await {
                                return PumpEnd::ReceiverGone;
                            }
                        }
                    }
                    Ok(None) => return PumpEnd::Exhausted,
                    Err(err) => return PumpEnd::Disconnected(err),
                },
            }
        }
    }

    /// The last face of an ended source counts as held; wait out its window
    async fn flush_pending(&mut self) {
        let Some(deadline) = self.debouncer.deadline() else {
            return;
        };
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep_until(deadline) => {
                if let Some(event) = self.debouncer.poll(Instant::now()) {
                    self.emit(event).await;
                }
            }
        }
    }

    async fn emit(&self, event: StableFaceEvent) -> bool {
        info!("Cube settled on {}", event.face);
        self.tx.send(event).await.is_ok()
    }

    /// Reconnect with backoff; `Ok(None)` when cancelled
    async fn reconnect(&self) -> Result<Option<Box<dyn DeviceConnection>>, ConnectionError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let delay = self.backoff.delay_for(attempt);
            info!(
                "Reconnecting to cube {} in {:?} (attempt {})",
                self.address, delay, attempt
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(None),
                result = self.transport.connect(&self.address) => result,
            };

            match result {
                Ok(connection) => {
                    info!("Reconnected to cube {}", self.address);
                    return Ok(Some(connection));
                }
                Err(err) => {
                    if self.backoff.max_attempts.is_some_and(|max| attempt >= max) {
                        error!(
                            "Giving up on cube {} after {} reconnect attempts: {}",
                            self.address, attempt, err
                        );
                        return Err(err);
                    }
                    warn!("Reconnect to cube {} failed: {}", self.address, err);
                }
            }
        }
    }
}

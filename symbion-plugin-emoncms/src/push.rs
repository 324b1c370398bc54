//! Scheduled delivery of the batch to Emoncms
//!
//! A push is `GET <target>?apikey=..&node=..&json=<batch>`. Only HTTP 200
//! counts as delivered. Encoding problems drop the batch without touching
//! the backoff counters; network problems keep it for the next attempt.

use crate::backoff::{BackoffController, BackoffError, PushState};
use crate::batch::TelemetryBatch;
use std::time::Duration;
use symbion_plugin_common::http::HttpClient;
use symbion_plugin_common::shutdown::Shutdown;
use symbion_plugin_common::Shared;
use tracing::{debug, error, info, warn};
use url::Url;

pub const SUPPORTED_CHARSET: &str = "UTF-8";

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("unsupported charset '{0}'")]
    UnsupportedCharset(String),
    #[error("invalid target '{target}': {source}")]
    BadTarget {
        target: String,
        #[source]
        source: url::ParseError,
    },
    #[error("cannot serialise batch: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("batch discarded: {0}")]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Backoff(#[from] BackoffError),
}

impl PushError {
    /// Errors that stop the push task for good.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PushError::Backoff(BackoffError::GaveUp { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSettings {
    pub target: String,
    pub apikey: String,
    pub node: String,
    pub charset: String,
}

pub fn build_push_url(settings: &PushSettings, json: &str) -> Result<Url, EncodingError> {
    if !settings.charset.eq_ignore_ascii_case(SUPPORTED_CHARSET) {
        return Err(EncodingError::UnsupportedCharset(settings.charset.clone()));
    }

    let mut url = Url::parse(&settings.target).map_err(|source| EncodingError::BadTarget {
        target: settings.target.clone(),
        source,
    })?;
    url.query_pairs_mut()
        .append_pair("apikey", &settings.apikey)
        .append_pair("node", &settings.node)
        .append_pair("json", json);
    Ok(url)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// No client: the pusher is stopped.
    Stopped,
    /// Nothing to send, no request made.
    Empty,
    Sent { entries: usize },
    Failed { failures: u32, next_delay: Duration },
}

pub struct Pusher<H> {
    settings: PushSettings,
    batch: Shared<TelemetryBatch>,
    backoff: BackoffController,
    client: Option<H>,
}

impl<H: HttpClient> Pusher<H> {
    pub fn new(settings: PushSettings, batch: Shared<TelemetryBatch>, backoff: BackoffController) -> Self {
        Self {
            settings,
            batch,
            backoff,
            client: None,
        }
    }

    #[cfg(test)]
    pub fn backoff(&self) -> &BackoffController {
        &self.backoff
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.client.is_some()
    }

    /// Starting again after a give-up is the external restart that clears
    /// the backoff.
    pub fn start(&mut self, client: H) {
        if self.backoff.state() == PushState::Abandoned {
            info!("Restarting Emoncms pusher after give-up");
            self.backoff.reset();
        }
        info!(
            "Emoncms pusher started, saving data to {} every {:?}",
            self.settings.target,
            self.backoff.next_delay()
        );
        self.client = Some(client);
    }

    pub fn stop(&mut self) {
        self.backoff.cancel_attempt();
        if self.client.take().is_some() {
            info!("Emoncms pusher stopped");
        }
    }

    /// One push attempt with whatever the batch holds right now.
    pub async fn tick(&mut self) -> Result<PushOutcome, PushError> {
        let Some(client) = self.client.as_ref() else {
            return Ok(PushOutcome::Stopped);
        };

        let snapshot = self.batch.lock().clone();
        if snapshot.is_empty() {
            debug!("No data to save");
            return Ok(PushOutcome::Empty);
        }

        self.backoff.begin_attempt()?;

        let url = match snapshot
            .to_json()
            .map_err(EncodingError::from)
            .and_then(|json| build_push_url(&self.settings, &json))
        {
            Ok(url) => url,
            Err(e) => {
                warn!("Failed to form/encode URL, discarded {} value(s): {}", snapshot.len(), e);
                self.batch.lock().remove_delivered(&snapshot);
                self.backoff.record_discard();
                return Err(e.into());
            }
        };

        debug!("Sending {}", url);
        let failure = match client.get(&url).await {
            Ok(response) if response.is_ok() => {
                debug!("Returned: {}", response.body);
                self.batch.lock().remove_delivered(&snapshot);
                self.backoff.record_success();
                info!("Saved {} value(s) to Emoncms", snapshot.len());
                return Ok(PushOutcome::Sent {
                    entries: snapshot.len(),
                });
            }
            Ok(response) => {
                debug!("Returned: {}", response.body);
                format!("HTTP status {}", response.status)
            }
            Err(e) => e.to_string(),
        };

        match self.backoff.record_failure() {
            Ok(next_delay) => {
                let failures = self.backoff.failures();
                warn!(
                    "Failed to send data ({}), retrying in {:?} (failure {})",
                    failure, next_delay, failures
                );
                Ok(PushOutcome::Failed { failures, next_delay })
            }
            Err(e) => {
                error!("Giving up on Emoncms: {} (last error: {})", e, failure);
                self.client = None;
                Err(e.into())
            }
        }
    }

    /// Pushes on the backoff schedule until shutdown or give-up.
    pub async fn run(&mut self, client: H, mut shutdown: Shutdown) -> Result<(), PushError> {
        self.start(client);

        let result = loop {
            let delay = self.backoff.next_delay();
            tokio::select! {
                _ = shutdown.requested() => break Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
            tokio::select! {
                _ = shutdown.requested() => break Ok(()),
                outcome = self.tick() => match outcome {
                    Ok(PushOutcome::Failed { failures, next_delay }) => {
                        debug!("push failed {} time(s), next in {:?}", failures, next_delay)
                    }
                    Ok(PushOutcome::Sent { entries }) => debug!("push delivered {} value(s)", entries),
                    Ok(outcome) => debug!("push: {:?}", outcome),
                    Err(e) if e.is_fatal() => break Err(e),
                    Err(_) => {}
                },
            }
        };

        self.stop();
        result
    }
}

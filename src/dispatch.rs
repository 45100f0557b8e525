//! Transport dispatcher: sends one named call to the analytics API.
//!
//! Every payload gets the API key and a dispatch-time timestamp. The
//! timestamp is taken when the envelope is processed, not when the user
//! acted, so queue latency shows up as event time.
//!
//! Send failures are returned, never swallowed. Queue redelivery is the
//! only retry this pipeline has.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use opentelemetry::KeyValue;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::{Instrument, debug, info, warn};

use crate::config::{Config, DEFAULT_BASE_URL};
use crate::error::{Error, Result};
use crate::model::{GroupId, Traits, UserId};
use crate::telemetry::{metrics, pipeline};

/// Analytics API endpoint names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Events,
    Users,
    Groups,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Users => "users",
            Self::Groups => "groups",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// POST-with-JSON-body primitive.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` as JSON to `url`. Returns the response status on 2xx.
    async fn post_json(&self, url: &str, body: &Value) -> Result<u16>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client with a 10s request timeout.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<u16> {
        // .json() sets Content-Type: application/json
        let response = self.client.post(url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(status.as_u16())
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// POSTed; the destination answered with `status`.
    Sent { url: String, status: u16 },
    /// Debug mode: nothing left the process.
    Logged { url: String, payload: Value },
}

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    api_key: Option<SecretString>,
    debug: bool,
    base_url: String,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            api_key: None,
            debug: false,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Copy the dispatch settings out of `config`.
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let mut dispatcher = Self::new(transport)
            .debug(config.debug)
            .base_url(&config.base_url);
        if let Some(ref key) = config.api_key {
            dispatcher = dispatcher.api_key(key.expose_secret());
        }
        dispatcher
    }

    pub fn api_key(mut self, key: &str) -> Self {
        self.api_key = Some(SecretString::from(key));
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn url_for(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    /// Merge the call body with the API key and a dispatch-time timestamp.
    ///
    /// A missing key is left out rather than rejected; the destination
    /// answers that with an auth error.
    pub fn build_payload<T>(&self, body: &T) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        let mut payload = match serde_json::to_value(body)? {
            Value::Object(map) => map,
            other => {
                return Err(Error::Other(format!(
                    "analytics payload must be a JSON object, got {other}"
                )));
            }
        };
        if let Some(ref key) = self.api_key {
            payload.insert("api_key".into(), Value::from(key.expose_secret()));
        }
        payload.insert(
            "timestamp".into(),
            Value::from(chrono::Utc::now().timestamp_millis()),
        );
        Ok(Value::Object(payload))
    }

    /// Send one call to `endpoint`, or log it in debug mode.
    pub async fn dispatch<T>(&self, endpoint: Endpoint, body: &T) -> Result<DispatchOutcome>
    where
        T: Serialize + Sync + ?Sized,
    {
        let payload = self.build_payload(body)?;
        let url = self.url_for(endpoint);
        let span = pipeline::start_dispatch_span(endpoint.as_str(), self.debug);

        async {
            if self.debug {
                info!(
                    %url,
                    payload = %redacted(&payload),
                    "analytics debug mode, payload not sent"
                );
                record_dispatch(endpoint, "debug", "ok");
                return Ok(DispatchOutcome::Logged { url, payload });
            }

            let start = Instant::now();
            let result = self.transport.post_json(&url, &payload).await;
            metrics::dispatch_duration_ms().record(
                start.elapsed().as_secs_f64() * 1000.0,
                &[KeyValue::new("endpoint", endpoint.as_str())],
            );

            match result {
                Ok(status) => {
                    pipeline::record_status(&tracing::Span::current(), status);
                    record_dispatch(endpoint, "send", "ok");
                    debug!(%url, status, "analytics call sent");
                    Ok(DispatchOutcome::Sent { url, status })
                }
                Err(e) => {
                    if let Error::Status { status, .. } = &e {
                        pipeline::record_status(&tracing::Span::current(), *status);
                    }
                    record_dispatch(endpoint, "send", "error");
                    warn!(%url, "analytics call failed: {e}");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn record_dispatch(endpoint: Endpoint, mode: &'static str, result: &'static str) {
    metrics::envelopes_dispatched().add(
        1,
        &[
            KeyValue::new("endpoint", endpoint.as_str()),
            KeyValue::new("mode", mode),
            KeyValue::new("result", result),
        ],
    );
}

fn redacted(payload: &Value) -> Value {
    let mut shown = payload.clone();
    if let Some(key) = shown.get_mut("api_key") {
        *key = Value::from("[REDACTED]");
    }
    shown
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// One handler per envelope type. The router calls these.
#[async_trait]
pub trait EventHandlers: Send + Sync {
    async fn handle_identify(
        &self,
        user_id: &UserId,
        group_id: &GroupId,
        traits: &Traits,
    ) -> Result<()>;

    async fn handle_group(&self, group_id: &GroupId, traits: &Traits) -> Result<()>;

    async fn handle_track_event(&self, user_id: &UserId, event: &str) -> Result<()>;
}

#[derive(Serialize)]
struct UserCall<'a> {
    user_id: &'a UserId,
    group_id: &'a GroupId,
    traits: &'a Traits,
}

#[derive(Serialize)]
struct GroupCall<'a> {
    group_id: &'a GroupId,
    traits: &'a Traits,
}

#[derive(Serialize)]
struct EventCall<'a> {
    user_id: &'a UserId,
    event: &'a str,
}

#[async_trait]
impl EventHandlers for Dispatcher {
    async fn handle_identify(
        &self,
        user_id: &UserId,
        group_id: &GroupId,
        traits: &Traits,
    ) -> Result<()> {
        let call = UserCall {
            user_id,
            group_id,
            traits,
        };
        self.dispatch(Endpoint::Users, &call).await.map(|_| ())
    }

    async fn handle_group(&self, group_id: &GroupId, traits: &Traits) -> Result<()> {
        let call = GroupCall { group_id, traits };
        self.dispatch(Endpoint::Groups, &call).await.map(|_| ())
    }

    async fn handle_track_event(&self, user_id: &UserId, event: &str) -> Result<()> {
        let call = EventCall { user_id, event };
        self.dispatch(Endpoint::Events, &call).await.map(|_| ())
    }
}

/// Handlers behind a shared pointer are still handlers.
#[async_trait]
impl<H: EventHandlers + ?Sized> EventHandlers for Arc<H> {
    async fn handle_identify(
        &self,
        user_id: &UserId,
        group_id: &GroupId,
        traits: &Traits,
    ) -> Result<()> {
        (**self).handle_identify(user_id, group_id, traits).await
    }

    async fn handle_group(&self, group_id: &GroupId, traits: &Traits) -> Result<()> {
        (**self).handle_group(group_id, traits).await
    }

    async fn handle_track_event(&self, user_id: &UserId, event: &str) -> Result<()> {
        (**self).handle_track_event(user_id, event).await
    }
}

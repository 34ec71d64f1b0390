//! Reachability checks for the services around the twin.

use std::sync::Arc;
use std::time::Duration;

use hornsync_config::DittoProbeConfig;
use hornsync_config::MqttProbeConfig;
use hornsync_config::ProbesConfig;
use rumqttc::AsyncClient;
use rumqttc::ConnectReturnCode;
use rumqttc::Event;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use serde::Serialize;

use crate::store::TwinStore;

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProbeResult {
    Ok { detail: String },
    Failed { error: String },
    Skipped { reason: String },
}

impl ProbeResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, ProbeResult::Failed { .. })
    }

    fn ok(detail: impl Into<String>) -> Self {
        ProbeResult::Ok {
            detail: detail.into(),
        }
    }

    fn failed(error: impl ToString) -> Self {
        ProbeResult::Failed {
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub store: ProbeResult,
    pub mqtt: ProbeResult,
    pub ditto: ProbeResult,
}

impl ProbeReport {
    pub fn all_ok(&self) -> bool {
        ![&self.store, &self.mqtt, &self.ditto]
            .iter()
            .any(|r| r.is_failed())
    }
}

/// Lists the store's things.
pub async fn probe_store(store: &dyn TwinStore, timeout: Duration) -> ProbeResult {
    match tokio::time::timeout(timeout, store.list()).await {
        Ok(Ok(things)) => ProbeResult::ok(format!(
            "{} store reachable, {} thing(s)",
            store.kind(),
            things.len()
        )),
        Ok(Err(e)) => ProbeResult::failed(e),
        Err(_) => ProbeResult::failed(format!("no answer within {:?}", timeout)),
    }
}

/// Connects to the broker and waits for its CONNACK.
pub async fn probe_mqtt(config: Option<&MqttProbeConfig>, timeout: Duration) -> ProbeResult {
    let Some(config) = config else {
        return ProbeResult::Skipped {
            reason: "probes.mqtt not configured".to_string(),
        };
    };

    let client_id = format!("hornsync-probe-{}", std::process::id());
    let mut options = MqttOptions::new(client_id, config.broker.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(30));
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }

    let (client, mut event_loop) = AsyncClient::new(options, 10);
    let handshake = async {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack.code),
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
    };

    let result = match tokio::time::timeout(timeout, handshake).await {
        Ok(Ok(ConnectReturnCode::Success)) => {
            ProbeResult::ok(format!("connected to {}:{}", config.broker, config.port))
        }
        Ok(Ok(code)) => ProbeResult::failed(format!("broker refused connection: {:?}", code)),
        Ok(Err(e)) => ProbeResult::failed(e),
        Err(_) => ProbeResult::failed(format!("no CONNACK within {:?}", timeout)),
    };

    if let Err(e) = client.try_disconnect() {
        tracing::debug!("MQTT probe disconnect failed: {}", e);
    }
    result
}

/// Issues an authenticated GET against the Ditto endpoint.
pub async fn probe_ditto(config: Option<&DittoProbeConfig>, timeout: Duration) -> ProbeResult {
    let Some(config) = config else {
        return ProbeResult::Skipped {
            reason: "probes.ditto not configured".to_string(),
        };
    };

    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => return ProbeResult::failed(e),
    };

    let mut request = client.get(&config.url);
    if let Some(key) = &config.api_key {
        request = request.bearer_auth(key);
    }

    match request.send().await.and_then(|r| r.error_for_status()) {
        Ok(response) => ProbeResult::ok(format!("{} answered {}", config.url, response.status())),
        Err(e) => ProbeResult::failed(e),
    }
}

pub async fn run_all(config: &ProbesConfig, store: Arc<dyn TwinStore>) -> ProbeReport {
    let (store, mqtt, ditto) = tokio::join!(
        probe_store(store.as_ref(), config.timeout),
        probe_mqtt(config.mqtt.as_ref(), config.timeout),
        probe_ditto(config.ditto.as_ref(), config.timeout),
    );
    ProbeReport { store, mqtt, ditto }
}

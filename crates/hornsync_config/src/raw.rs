//! Raw, span-carrying mirror of the configuration file.
//!
//! Every field is optional here; defaults and cross-field checks are applied
//! when converting into [`crate::Config`].

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::config::ConnectPolicy;
use crate::config::LogLevel;
use crate::located::Located;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawConfig {
    pub logging: Option<RawLogging>,
    pub twin: Option<RawTwin>,
    pub serial: Option<RawSerial>,
    pub sync: Option<RawSync>,
    pub api: Option<RawApi>,
    pub probes: Option<RawProbes>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawLogging {
    pub level: Option<Located<LogLevel>>,
    #[serde(default)]
    pub overrides: BTreeMap<String, Located<LogLevel>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum RawStoreKind {
    Memory,
    File,
    Http,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawTwin {
    pub thing_id: Option<Located<String>>,
    pub store: Option<Located<RawStoreKind>>,
    pub path: Option<Located<String>>,
    pub url: Option<Located<String>>,
    pub timeout_ms: Option<Located<u64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawSerial {
    pub port: Option<Located<String>>,
    pub baud_rate: Option<Located<u32>>,
    pub write_timeout_ms: Option<Located<u64>>,
    pub settle_ms: Option<Located<u64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawSync {
    pub interval_ms: Option<Located<u64>>,
    pub connect_policy: Option<Located<ConnectPolicy>>,
    pub auto_connect: Option<Located<bool>>,
    pub auto_sync: Option<Located<bool>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawApi {
    pub listen: Option<Located<String>>,
    pub port: Option<Located<u16>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawProbes {
    pub timeout_ms: Option<Located<u64>>,
    pub mqtt: Option<RawMqttProbe>,
    pub ditto: Option<RawDittoProbe>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawMqttProbe {
    pub broker: Located<String>,
    pub port: Option<Located<u16>>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawDittoProbe {
    pub url: Located<String>,
    pub api_key: Option<String>,
}

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::diagnostics::Diagnostic;
use crate::diagnostics::Diagnostics;
use crate::diagnostics::Error;
use crate::diagnostics::LoadError;
use crate::diagnostics::SourceInfo;
use crate::diagnostics::ValidationError;
use crate::diagnostics::Warning;
use crate::located::Located;
use crate::raw::RawConfig;
use crate::raw::RawStoreKind;

/// Thing id of the demo car twin.
pub const DEFAULT_THING_ID: &str = "car:horn-car-001";

const DEFAULT_BAUD_RATE: u32 = 9600;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1000;
const DEFAULT_SETTLE_MS: u64 = 2000;
const DEFAULT_SYNC_INTERVAL_MS: u64 = 1000;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_API_PORT: u16 = 8565;

/// Below this the periodic reconcile would hammer the twin store.
const MIN_SYNC_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub twin: TwinConfig,
    pub serial: SerialConfig,
    pub sync: SyncConfig,
    pub api: ApiConfig,
    pub probes: ProbesConfig,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    /// Per-target levels, e.g. `"hornsync::sync" = "debug"`
    pub overrides: BTreeMap<String, LogLevel>,
}

/// Where the twin documents live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local store, lost on exit
    Memory,

    /// One JSON document per thing inside a directory
    File { dir: PathBuf },

    /// A remote hornsync API
    Http { url: String, timeout: Duration },
}

#[derive(Debug, Clone)]
pub struct TwinConfig {
    /// Thing id of the twin the synchronizer drives
    pub thing_id: String,
    pub store: StoreBackend,
}

impl Default for TwinConfig {
    fn default() -> Self {
        Self {
            thing_id: DEFAULT_THING_ID.to_string(),
            store: StoreBackend::Memory,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyACM0` or `COM3`
    pub port: Option<String>,
    pub baud_rate: u32,

    /// Upper bound on a single write + flush
    pub write_timeout: Duration,

    /// Delay after opening the port; the board resets when the port opens
    pub settle: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
        }
    }
}

/// How the hardware state is established when a connection opens.
///
/// The device has no read-back channel, so the synchronizer either pushes
/// the twin's state or takes it on trust.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectPolicy {
    /// Send the twin's state and record it once the send succeeds
    #[default]
    Push,

    /// Record the twin's state as the hardware state without sending
    Assume,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub interval: Duration,
    pub connect_policy: ConnectPolicy,

    /// Open the serial connection when the daemon starts
    pub auto_connect: bool,

    /// Start periodic reconciliation once connected at startup
    pub auto_sync: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS),
            connect_policy: ConnectPolicy::default(),
            auto_connect: false,
            auto_sync: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub listen: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1".to_string(),
            port: DEFAULT_API_PORT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbesConfig {
    pub timeout: Duration,
    pub mqtt: Option<MqttProbeConfig>,
    pub ditto: Option<DittoProbeConfig>,
}

impl Default for ProbesConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            mqtt: None,
            ditto: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MqttProbeConfig {
    pub broker: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DittoProbeConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Returns `Ok((config, diagnostics))` when there are no errors (the
    /// diagnostics may still hold warnings), or `Err(diagnostics)` with every
    /// error found so they can all be reported at once.
    pub fn from_file(path: impl AsRef<Path>) -> Result<(Self, Diagnostics), Diagnostics> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_source(SourceInfo {
            file_path: path.to_path_buf(),
            content,
        })
    }

    /// Load configuration from an in-memory TOML string
    pub fn from_toml(content: &str) -> Result<(Self, Diagnostics), Diagnostics> {
        Self::from_source(SourceInfo {
            file_path: PathBuf::from("<inline>"),
            content: content.to_string(),
        })
    }

    fn from_source(source: SourceInfo) -> Result<(Self, Diagnostics), Diagnostics> {
        if source.content.trim().is_empty() {
            let warning = Diagnostic::Warning(Warning::EmptyConfig {
                file_path: source.file_path,
            });
            return Ok((Config::default(), Diagnostics(vec![warning])));
        }

        let raw: RawConfig = toml::from_str(&source.content).map_err(|e| LoadError::Parse {
            path: source.file_path.clone(),
            error: e.message().to_string(),
            span: e.span(),
            content: source.content.clone(),
        })?;

        let mut builder = Builder {
            source: &source,
            diagnostics: Vec::new(),
        };
        let config = builder.build(raw);

        let diagnostics = Diagnostics(builder.diagnostics);
        if diagnostics.has_errors() {
            Err(diagnostics)
        } else {
            Ok((config, diagnostics))
        }
    }
}

/// Converts the raw file into a [`Config`], collecting every problem on the
/// way instead of stopping at the first one.
struct Builder<'a> {
    source: &'a SourceInfo,
    diagnostics: Vec<Diagnostic>,
}

impl Builder<'_> {
    fn error(&mut self, field_path: &str, message: impl Into<String>, span: Option<Range<usize>>) {
        self.diagnostics
            .push(Diagnostic::Error(Error::Validation(ValidationError {
                field_path: field_path.to_string(),
                message: message.into(),
                span,
                source: Some(self.source.clone()),
            })));
    }

    fn ignored(&mut self, field_path: &str, message: impl Into<String>, span: Range<usize>) {
        self.diagnostics
            .push(Diagnostic::Warning(Warning::IgnoredSetting {
                field_path: field_path.to_string(),
                message: message.into(),
                span: Some(span),
                source: Some(self.source.clone()),
            }));
    }

    /// Unwrap a millisecond field, rejecting zero
    fn positive_millis(&mut self, field_path: &str, value: Option<Located<u64>>, default: u64) -> Duration {
        match value {
            Some(ms) if *ms == 0 => {
                self.error(field_path, "must be greater than zero", Some(ms.span()));
                Duration::from_millis(default)
            }
            Some(ms) => Duration::from_millis(ms.into_inner()),
            None => Duration::from_millis(default),
        }
    }

    fn build(&mut self, raw: RawConfig) -> Config {
        let logging = raw
            .logging
            .map(|logging| LoggingConfig {
                level: logging.level.map(Located::into_inner).unwrap_or_default(),
                overrides: logging
                    .overrides
                    .into_iter()
                    .map(|(target, level)| (target, level.into_inner()))
                    .collect(),
            })
            .unwrap_or_default();

        let twin = self.build_twin(raw.twin.unwrap_or_default());
        let serial = self.build_serial(raw.serial.unwrap_or_default());
        let sync = self.build_sync(raw.sync.unwrap_or_default(), &serial);
        let api = self.build_api(raw.api.unwrap_or_default());
        let probes = self.build_probes(raw.probes.unwrap_or_default());

        Config {
            logging,
            twin,
            serial,
            sync,
            api,
            probes,
        }
    }

    fn build_twin(&mut self, raw: crate::raw::RawTwin) -> TwinConfig {
        let thing_id = match raw.thing_id {
            Some(id) if id.trim().is_empty() => {
                self.error("twin.thing_id", "thing id must not be empty", Some(id.span()));
                DEFAULT_THING_ID.to_string()
            }
            Some(id) if !id.contains(':') => {
                self.error(
                    "twin.thing_id",
                    "thing id must be namespaced as '<namespace>:<name>'",
                    Some(id.span()),
                );
                id.into_inner()
            }
            Some(id) => id.into_inner(),
            None => DEFAULT_THING_ID.to_string(),
        };

        let kind = raw
            .store
            .as_ref()
            .map(|k| *k.get_ref())
            .unwrap_or(RawStoreKind::Memory);
        let store_span = raw.store.as_ref().map(Located::span);

        if kind != RawStoreKind::File {
            if let Some(path) = &raw.path {
                self.ignored("twin.path", "only used by the file store", path.span());
            }
        }
        if kind != RawStoreKind::Http {
            if let Some(url) = &raw.url {
                self.ignored("twin.url", "only used by the http store", url.span());
            }
            if let Some(timeout) = &raw.timeout_ms {
                self.ignored("twin.timeout_ms", "only used by the http store", timeout.span());
            }
        }

        let store = match kind {
            RawStoreKind::Memory => StoreBackend::Memory,
            RawStoreKind::File => match raw.path {
                Some(path) => StoreBackend::File {
                    dir: PathBuf::from(path.into_inner()),
                },
                None => {
                    self.error("twin.path", "the file store requires a directory path", store_span);
                    StoreBackend::Memory
                }
            },
            RawStoreKind::Http => {
                let timeout =
                    self.positive_millis("twin.timeout_ms", raw.timeout_ms, DEFAULT_HTTP_TIMEOUT_MS);
                match raw.url {
                    Some(url) if !is_http_url(&url) => {
                        self.error(
                            "twin.url",
                            "url must start with http:// or https://",
                            Some(url.span()),
                        );
                        StoreBackend::Memory
                    }
                    Some(url) => StoreBackend::Http {
                        url: url.into_inner().trim_end_matches('/').to_string(),
                        timeout,
                    },
                    None => {
                        self.error("twin.url", "the http store requires a url", store_span);
                        StoreBackend::Memory
                    }
                }
            }
        };

        TwinConfig { thing_id, store }
    }

    fn build_serial(&mut self, raw: crate::raw::RawSerial) -> SerialConfig {
        let port = match raw.port {
            Some(port) if port.trim().is_empty() => {
                self.error("serial.port", "port must not be empty", Some(port.span()));
                None
            }
            Some(port) => Some(port.into_inner()),
            None => None,
        };

        let baud_rate = match raw.baud_rate {
            Some(baud) if *baud == 0 => {
                self.error(
                    "serial.baud_rate",
                    "baud rate must be greater than zero",
                    Some(baud.span()),
                );
                DEFAULT_BAUD_RATE
            }
            Some(baud) => baud.into_inner(),
            None => DEFAULT_BAUD_RATE,
        };

        let write_timeout = self.positive_millis(
            "serial.write_timeout_ms",
            raw.write_timeout_ms,
            DEFAULT_WRITE_TIMEOUT_MS,
        );

        // Zero is allowed: boards without auto-reset need no settle time
        let settle = raw
            .settle_ms
            .map(|ms| Duration::from_millis(ms.into_inner()))
            .unwrap_or(Duration::from_millis(DEFAULT_SETTLE_MS));

        SerialConfig {
            port,
            baud_rate,
            write_timeout,
            settle,
        }
    }

    fn build_sync(&mut self, raw: crate::raw::RawSync, serial: &SerialConfig) -> SyncConfig {
        let interval = match raw.interval_ms {
            Some(ms) if *ms < MIN_SYNC_INTERVAL_MS => {
                self.error(
                    "sync.interval_ms",
                    format!("interval must be at least {} ms", MIN_SYNC_INTERVAL_MS),
                    Some(ms.span()),
                );
                Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS)
            }
            Some(ms) => Duration::from_millis(ms.into_inner()),
            None => Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS),
        };

        let auto_connect = raw.auto_connect.as_ref().map(|b| *b.get_ref()).unwrap_or(false);
        if auto_connect && serial.port.is_none() {
            self.error(
                "sync.auto_connect",
                "auto_connect requires serial.port to be set",
                raw.auto_connect.as_ref().map(Located::span),
            );
        }

        let auto_sync = raw.auto_sync.as_ref().map(|b| *b.get_ref()).unwrap_or(false);
        if auto_sync && !auto_connect {
            self.error(
                "sync.auto_sync",
                "auto_sync requires auto_connect",
                raw.auto_sync.as_ref().map(Located::span),
            );
        }

        SyncConfig {
            interval,
            connect_policy: raw
                .connect_policy
                .map(Located::into_inner)
                .unwrap_or_default(),
            auto_connect,
            auto_sync,
        }
    }

    fn build_api(&mut self, raw: crate::raw::RawApi) -> ApiConfig {
        let defaults = ApiConfig::default();

        let listen = match raw.listen {
            Some(listen) if listen.parse::<std::net::IpAddr>().is_err() => {
                self.error(
                    "api.listen",
                    "listen must be an IP address",
                    Some(listen.span()),
                );
                defaults.listen
            }
            Some(listen) => listen.into_inner(),
            None => defaults.listen,
        };

        let port = match raw.port {
            Some(port) if *port == 0 => {
                self.error("api.port", "port must not be zero", Some(port.span()));
                defaults.port
            }
            Some(port) => port.into_inner(),
            None => defaults.port,
        };

        ApiConfig { listen, port }
    }

    fn build_probes(&mut self, raw: crate::raw::RawProbes) -> ProbesConfig {
        let timeout =
            self.positive_millis("probes.timeout_ms", raw.timeout_ms, DEFAULT_PROBE_TIMEOUT_MS);

        let mqtt = raw.mqtt.map(|mqtt| MqttProbeConfig {
            broker: mqtt.broker.into_inner(),
            port: mqtt.port.map(Located::into_inner).unwrap_or(DEFAULT_MQTT_PORT),
            username: mqtt.username,
            password: mqtt.password,
        });

        let ditto = match raw.ditto {
            Some(ditto) if !is_http_url(&ditto.url) => {
                self.error(
                    "probes.ditto.url",
                    "url must start with http:// or https://",
                    Some(ditto.url.span()),
                );
                None
            }
            Some(ditto) => Some(DittoProbeConfig {
                url: ditto.url.into_inner(),
                api_key: ditto.api_key,
            }),
            None => None,
        };

        ProbesConfig {
            timeout,
            mqtt,
            ditto,
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

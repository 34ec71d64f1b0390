//! Configuration loading for hornsync.
//!
//! Configuration is a single TOML file. Every value is parsed together with
//! its byte span so that validation problems can be reported against the
//! exact line that caused them.

mod config;
mod diagnostics;
mod located;
mod raw;

pub use config::ApiConfig;
pub use config::Config;
pub use config::ConnectPolicy;
pub use config::DittoProbeConfig;
pub use config::LogLevel;
pub use config::LoggingConfig;
pub use config::MqttProbeConfig;
pub use config::ProbesConfig;
pub use config::SerialConfig;
pub use config::StoreBackend;
pub use config::SyncConfig;
pub use config::TwinConfig;
pub use config::DEFAULT_THING_ID;
pub use diagnostics::format_diagnostics;
pub use diagnostics::Diagnostic;
pub use diagnostics::Diagnostics;
pub use diagnostics::Error;
pub use diagnostics::LoadError;
pub use diagnostics::SourceInfo;
pub use diagnostics::ValidationError;
pub use diagnostics::Warning;
pub use located::Located;

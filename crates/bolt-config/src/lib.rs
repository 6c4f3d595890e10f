// SPDX-License-Identifier: MIT OR Apache-2.0
//! AppConfig loading, validation, and env overrides (§6, §11.3).
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! `bolt-app` loads [`AppConfig`] once at startup via [`load_config`], then
//! [`validate_config`] before wiring up receivers — mirroring how the
//! teacher's `abp-config` separates parsing from semantic validation.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more unusable settings).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

/// Advisory-level issues that don't prevent startup but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// `unhandled_request_timeout_millis` is set far below the platform's
    /// 3000 ms ack budget, which would make the deadline warning fire on
    /// nearly every envelope.
    LowUnhandledTimeout {
        /// The configured value, in milliseconds.
        millis: u64,
    },
    /// No signing secret was supplied; HTTP request verification will
    /// reject every inbound request once a receiver is started.
    MissingSigningSecret,
    /// Neither a static token nor deferred initialization was configured,
    /// so a custom `authorize` resolver must be wired in code instead.
    MissingOptionalToken,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowUnhandledTimeout { millis } => {
                write!(f, "unhandled_request_timeout_millis ({millis}) is well under the 3000ms ack budget")
            }
            Self::MissingOptionalToken => {
                write!(f, "no static token configured; an authorize resolver must be wired in code")
            }
            Self::MissingSigningSecret => {
                write!(f, "no signing_secret configured; HTTP verification will reject every request")
            }
        }
    }
}

/// The minimum sane value for `unhandled_request_timeout_millis` before it
/// starts warning (§12 supplemented feature 1).
const LOW_TIMEOUT_THRESHOLD_MILLIS: u64 = 500;

/// Default deadline the platform allows before a response is expected.
const DEFAULT_UNHANDLED_TIMEOUT_MILLIS: u64 = 3000;

/// Path overrides for the HTTP receiver's built-in routes.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Endpoints {
    /// Path the events route is served from. Default `/slack/events`.
    #[serde(default = "default_events_path")]
    pub events: String,
}

fn default_events_path() -> String {
    "/slack/events".to_string()
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            events: default_events_path(),
        }
    }
}

/// One entry in `custom_routes` — method + parameterized path pattern.
/// The handler itself is wired in code (`bolt-app`); only the route shape
/// is configuration data.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CustomRouteSpec {
    /// HTTP method, e.g. `"GET"`.
    pub method: String,
    /// Path pattern, e.g. `/status/:run_id`.
    pub path_pattern: String,
}

/// Top-level application configuration (§6's configuration-options list).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Static bot token. Mutually exclusive with a custom resolver being
    /// wired in code — `bolt-app` enforces that exclusivity, since "custom
    /// resolver" is a runtime value, not configuration data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// HMAC signing secret for HTTP request verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,

    /// App-level token, required for Socket mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_token: Option<String>,

    /// Selects the Socket receiver instead of HTTP.
    #[serde(default)]
    pub socket_mode: bool,

    /// Wires the `ignore_self` built-in middleware. Default `true`.
    #[serde(default = "default_true")]
    pub ignore_self: bool,

    /// Overrides for the HTTP receiver's built-in routes.
    #[serde(default)]
    pub endpoints: Endpoints,

    /// Ack policy switch: process-before-respond when `true` (§4.E mode 2).
    #[serde(default)]
    pub process_before_response: bool,

    /// Deadline (milliseconds) before the Ack Controller logs an expiry
    /// warning. Default 3000 (§4.E, §12 item 1).
    #[serde(default = "default_unhandled_timeout")]
    pub unhandled_request_timeout_millis: u64,

    /// Additional HTTP routes beyond the events endpoint.
    #[serde(default)]
    pub custom_routes: Vec<CustomRouteSpec>,

    /// Widens the log filter and enables verbose diagnostics.
    #[serde(default)]
    pub developer_mode: bool,

    /// `EnvFilter` directive, e.g. `"info"` or `"bolt=debug"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Build the app without side effects (no receiver start, no client
    /// construction); the host must call `init()` explicitly afterwards.
    #[serde(default)]
    pub defer_initialization: bool,
}

fn default_true() -> bool {
    true
}

fn default_unhandled_timeout() -> u64 {
    DEFAULT_UNHANDLED_TIMEOUT_MILLIS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            token: None,
            signing_secret: None,
            app_token: None,
            socket_mode: false,
            ignore_self: true,
            endpoints: Endpoints::default(),
            process_before_response: false,
            unhandled_request_timeout_millis: DEFAULT_UNHANDLED_TIMEOUT_MILLIS,
            custom_routes: Vec::new(),
            developer_mode: false,
            log_level: None,
            defer_initialization: false,
        }
    }
}

/// Load an [`AppConfig`] from an optional TOML file path, then apply
/// environment variable overrides.
///
/// `path = None` starts from [`AppConfig::default`].
///
/// # Errors
///
/// Returns [`ConfigError::FileNotFound`] if `path` is `Some` and unreadable,
/// or [`ConfigError::ParseError`] if the contents aren't valid TOML for
/// this shape.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => AppConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into an [`AppConfig`].
///
/// # Errors
///
/// Returns [`ConfigError::ParseError`] if `content` is not valid TOML for
/// this shape.
pub fn parse_toml(content: &str) -> Result<AppConfig, ConfigError> {
    toml::from_str::<AppConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// Apply environment variable overrides on top of an already-loaded config.
///
/// Recognised variables:
/// - `BOLT_TOKEN`
/// - `BOLT_SIGNING_SECRET`
/// - `BOLT_APP_TOKEN`
/// - `BOLT_SOCKET_MODE` (`"true"`/`"1"` enables)
/// - `BOLT_LOG_LEVEL`
pub fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(val) = std::env::var("BOLT_TOKEN") {
        config.token = Some(val);
    }
    if let Ok(val) = std::env::var("BOLT_SIGNING_SECRET") {
        config.signing_secret = Some(val);
    }
    if let Ok(val) = std::env::var("BOLT_APP_TOKEN") {
        config.app_token = Some(val);
    }
    if let Ok(val) = std::env::var("BOLT_SOCKET_MODE") {
        config.socket_mode = matches!(val.as_str(), "true" | "1");
    }
    if let Ok(val) = std::env::var("BOLT_LOG_LEVEL") {
        config.log_level = Some(val);
    }
}

/// Validate a loaded configuration, returning advisory warnings.
///
/// Hard errors (conflicting token sources, Socket mode without an app
/// token, an HTTP receiver without a signing secret) come back as
/// [`ConfigError::ValidationError`]; soft issues come back as
/// [`ConfigWarning`]s.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] if the configuration is
/// internally inconsistent (see above).
pub fn validate_config(config: &AppConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if config.token.is_none() && !config.defer_initialization {
        warnings.push(ConfigWarning::MissingOptionalToken);
    }

    if config.socket_mode && config.app_token.is_none() {
        errors.push("socket_mode requires app_token to be set".to_string());
    }

    if !config.socket_mode && config.signing_secret.is_none() {
        warnings.push(ConfigWarning::MissingSigningSecret);
    }

    if config.unhandled_request_timeout_millis < LOW_TIMEOUT_THRESHOLD_MILLIS {
        warnings.push(ConfigWarning::LowUnhandledTimeout {
            millis: config.unhandled_request_timeout_millis,
        });
    }

    for route in &config.custom_routes {
        if route.path_pattern.is_empty() {
            errors.push("custom_routes entry has an empty path_pattern".to_string());
        }
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

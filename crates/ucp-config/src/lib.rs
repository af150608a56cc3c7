// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading and validation for the UCP gateway (§6.3).
//!
//! A [`GatewayConfig`] is loaded once at startup from `CONFIG_FILE` (a JSON
//! document) or environment variables; env vars always take precedence so a
//! deployment can override individual fields without editing the file. The
//! `"production"` profile additionally resolves `secret:`-prefixed values
//! through a pluggable [`SecretSource`].
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use ucp_core::{CapabilityRegistry, HandlerRegistry};

/// Protocol version advertised when `protocol_version` is absent from the
/// config (§6.3, §9: version strings are `YYYY-MM-DD`).
pub const DEFAULT_PROTOCOL_VERSION: &str = "2026-01-11";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid JSON.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },

    /// A `secret:`-prefixed reference could not be resolved.
    #[error("secret resolution failed for '{reference}': {reason}")]
    SecretResolutionError {
        /// The reference that failed to resolve.
        reference: String,
        /// Human-readable failure detail.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level runtime configuration for the gateway (§6.3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct GatewayConfig {
    /// Which upstream backend this gateway instance talks to, and its
    /// backend-specific required credentials.
    pub backend: BackendConfig,

    /// UCP protocol version this merchant supports, advertised in its
    /// discovery profile and used as the version gate's business side
    /// (§4.1 step 3). Defaults to [`DEFAULT_PROTOCOL_VERSION`] when absent.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    /// Capability families this merchant supports, advertised in its
    /// discovery profile and intersected against the agent's (§4.1 step 4).
    #[serde(default)]
    pub capabilities: CapabilityRegistry,

    /// Store domain, used to build checkout ids (§4.2). Derived from the
    /// backend's `store_url` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_domain: Option<String>,

    /// Human-readable merchant name, surfaced in the discovery profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,

    /// Typed policy links (e.g. terms of service, privacy policy).
    #[serde(default)]
    pub policy_links: Vec<PolicyLink>,

    /// Payment handler families this merchant advertises. Opaque to the
    /// gateway beyond the shape `ucp_core::HandlerRegistry` already
    /// describes — passed straight through into the discovery profile.
    #[serde(default)]
    pub payment_handlers: HandlerRegistry,

    /// Per-merchant escalation triggers (§4.7).
    #[serde(default)]
    pub escalation: EscalationSettings,
}

fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}

/// Backend selection and its required credentials (§6.3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "type")]
pub enum BackendConfig {
    /// Nonce-authenticated WooCommerce Store API (§4.4).
    #[serde(rename = "woocommerce")]
    Wc {
        /// Store base URL.
        store_url: String,
        /// API consumer key.
        api_key: String,
        /// API consumer secret. May be a `secret:NAME` reference, resolved
        /// in the `"production"` profile.
        api_secret: String,
    },
    /// Token-authenticated hosted-store OAuth API (§4.5).
    #[serde(rename = "oauth")]
    Oauth {
        /// Store base URL.
        store_url: String,
        /// OAuth client id used for the anonymous grant. May be a
        /// `secret:NAME` reference, resolved in the `"production"` profile.
        wix_client_id: String,
    },
}

impl BackendConfig {
    /// The backend's configured store URL, regardless of which variant.
    #[must_use]
    pub fn store_url(&self) -> &str {
        match self {
            BackendConfig::Wc { store_url, .. } | BackendConfig::Oauth { store_url, .. } => store_url,
        }
    }
}

/// A single typed policy link.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PolicyLink {
    /// Link relation, e.g. `"terms-of-service"` or `"privacy-policy"`.
    pub rel: String,
    /// Target URL.
    pub url: String,
}

/// Raw escalation configuration (§4.7), before conversion into
/// `ucp_adapter::EscalationConfig` by the gateway binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct EscalationSettings {
    /// Product ids that always force escalation.
    #[serde(default)]
    pub product_ids: Vec<i64>,
    /// Metadata keys that, if present on a line's extensions, force
    /// escalation regardless of product id.
    #[serde(default)]
    pub custom_fields: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Name of the environment variable naming the config file path.
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// Load a [`GatewayConfig`] from an optional JSON file path, applying
/// environment variable overrides on top.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, the config is built entirely from environment
///   variables.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_json(&content)?
        }
        None => config_from_env()?,
    };
    apply_env_overrides(&mut config);
    if config.store_domain.is_none() {
        config.store_domain = Some(derive_store_domain(config.backend.store_url()));
    }
    Ok(config)
}

/// Load using `CONFIG_FILE` if set, falling back to pure environment
/// variables otherwise (§6.3: "loaded... from `CONFIG_FILE`... or
/// environment variables").
pub fn load_config_from_env_or_file() -> Result<GatewayConfig, ConfigError> {
    match std::env::var(CONFIG_FILE_ENV) {
        Ok(path) => load_config(Some(Path::new(&path))),
        Err(_) => load_config(None),
    }
}

/// Parse a JSON string into a [`GatewayConfig`].
pub fn parse_json(content: &str) -> Result<GatewayConfig, ConfigError> {
    serde_json::from_str(content).map_err(|e| ConfigError::ParseError { reason: e.to_string() })
}

/// Derive a store domain from a `store_url` by stripping the scheme and
/// any path suffix.
#[must_use]
pub fn derive_store_domain(store_url: &str) -> String {
    let without_scheme = store_url.split("://").next_back().unwrap_or(store_url);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Build a [`GatewayConfig`] purely from environment variables.
///
/// Requires `UCP_BACKEND` (`"woocommerce"` or `"oauth"`) plus that
/// backend's required fields (§6.3).
fn config_from_env() -> Result<GatewayConfig, ConfigError> {
    let kind = std::env::var("UCP_BACKEND").map_err(|_| ConfigError::ValidationError {
        reasons: vec!["UCP_BACKEND is required when no CONFIG_FILE is set".into()],
    })?;
    let store_url = std::env::var("UCP_STORE_URL").unwrap_or_default();

    let backend = match kind.as_str() {
        "woocommerce" => BackendConfig::Wc {
            store_url,
            api_key: std::env::var("UCP_API_KEY").unwrap_or_default(),
            api_secret: std::env::var("UCP_API_SECRET").unwrap_or_default(),
        },
        "oauth" => BackendConfig::Oauth {
            store_url,
            wix_client_id: std::env::var("UCP_WIX_CLIENT_ID").unwrap_or_default(),
        },
        other => {
            return Err(ConfigError::ValidationError {
                reasons: vec![format!("unknown UCP_BACKEND '{other}'")],
            });
        }
    };

    Ok(GatewayConfig {
        backend,
        protocol_version: default_protocol_version(),
        capabilities: CapabilityRegistry::new(),
        store_domain: None,
        merchant_name: None,
        policy_links: Vec::new(),
        payment_handlers: HandlerRegistry::new(),
        escalation: EscalationSettings::default(),
    })
}

/// Apply environment variable overrides on top of an already-loaded config.
///
/// Recognised variables: `UCP_STORE_URL`, `UCP_API_KEY`, `UCP_API_SECRET`,
/// `UCP_WIX_CLIENT_ID`, `UCP_MERCHANT_NAME`, `UCP_STORE_DOMAIN`,
/// `UCP_PROTOCOL_VERSION`.
pub fn apply_env_overrides(config: &mut GatewayConfig) {
    if let Ok(val) = std::env::var("UCP_MERCHANT_NAME") {
        config.merchant_name = Some(val);
    }
    if let Ok(val) = std::env::var("UCP_STORE_DOMAIN") {
        config.store_domain = Some(val);
    }
    if let Ok(val) = std::env::var("UCP_PROTOCOL_VERSION") {
        config.protocol_version = val;
    }

    match &mut config.backend {
        BackendConfig::Wc {
            store_url,
            api_key,
            api_secret,
        } => {
            if let Ok(val) = std::env::var("UCP_STORE_URL") {
                *store_url = val;
            }
            if let Ok(val) = std::env::var("UCP_API_KEY") {
                *api_key = val;
            }
            if let Ok(val) = std::env::var("UCP_API_SECRET") {
                *api_secret = val;
            }
        }
        BackendConfig::Oauth {
            store_url,
            wix_client_id,
        } => {
            if let Ok(val) = std::env::var("UCP_STORE_URL") {
                *store_url = val;
            }
            if let Ok(val) = std::env::var("UCP_WIX_CLIENT_ID") {
                *wix_client_id = val;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Secret resolution (production profile)
// ---------------------------------------------------------------------------

/// Prefix marking a config value as a secret-manager reference rather than
/// a literal.
pub const SECRET_PREFIX: &str = "secret:";

/// The gateway's production profile name; only this profile triggers
/// secret resolution.
pub const PRODUCTION_PROFILE: &str = "production";

/// A pluggable secret manager lookup. Concrete implementations (Vault,
/// cloud KMS, etc.) live outside this crate — this is a trait boundary
/// only, per the out-of-scope list.
pub trait SecretSource: Send + Sync {
    /// Resolve a secret by name, returning its plaintext value.
    fn resolve(&self, name: &str) -> Result<String, String>;
}

/// Resolve any `secret:`-prefixed fields in `config.backend` through
/// `source`. A no-op outside the `"production"` profile.
///
/// # Errors
///
/// Returns [`ConfigError::SecretResolutionError`] if `source` fails to
/// resolve a referenced secret.
pub fn resolve_secrets(
    config: &mut GatewayConfig,
    profile: &str,
    source: &dyn SecretSource,
) -> Result<(), ConfigError> {
    if profile != PRODUCTION_PROFILE {
        return Ok(());
    }
    match &mut config.backend {
        BackendConfig::Wc { api_key, api_secret, .. } => {
            *api_key = resolve_one(api_key, source)?;
            *api_secret = resolve_one(api_secret, source)?;
        }
        BackendConfig::Oauth { wix_client_id, .. } => {
            *wix_client_id = resolve_one(wix_client_id, source)?;
        }
    }
    Ok(())
}

fn resolve_one(value: &str, source: &dyn SecretSource) -> Result<String, ConfigError> {
    match value.strip_prefix(SECRET_PREFIX) {
        Some(name) => source
            .resolve(name)
            .map_err(|reason| ConfigError::SecretResolutionError {
                reference: value.to_string(),
                reason,
            }),
        None => Ok(value.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (empty required credentials) are returned as a
/// [`ConfigError::ValidationError`]; soft issues come back as warnings.
pub fn validate_config(config: &GatewayConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    match &config.backend {
        BackendConfig::Wc {
            store_url,
            api_key,
            api_secret,
        } => {
            if store_url.trim().is_empty() {
                errors.push("backend.store_url must not be empty".into());
            }
            if api_key.trim().is_empty() {
                errors.push("backend.api_key must not be empty".into());
            }
            if api_secret.trim().is_empty() {
                errors.push("backend.api_secret must not be empty".into());
            }
        }
        BackendConfig::Oauth {
            store_url,
            wix_client_id,
        } => {
            if store_url.trim().is_empty() {
                errors.push("backend.store_url must not be empty".into());
            }
            if wix_client_id.trim().is_empty() {
                errors.push("backend.wix_client_id must not be empty".into());
            }
        }
    }

    if config.merchant_name.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "merchant_name".into(),
            hint: "discovery profile will omit a human-readable merchant name".into(),
        });
    }
    if config.policy_links.is_empty() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "policy_links".into(),
            hint: "discovery profile will not advertise any policy links".into(),
        });
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Serializes the env-var tests in this module so they don't race each
    // other under the default multi-threaded test runner.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn wc_config() -> GatewayConfig {
        GatewayConfig {
            backend: BackendConfig::Wc {
                store_url: "https://shop.example.com".into(),
                api_key: "ck_test".into(),
                api_secret: "cs_test".into(),
            },
            protocol_version: default_protocol_version(),
            capabilities: CapabilityRegistry::new(),
            store_domain: None,
            merchant_name: Some("Example Shop".into()),
            policy_links: vec![PolicyLink {
                rel: "terms-of-service".into(),
                url: "https://shop.example.com/terms".into(),
            }],
            payment_handlers: HandlerRegistry::new(),
            escalation: EscalationSettings::default(),
        }
    }

    #[test]
    fn fully_specified_config_has_no_warnings() {
        let warnings = validate_config(&wc_config()).unwrap();
        assert!(warnings.is_empty(), "expected zero warnings: {warnings:?}");
    }

    #[test]
    fn missing_merchant_name_produces_warning() {
        let cfg = GatewayConfig {
            merchant_name: None,
            ..wc_config()
        };
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.iter().any(|w| matches!(
            w,
            ConfigWarning::MissingOptionalField { field, .. } if field == "merchant_name"
        )));
    }

    #[test]
    fn empty_wc_store_url_is_validation_error() {
        let cfg = GatewayConfig {
            backend: BackendConfig::Wc {
                store_url: String::new(),
                api_key: "ck".into(),
                api_secret: "cs".into(),
            },
            ..wc_config()
        };
        let err = validate_config(&cfg).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("store_url")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn empty_wc_api_secret_is_validation_error() {
        let cfg = GatewayConfig {
            backend: BackendConfig::Wc {
                store_url: "https://shop.example.com".into(),
                api_key: "ck".into(),
                api_secret: "  ".into(),
            },
            ..wc_config()
        };
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn empty_oauth_client_id_is_validation_error() {
        let cfg = GatewayConfig {
            backend: BackendConfig::Oauth {
                store_url: "https://store.example.com".into(),
                wix_client_id: String::new(),
            },
            ..wc_config()
        };
        let err = validate_config(&cfg).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("wix_client_id")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn parse_valid_wc_json() {
        let json = r#"{
            "backend": {"type": "woocommerce", "store_url": "https://shop.example.com", "api_key": "ck", "api_secret": "cs"},
            "merchant_name": "Example Shop"
        }"#;
        let cfg = parse_json(json).unwrap();
        assert_eq!(cfg.merchant_name.as_deref(), Some("Example Shop"));
        assert!(matches!(cfg.backend, BackendConfig::Wc { .. }));
    }

    #[test]
    fn parse_valid_oauth_json() {
        let json = r#"{
            "backend": {"type": "oauth", "store_url": "https://store.example.com", "wix_client_id": "abc"}
        }"#;
        let cfg = parse_json(json).unwrap();
        match cfg.backend {
            BackendConfig::Oauth { wix_client_id, .. } => assert_eq!(wix_client_id, "abc"),
            other => panic!("expected Oauth, got {other:?}"),
        }
    }

    #[test]
    fn parse_json_defaults_protocol_version_when_absent() {
        let json = r#"{
            "backend": {"type": "woocommerce", "store_url": "https://shop.example.com", "api_key": "ck", "api_secret": "cs"}
        }"#;
        let cfg = parse_json(json).unwrap();
        assert_eq!(cfg.protocol_version, DEFAULT_PROTOCOL_VERSION);
        assert!(cfg.capabilities.is_empty());
    }

    #[test]
    fn parse_invalid_json_gives_parse_error() {
        let err = parse_json("{not valid json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn parse_missing_backend_tag_gives_parse_error() {
        let err = parse_json(r#"{"backend": {"store_url": "https://x.example.com"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn derive_store_domain_strips_scheme_and_path() {
        assert_eq!(derive_store_domain("https://shop.example.com/wp-json"), "shop.example.com");
        assert_eq!(derive_store_domain("shop.example.com"), "shop.example.com");
    }

    #[test]
    fn load_config_derives_domain_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{"backend": {{"type": "woocommerce", "store_url": "https://shop.example.com", "api_key": "ck", "api_secret": "cs"}}}}"#
        )
        .unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.store_domain.as_deref(), Some("shop.example.com"));
    }

    #[test]
    fn load_missing_file_gives_file_not_found() {
        let err = load_config(Some(Path::new("/nonexistent/gateway.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn env_overrides_apply_on_top_of_file() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{"backend": {{"type": "woocommerce", "store_url": "https://shop.example.com", "api_key": "ck", "api_secret": "cs"}}}}"#
        )
        .unwrap();
        unsafe {
            std::env::set_var("UCP_MERCHANT_NAME", "Overridden Shop");
        }
        let cfg = load_config(Some(&path)).unwrap();
        unsafe {
            std::env::remove_var("UCP_MERCHANT_NAME");
        }
        assert_eq!(cfg.merchant_name.as_deref(), Some("Overridden Shop"));
    }

    #[test]
    fn config_from_env_requires_ucp_backend() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::remove_var("UCP_BACKEND");
        }
        let err = config_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn config_from_env_builds_wc_backend() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("UCP_BACKEND", "woocommerce");
            std::env::set_var("UCP_STORE_URL", "https://shop.example.com");
            std::env::set_var("UCP_API_KEY", "ck");
            std::env::set_var("UCP_API_SECRET", "cs");
        }
        let cfg = config_from_env().unwrap();
        unsafe {
            std::env::remove_var("UCP_BACKEND");
            std::env::remove_var("UCP_STORE_URL");
            std::env::remove_var("UCP_API_KEY");
            std::env::remove_var("UCP_API_SECRET");
        }
        match cfg.backend {
            BackendConfig::Wc { store_url, .. } => assert_eq!(store_url, "https://shop.example.com"),
            other => panic!("expected Wc, got {other:?}"),
        }
    }

    struct StaticSecretSource(std::collections::BTreeMap<&'static str, &'static str>);

    impl SecretSource for StaticSecretSource {
        fn resolve(&self, name: &str) -> Result<String, String> {
            self.0
                .get(name)
                .map(|v| (*v).to_string())
                .ok_or_else(|| format!("no such secret: {name}"))
        }
    }

    #[test]
    fn resolve_secrets_is_noop_outside_production() {
        let mut cfg = GatewayConfig {
            backend: BackendConfig::Wc {
                store_url: "https://shop.example.com".into(),
                api_key: "ck".into(),
                api_secret: "secret:wc_secret".into(),
            },
            ..wc_config()
        };
        let source = StaticSecretSource(std::collections::BTreeMap::from([("wc_secret", "resolved")]));
        resolve_secrets(&mut cfg, "development", &source).unwrap();
        match cfg.backend {
            BackendConfig::Wc { api_secret, .. } => assert_eq!(api_secret, "secret:wc_secret"),
            other => panic!("expected Wc, got {other:?}"),
        }
    }

    #[test]
    fn resolve_secrets_substitutes_in_production() {
        let mut cfg = GatewayConfig {
            backend: BackendConfig::Wc {
                store_url: "https://shop.example.com".into(),
                api_key: "ck".into(),
                api_secret: "secret:wc_secret".into(),
            },
            ..wc_config()
        };
        let source = StaticSecretSource(std::collections::BTreeMap::from([("wc_secret", "resolved")]));
        resolve_secrets(&mut cfg, PRODUCTION_PROFILE, &source).unwrap();
        match cfg.backend {
            BackendConfig::Wc { api_secret, .. } => assert_eq!(api_secret, "resolved"),
            other => panic!("expected Wc, got {other:?}"),
        }
    }

    #[test]
    fn resolve_secrets_leaves_literal_values_untouched_in_production() {
        let mut cfg = wc_config();
        let source = StaticSecretSource(std::collections::BTreeMap::new());
        resolve_secrets(&mut cfg, PRODUCTION_PROFILE, &source).unwrap();
        match cfg.backend {
            BackendConfig::Wc { api_secret, .. } => assert_eq!(api_secret, "cs_test"),
            other => panic!("expected Wc, got {other:?}"),
        }
    }

    #[test]
    fn resolve_secrets_propagates_lookup_failure() {
        let mut cfg = GatewayConfig {
            backend: BackendConfig::Wc {
                store_url: "https://shop.example.com".into(),
                api_key: "ck".into(),
                api_secret: "secret:missing".into(),
            },
            ..wc_config()
        };
        let source = StaticSecretSource(std::collections::BTreeMap::new());
        let err = resolve_secrets(&mut cfg, PRODUCTION_PROFILE, &source).unwrap_err();
        assert!(matches!(err, ConfigError::SecretResolutionError { .. }));
    }

    #[test]
    fn backend_store_url_accessor_works_for_both_variants() {
        assert_eq!(wc_config().backend.store_url(), "https://shop.example.com");
        let oauth = BackendConfig::Oauth {
            store_url: "https://store.example.com".into(),
            wix_client_id: "abc".into(),
        };
        assert_eq!(oauth.store_url(), "https://store.example.com");
    }

    #[test]
    fn config_error_display() {
        let e = ConfigError::FileNotFound { path: "/foo".into() };
        assert!(e.to_string().contains("/foo"));
        let e = ConfigError::ParseError { reason: "bad json".into() };
        assert!(e.to_string().contains("bad json"));
        let e = ConfigError::SecretResolutionError {
            reference: "secret:x".into(),
            reason: "not found".into(),
        };
        assert!(e.to_string().contains("secret:x"));
    }

    #[test]
    fn config_warning_display() {
        let w = ConfigWarning::MissingOptionalField {
            field: "merchant_name".into(),
            hint: "h".into(),
        };
        assert!(w.to_string().contains("merchant_name"));
    }
}

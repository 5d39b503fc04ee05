// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read once from the environment at startup into an
//! immutable [`GatewayConfig`] and shared by reference afterwards. Any defect
//! is reported as a [`ConfigError`] before a socket is bound.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM certificate chain and key | unset (plain HTTP) |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `CORS_ALLOWED_ORIGINS` | Comma separated origin allow-list | `http://localhost:5173` |
//! | `HEALTH_PATHS` | Comma separated paths that bypass authentication | `/health,/health/live,/health/ready` |
//! | `AUTH0_DOMAIN` / `AUTH0_AUDIENCE` | Auth0 tenant domain and API audience | unset |
//! | `GOOGLE_CLIENT_ID` | Google OAuth client id (token audience) | unset |
//! | `EXTERNAL_ISSUER` / `EXTERNAL_AUDIENCE` | Any other OIDC issuer | unset |
//! | `EXTERNAL_JWKS_URL` / `EXTERNAL_SHARED_SECRET` | Key source for `EXTERNAL_ISSUER` | unset |
//! | `AUTH_TIMEOUT_MS` | Bound on external token verification | `5000` |
//! | `INTERNAL_TOKEN_ISSUER` | Internal token `iss` | `identity-gateway` |
//! | `INTERNAL_TOKEN_AUDIENCE` | Internal token `aud` | `internal-services` |
//! | `INTERNAL_TOKEN_SECRET` | HS256 signing secret (at least 32 bytes) | Required |
//! | `INTERNAL_TOKEN_TTL_MINUTES` | Internal token lifetime | `60` |
//! | `CACHE_PROVIDER` | `memory` or `distributed` (`redis`) | `memory` |
//! | `CACHE_CAPACITY` | In-process cache capacity (entries) | `1024` |
//! | `REDIS_CONNECTION_STRING` | `host[:port]` or `redis://` URL | `localhost:6379` |
//! | `REDIS_DATABASE` | Logical database index | `0` |
//! | `REDIS_INSTANCE_NAME` | Key and backplane namespace | `identity-gateway:` |
//! | `REDIS_MAX_RETRIES` | Retries per backend call | `3` |
//! | `REDIS_RETRY_TIMEOUT_MS` | Base backoff between retries | `50` |
//! | `REDIS_OPERATION_TIMEOUT_MS` | Bound on a single backend call | `500` |
//! | `UPSTREAM_URL` | Routing engine base URL | `http://localhost:5001` |
//! | `UPSTREAM_TIMEOUT_SECS` | Forwarding timeout | `30` |
//! | `RESPONSE_CACHE_TTL_SECS` | TTL of cached GET responses | `30` |
//! | `TRUST_FORWARDED_FOR` | Derive client id from `X-Forwarded-For` | `false` |

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::transform::issuer::{check_signing_secret, SigningError};

/// Environment variable selecting the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default `RUST_LOG` filter when none is set.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";
const DEFAULT_HEALTH_PATHS: &str = "/health,/health/live,/health/ready";
const DEFAULT_REDIS_PORT: u16 = 6379;
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];
const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Upper bound on request and response bodies buffered by the gateway.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Configuration defect detected at startup. The process must not start.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is required")]
    Missing { var: &'static str },

    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("internal token configuration is invalid: {0}")]
    Signing(#[from] SigningError),

    #[error("no external identity provider configured (set AUTH0_DOMAIN, GOOGLE_CLIENT_ID or EXTERNAL_ISSUER)")]
    NoIdentityProviders,

    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    PartialTls,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to load TLS material: {0}")]
    Tls(#[from] std::io::Error),
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl fmt::Display) -> Self {
        ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A configuration value that must never appear in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Complete, validated gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    /// Paths answered by the health short-circuit, bypassing authentication.
    pub health_paths: Vec<String>,
    pub auth: ExternalAuthConfig,
    pub internal_token: InternalTokenConfig,
    pub cache: CacheSettings,
    pub routing: RoutingConfig,
    pub client_id: ClientIdConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// Trusted external identity providers.
#[derive(Debug, Clone)]
pub struct ExternalAuthConfig {
    pub providers: Vec<ProviderConfig>,
    /// Bound on a single verification, JWKS fetch included.
    pub timeout: Duration,
}

/// One trusted external issuer.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Short label used in logs.
    pub name: String,
    /// Accepted `iss` values (exact match).
    pub issuers: Vec<String>,
    /// Expected `aud`; audience is not checked when absent.
    pub audience: Option<String>,
    pub keys: ProviderKeys,
}

#[derive(Debug, Clone)]
pub enum ProviderKeys {
    /// RS*/ES* keys published at a JWKS endpoint.
    Jwks { url: Url },
    /// HS256 shared secret.
    SharedSecret(Secret),
}

/// Parameters of the internally issued token.
#[derive(Debug, Clone)]
pub struct InternalTokenConfig {
    pub issuer: String,
    pub audience: String,
    pub secret: Secret,
    pub ttl_minutes: u32,
}

impl InternalTokenConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.ttl_minutes))
    }
}

/// Which [`CacheProvider`](crate::cache::CacheProvider) implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheProviderKind {
    /// In-process, single-instance only.
    Memory,
    /// Redis-backed, shared across gateway instances.
    Distributed,
}

impl FromStr for CacheProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" => Ok(CacheProviderKind::Memory),
            "distributed" | "redis" => Ok(CacheProviderKind::Distributed),
            other => Err(format!("unknown cache provider '{other}' (expected memory or distributed)")),
        }
    }
}

/// Process-wide cache settings, immutable after startup.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub provider: CacheProviderKind,
    /// Entry capacity of the in-process cache (and of the distributed near-cache).
    pub capacity: usize,
    pub redis: RedisSettings,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    /// Normalized `redis://host:port/db` URL. `REDIS_DATABASE` is folded
    /// into its path.
    pub url: Url,
    /// Prefix for every key and for the backplane channel.
    pub instance_name: String,
    pub max_retries: u32,
    pub retry_timeout: Duration,
    pub operation_timeout: Duration,
}

impl RedisSettings {
    /// Parse a `host[:port]` pair or a `redis://`/`rediss://` URL.
    pub fn parse_connection_string(raw: &str, database: i64) -> Result<Url, ConfigError> {
        const VAR: &str = "REDIS_CONNECTION_STRING";
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::Missing { var: VAR });
        }

        let mut url = if raw.starts_with("redis://") || raw.starts_with("rediss://") {
            Url::parse(raw).map_err(|e| ConfigError::invalid(VAR, raw, e))?
        } else {
            let (host, port) = match raw.rsplit_once(':') {
                Some((host, port)) => {
                    let port: u16 = port
                        .parse()
                        .map_err(|_| ConfigError::invalid(VAR, raw, "port is not a number"))?;
                    (host, port)
                }
                None => (raw, DEFAULT_REDIS_PORT),
            };
            if host.is_empty() {
                return Err(ConfigError::invalid(VAR, raw, "host is empty"));
            }
            Url::parse(&format!("redis://{host}:{port}"))
                .map_err(|e| ConfigError::invalid(VAR, raw, e))?
        };

        if url.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(ConfigError::invalid(VAR, raw, "host is empty"));
        }
        url.set_path(&format!("/{database}"));
        Ok(url)
    }
}

/// Forwarding parameters for the routing stage.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub upstream_url: Url,
    pub timeout: Duration,
    pub response_cache_ttl: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ClientIdConfig {
    /// Use the first `X-Forwarded-For` hop instead of the peer address.
    pub trust_forwarded_for: bool,
}

impl GatewayConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let host = env.get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = env.parse_or("PORT", 8080)?;
        let bind_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| ConfigError::invalid("HOST", &host, e))?;

        let tls = match (env.get("TLS_CERT_PATH"), env.get("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: cert.into(),
                key_path: key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialTls),
        };

        let allowed_origins = env.list_or("CORS_ALLOWED_ORIGINS", DEFAULT_CORS_ORIGIN);
        for origin in &allowed_origins {
            if origin != "*" {
                Url::parse(origin)
                    .map_err(|e| ConfigError::invalid("CORS_ALLOWED_ORIGINS", origin, e))?;
            }
        }

        let health_paths = env.list_or("HEALTH_PATHS", DEFAULT_HEALTH_PATHS);
        if let Some(bad) = health_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::invalid("HEALTH_PATHS", bad, "paths must start with '/'"));
        }

        let providers = load_providers(&env)?;
        if providers.is_empty() {
            return Err(ConfigError::NoIdentityProviders);
        }

        let internal_token = InternalTokenConfig {
            issuer: env
                .get("INTERNAL_TOKEN_ISSUER")
                .unwrap_or_else(|| "identity-gateway".to_string()),
            audience: env
                .get("INTERNAL_TOKEN_AUDIENCE")
                .unwrap_or_else(|| "internal-services".to_string()),
            secret: Secret::new(env.get("INTERNAL_TOKEN_SECRET").unwrap_or_default()),
            ttl_minutes: env.parse_or("INTERNAL_TOKEN_TTL_MINUTES", 60)?,
        };
        check_signing_secret(&internal_token.secret)?;
        if internal_token.ttl_minutes == 0 {
            return Err(ConfigError::invalid(
                "INTERNAL_TOKEN_TTL_MINUTES",
                "0",
                "must be at least 1",
            ));
        }

        let provider = match env.get("CACHE_PROVIDER") {
            Some(raw) => raw
                .parse::<CacheProviderKind>()
                .map_err(|e| ConfigError::invalid("CACHE_PROVIDER", &raw, e))?,
            None => CacheProviderKind::Memory,
        };
        let database: i64 = env.parse_or("REDIS_DATABASE", 0)?;
        let connection_string = env
            .get("REDIS_CONNECTION_STRING")
            .unwrap_or_else(|| format!("localhost:{DEFAULT_REDIS_PORT}"));
        let cache = CacheSettings {
            provider,
            capacity: env.parse_or("CACHE_CAPACITY", 1024)?,
            redis: RedisSettings {
                url: RedisSettings::parse_connection_string(&connection_string, database)?,
                instance_name: env
                    .get("REDIS_INSTANCE_NAME")
                    .unwrap_or_else(|| "identity-gateway:".to_string()),
                max_retries: env.parse_or("REDIS_MAX_RETRIES", 3)?,
                retry_timeout: Duration::from_millis(env.parse_or("REDIS_RETRY_TIMEOUT_MS", 50)?),
                operation_timeout: Duration::from_millis(
                    env.parse_or("REDIS_OPERATION_TIMEOUT_MS", 500)?,
                ),
            },
        };

        let upstream_raw = env
            .get("UPSTREAM_URL")
            .unwrap_or_else(|| "http://localhost:5001".to_string());
        let routing = RoutingConfig {
            upstream_url: Url::parse(&upstream_raw)
                .map_err(|e| ConfigError::invalid("UPSTREAM_URL", &upstream_raw, e))?,
            timeout: Duration::from_secs(env.parse_or("UPSTREAM_TIMEOUT_SECS", 30)?),
            response_cache_ttl: Duration::from_secs(env.parse_or("RESPONSE_CACHE_TTL_SECS", 30)?),
        };

        Ok(Self {
            server: ServerConfig { bind_addr, tls },
            cors: CorsConfig { allowed_origins },
            health_paths,
            auth: ExternalAuthConfig {
                providers,
                timeout: Duration::from_millis(env.parse_or("AUTH_TIMEOUT_MS", 5000)?),
            },
            internal_token,
            cache,
            routing,
            client_id: ClientIdConfig {
                trust_forwarded_for: env.parse_or("TRUST_FORWARDED_FOR", false)?,
            },
        })
    }
}

fn load_providers(env: &Env<'_>) -> Result<Vec<ProviderConfig>, ConfigError> {
    let mut providers = Vec::new();

    if let Some(domain) = env.get("AUTH0_DOMAIN") {
        let domain = domain
            .trim_start_matches("https://")
            .trim_end_matches('/')
            .to_string();
        let jwks = format!("https://{domain}/.well-known/jwks.json");
        providers.push(ProviderConfig {
            name: "auth0".to_string(),
            issuers: vec![format!("https://{domain}/")],
            audience: env.get("AUTH0_AUDIENCE"),
            keys: ProviderKeys::Jwks {
                url: Url::parse(&jwks).map_err(|e| ConfigError::invalid("AUTH0_DOMAIN", &domain, e))?,
            },
        });
    }

    if let Some(client_id) = env.get("GOOGLE_CLIENT_ID") {
        providers.push(ProviderConfig {
            name: "google".to_string(),
            issuers: GOOGLE_ISSUERS.iter().map(|s| s.to_string()).collect(),
            audience: Some(client_id),
            keys: ProviderKeys::Jwks {
                url: Url::parse(GOOGLE_JWKS_URL)
                    .map_err(|e| ConfigError::invalid("GOOGLE_CLIENT_ID", GOOGLE_JWKS_URL, e))?,
            },
        });
    }

    if let Some(issuer) = env.get("EXTERNAL_ISSUER") {
        let keys = match (env.get("EXTERNAL_JWKS_URL"), env.get("EXTERNAL_SHARED_SECRET")) {
            (Some(url), _) => ProviderKeys::Jwks {
                url: Url::parse(&url).map_err(|e| ConfigError::invalid("EXTERNAL_JWKS_URL", &url, e))?,
            },
            (None, Some(secret)) => ProviderKeys::SharedSecret(Secret::new(secret)),
            (None, None) => return Err(ConfigError::Missing { var: "EXTERNAL_JWKS_URL" }),
        };
        providers.push(ProviderConfig {
            name: "external".to_string(),
            issuers: vec![issuer],
            audience: env.get("EXTERNAL_AUDIENCE"),
            keys,
        });
    }

    Ok(providers)
}

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_or<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(var) {
            Some(raw) => raw.parse().map_err(|e| ConfigError::invalid(var, &raw, e)),
            None => Ok(default),
        }
    }

    fn list_or(&self, var: &str, default: &str) -> Vec<String> {
        self.get(var)
            .unwrap_or_else(|| default.to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(move |k| map.get(k).cloned())
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("INTERNAL_TOKEN_SECRET", SECRET),
            ("AUTH0_DOMAIN", "tenant.auth0.com"),
            ("AUTH0_AUDIENCE", "https://api.example.com"),
        ]
    }

    #[test]
    fn defaults_are_applied() {
        let config = load(&minimal()).unwrap();
        assert_eq!(config.server.bind_addr.port(), 8080);
        assert_eq!(config.internal_token.ttl_minutes, 60);
        assert_eq!(config.internal_token.issuer, "identity-gateway");
        assert_eq!(config.cache.provider, CacheProviderKind::Memory);
        assert_eq!(config.cache.redis.url.as_str(), "redis://localhost:6379/0");
        assert_eq!(config.cors.allowed_origins, vec!["http://localhost:5173"]);
        assert_eq!(
            config.health_paths,
            vec!["/health", "/health/live", "/health/ready"]
        );
        assert!(!config.client_id.trust_forwarded_for);
    }

    #[test]
    fn auth0_domain_expands_to_issuer_and_jwks() {
        let config = load(&minimal()).unwrap();
        let auth0 = &config.auth.providers[0];
        assert_eq!(auth0.issuers, vec!["https://tenant.auth0.com/"]);
        assert_eq!(auth0.audience.as_deref(), Some("https://api.example.com"));
        match &auth0.keys {
            ProviderKeys::Jwks { url } => {
                assert_eq!(url.as_str(), "https://tenant.auth0.com/.well-known/jwks.json")
            }
            other => panic!("unexpected key source {other:?}"),
        }
    }

    #[test]
    fn empty_secret_refuses_to_start() {
        let mut vars = minimal();
        vars[0] = ("INTERNAL_TOKEN_SECRET", "");
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::Signing(SigningError::MissingSecret)));
    }

    #[test]
    fn short_secret_refuses_to_start() {
        let mut vars = minimal();
        vars[0] = ("INTERNAL_TOKEN_SECRET", "too-short");
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::Signing(SigningError::WeakSecret { .. })));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let mut vars = minimal();
        vars.push(("INTERNAL_TOKEN_TTL_MINUTES", "0"));
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn missing_providers_is_an_error() {
        let err = load(&[("INTERNAL_TOKEN_SECRET", SECRET)]).unwrap_err();
        assert!(matches!(err, ConfigError::NoIdentityProviders));
    }

    #[test]
    fn generic_provider_requires_key_source() {
        let vars = vec![
            ("INTERNAL_TOKEN_SECRET", SECRET),
            ("EXTERNAL_ISSUER", "https://idp.example.com"),
        ];
        assert!(matches!(load(&vars), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn distributed_cache_settings() {
        let mut vars = minimal();
        vars.extend([
            ("CACHE_PROVIDER", "Redis"),
            ("REDIS_CONNECTION_STRING", "cache.internal:6380"),
            ("REDIS_DATABASE", "2"),
            ("REDIS_INSTANCE_NAME", "gw-eu:"),
        ]);
        let config = load(&vars).unwrap();
        assert_eq!(config.cache.provider, CacheProviderKind::Distributed);
        assert_eq!(config.cache.redis.url.as_str(), "redis://cache.internal:6380/2");
        assert_eq!(config.cache.redis.instance_name, "gw-eu:");
    }

    #[test]
    fn unparseable_cache_connection_string_is_rejected() {
        let mut vars = minimal();
        vars.push(("REDIS_CONNECTION_STRING", "cache:notaport"));
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));

        assert!(RedisSettings::parse_connection_string(":6379", 0).is_err());
    }

    #[test]
    fn unknown_cache_provider_is_rejected() {
        let mut vars = minimal();
        vars.push(("CACHE_PROVIDER", "memcached"));
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn half_configured_tls_is_rejected() {
        let mut vars = minimal();
        vars.push(("TLS_CERT_PATH", "/etc/gw/cert.pem"));
        assert!(matches!(load(&vars), Err(ConfigError::PartialTls)));
    }

    #[test]
    fn secret_debug_is_redacted() {
        let config = load(&minimal()).unwrap();
        let rendered = format!("{:?}", config.internal_token);
        assert!(!rendered.contains(SECRET));
        assert!(rendered.contains("[REDACTED]"));
    }
}

//! Configuration management
//!
//! Sensible defaults with environment variable overrides.

use std::env;
use std::path::PathBuf;
use tracing::info;

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_list(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn production_from_env() -> bool {
    env::var("SEGMENTS_ENV")
        .map(|v| {
            let v = v.to_lowercase();
            v == "production" || v == "prod"
        })
        .unwrap_or(false)
}

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins (empty = allow all)
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    /// Preflight cache lifetime in seconds
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: ["GET", "POST", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: vec!["Content-Type".to_string(), "X-Request-ID".to_string()],
            allow_credentials: false,
            max_age_seconds: 86400,
        }
    }
}

impl CorsConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(origins) = env_list("SEGMENTS_CORS_ORIGINS") {
            config.allowed_origins = origins;
        }
        if let Some(methods) = env_list("SEGMENTS_CORS_METHODS") {
            config.allowed_methods = methods.into_iter().map(|m| m.to_uppercase()).collect();
        }
        if let Some(headers) = env_list("SEGMENTS_CORS_HEADERS") {
            config.allowed_headers = headers;
        }
        if let Some(flag) = env_flag("SEGMENTS_CORS_CREDENTIALS") {
            config.allow_credentials = flag;
        }
        if let Some(max_age) = env_parse("SEGMENTS_CORS_MAX_AGE") {
            config.max_age_seconds = max_age;
        }

        if production_from_env() && config.allowed_origins.is_empty() {
            tracing::warn!(
                "CORS allows all origins in production. Set SEGMENTS_CORS_ORIGINS to restrict."
            );
        }

        config
    }

    pub fn is_restricted(&self) -> bool {
        !self.allowed_origins.is_empty()
    }

    /// Convert to tower-http CorsLayer
    pub fn to_layer(&self) -> tower_http::cors::CorsLayer {
        use tower_http::cors::{AllowOrigin, Any, CorsLayer};

        let mut layer = CorsLayer::new();

        if self.allowed_origins.is_empty() {
            layer = layer.allow_origin(Any);
        } else {
            let mut valid_origins = Vec::new();
            for origin in &self.allowed_origins {
                match origin.parse::<axum::http::HeaderValue>() {
                    Ok(value) => valid_origins.push(value),
                    Err(_) => tracing::warn!("CORS: invalid origin '{}' skipped", origin),
                }
            }
            if valid_origins.is_empty() {
                // Misconfigured origins never fall back to permissive.
                tracing::error!(
                    "CORS: none of the {} configured origin(s) parsed, rejecting cross-origin requests",
                    self.allowed_origins.len()
                );
            }
            layer = layer.allow_origin(AllowOrigin::list(valid_origins));
        }

        let methods: Vec<axum::http::Method> = self
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        layer = if methods.is_empty() {
            layer.allow_methods(Any)
        } else {
            layer.allow_methods(methods)
        };

        let headers: Vec<axum::http::HeaderName> = self
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        layer = if headers.is_empty() {
            layer.allow_headers(Any)
        } else {
            layer.allow_headers(headers)
        };

        if self.allow_credentials {
            layer = layer.allow_credentials(true);
        }

        layer.max_age(std::time::Duration::from_secs(self.max_age_seconds))
    }
}

/// Server configuration loaded from environment with defaults
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1, use 0.0.0.0 in containers)
    pub host: String,

    /// Server port (default: 8000)
    pub port: u16,

    /// RocksDB directory (default: ./segments_data)
    pub storage_path: PathBuf,

    /// Maximum in-flight requests (default: 200)
    pub max_concurrent_requests: usize,

    /// Seconds allowed for the shutdown flush (default: 10)
    pub shutdown_flush_timeout_secs: u64,

    pub is_production: bool,

    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            storage_path: PathBuf::from("./segments_data"),
            max_concurrent_requests: 200,
            shutdown_flush_timeout_secs: 10,
            is_production: false,
            cors: CorsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: env::var("SEGMENTS_HOST").unwrap_or(defaults.host),
            port: env_parse("SEGMENTS_PORT").unwrap_or(defaults.port),
            storage_path: env::var("SEGMENTS_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            max_concurrent_requests: env_parse("SEGMENTS_MAX_CONCURRENT")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_requests),
            shutdown_flush_timeout_secs: env_parse("SEGMENTS_FLUSH_TIMEOUT")
                .unwrap_or(defaults.shutdown_flush_timeout_secs),
            is_production: production_from_env(),
            cors: CorsConfig::from_env(),
        }
    }

    /// Log the current configuration
    pub fn log(&self) {
        info!("Configuration:");
        info!(
            "   Mode: {}",
            if self.is_production {
                "PRODUCTION"
            } else {
                "Development"
            }
        );
        info!("   Bind: {}:{}", self.host, self.port);
        info!("   Storage: {:?}", self.storage_path);
        info!("   Max concurrent: {}", self.max_concurrent_requests);
        if self.cors.is_restricted() {
            info!("   CORS origins: {:?}", self.cors.allowed_origins);
        } else {
            info!("   CORS: permissive (all origins allowed)");
        }
    }
}

/// Environment variable documentation
pub fn print_env_help() {
    println!("User Segments Service Configuration Environment Variables:");
    println!();
    println!("  SEGMENTS_ENV               - 'production' or 'prod' for production mode");
    println!("  SEGMENTS_HOST              - Bind address (default: 127.0.0.1)");
    println!("  SEGMENTS_PORT              - Server port (default: 8000)");
    println!("  SEGMENTS_DATA_PATH         - Storage directory (default: ./segments_data)");
    println!("  SEGMENTS_MAX_CONCURRENT    - Max in-flight requests (default: 200)");
    println!("  SEGMENTS_FLUSH_TIMEOUT     - Shutdown flush timeout in seconds (default: 10)");
    println!();
    println!("CORS Configuration:");
    println!("  SEGMENTS_CORS_ORIGINS      - Comma-separated allowed origins (default: all)");
    println!("  SEGMENTS_CORS_METHODS      - Comma-separated methods (default: GET,POST,DELETE,OPTIONS)");
    println!("  SEGMENTS_CORS_HEADERS      - Comma-separated headers (default: Content-Type,X-Request-ID)");
    println!("  SEGMENTS_CORS_CREDENTIALS  - Allow credentials true/false (default: false)");
    println!("  SEGMENTS_CORS_MAX_AGE      - Preflight cache seconds (default: 86400)");
    println!();
    println!("  RUST_LOG                   - Log level (e.g., info, debug, user_segments=trace)");
    println!();
}

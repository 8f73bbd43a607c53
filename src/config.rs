use http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Server configuration loaded from environment variables.
///
/// | Env Var        | Default             |
/// |----------------|---------------------|
/// | `HOST`         | `0.0.0.0`           |
/// | `PORT`         | `5600`              |
/// | `DATABASE_URL` | `sqlite://notes.db` |
/// | `CORS_ORIGINS` | `*`                 |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Empty means any origin is allowed.
    pub cors_origins: Vec<HeaderValue>,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5600;
const DEFAULT_DATABASE_URL: &str = "sqlite://notes.db";

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { var: "PORT", value: raw })?,
            None => DEFAULT_PORT,
        };

        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let cors_origins = parse_origins(&lookup("CORS_ORIGINS").unwrap_or_else(|| "*".to_string()))?;

        Ok(Self {
            host,
            port,
            database_url,
            cors_origins,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cors_layer(&self) -> CorsLayer {
        let origin = if self.cors_origins.is_empty() {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(self.cors_origins.clone())
        };
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

fn parse_origins(raw: &str) -> Result<Vec<HeaderValue>, ConfigError> {
    let origins: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if origins.iter().any(|o| *o == "*") {
        return Ok(Vec::new());
    }

    origins
        .into_iter()
        .map(|o| {
            HeaderValue::from_str(o).map_err(|_| ConfigError::Invalid {
                var: "CORS_ORIGINS",
                value: o.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:5600");
        assert_eq!(config.database_url, "sqlite://notes.db");
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("PORT", "8080"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("CORS_ORIGINS", "http://localhost:3000, http://localhost:5173"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.cors_origins.len(), 2);
    }

    #[test]
    fn bad_port_is_reported() {
        match config(&[("PORT", "eighty")]) {
            Err(ConfigError::Invalid { var, value }) => {
                assert_eq!(var, "PORT");
                assert_eq!(value, "eighty");
            }
            other => panic!("expected invalid PORT, got {other:?}"),
        }
    }
}

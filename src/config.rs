use crate::models::idempotency::DEFAULT_TTL_HOURS;
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

const ENV_PREFIX: &str = "LISTING_SERVICE";

/// Runtime configuration, merged from CLI arguments over environment
/// variables over built-in defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub idempotency_ttl_hours: i64,
    pub sweep_interval_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Classified listings backend")]
pub struct Args {
    /// Host to bind to (overrides LISTING_SERVICE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides LISTING_SERVICE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where photo payloads are stored (overrides LISTING_SERVICE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides LISTING_SERVICE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Idempotency key lifetime in hours (overrides LISTING_SERVICE_IDEMPOTENCY_TTL_HOURS)
    #[arg(long)]
    pub idempotency_ttl_hours: Option<i64>,

    /// Seconds between expired-key sweeps (overrides LISTING_SERVICE_SWEEP_INTERVAL_SECS)
    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read `LISTING_SERVICE_{name}`, parsing it when present.
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let key = format!("{ENV_PREFIX}_{name}");
    match env::var(&key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {key} value `{value}`")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {key}")),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    fn merge(args: Args) -> Result<Self> {
        let cfg = Self {
            host: match args.host {
                Some(host) => host,
                None => env_or("HOST", "0.0.0.0".to_string())?,
            },
            port: match args.port {
                Some(port) => port,
                None => env_or("PORT", 3000)?,
            },
            storage_dir: match args.storage_dir {
                Some(dir) => dir,
                None => env_or("STORAGE_DIR", "./data/photos".to_string())?,
            },
            database_url: match args.database_url {
                Some(url) => url,
                None => env_or(
                    "DATABASE_URL",
                    "sqlite://./data/meta/listings.db".to_string(),
                )?,
            },
            idempotency_ttl_hours: match args.idempotency_ttl_hours {
                Some(hours) => hours,
                None => env_or("IDEMPOTENCY_TTL_HOURS", DEFAULT_TTL_HOURS)?,
            },
            sweep_interval_secs: match args.sweep_interval_secs {
                Some(secs) => secs,
                None => env_or("SWEEP_INTERVAL_SECS", 3600)?,
            },
        };

        if cfg.idempotency_ttl_hours <= 0 {
            anyhow::bail!("idempotency TTL must be positive, got {}", cfg.idempotency_ttl_hours);
        }
        if cfg.sweep_interval_secs == 0 {
            anyhow::bail!("sweep interval must be positive");
        }
        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idempotency_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.idempotency_ttl_hours)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_win() {
        let args = Args {
            host: Some("127.0.0.1".into()),
            port: Some(8080),
            storage_dir: Some("/tmp/photos".into()),
            database_url: Some("sqlite::memory:".into()),
            idempotency_ttl_hours: Some(1),
            sweep_interval_secs: Some(60),
            migrate: false,
        };
        let cfg = AppConfig::merge(args).unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:8080");
        assert_eq!(cfg.idempotency_ttl(), chrono::Duration::hours(1));
        assert_eq!(cfg.sweep_interval(), std::time::Duration::from_secs(60));
    }

    #[test]
    fn non_positive_ttl_is_rejected() {
        let args = Args {
            idempotency_ttl_hours: Some(0),
            host: Some("h".into()),
            port: Some(1),
            storage_dir: Some("d".into()),
            database_url: Some("u".into()),
            sweep_interval_secs: Some(1),
            migrate: false,
        };
        assert!(AppConfig::merge(args).is_err());
    }

    #[test]
    fn ttl_falls_back_to_the_idempotency_window() {
        let args = Args {
            host: Some("h".into()),
            port: Some(1),
            storage_dir: Some("d".into()),
            database_url: Some("u".into()),
            sweep_interval_secs: Some(1),
            ..Default::default()
        };
        let cfg = AppConfig::merge(args).unwrap();
        assert_eq!(cfg.idempotency_ttl_hours, DEFAULT_TTL_HOURS);
        assert_eq!(cfg.idempotency_ttl(), chrono::Duration::hours(24));
    }

    #[test]
    fn parses_cli_flags() {
        let args = Args::parse_from(["listing-service", "--port", "9000", "--migrate"]);
        assert_eq!(args.port, Some(9000));
        assert!(args.migrate);
        assert!(args.host.is_none());
    }
}

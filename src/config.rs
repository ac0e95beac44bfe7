use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use pgwire::tokio::TlsAcceptor;
use pgwire::tokio::tokio_rustls::rustls::ServerConfig;

use crate::limits::{DEFAULT_MAX_BOOKING_MINUTES, DEFAULT_MIN_BOOKING_MINUTES};

/// Booking policy knobs the engine consults on every request.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// New bookings start as `pending` and need an approval.
    pub approval_required: bool,
    /// Upper bound on waiting for a room's lock before failing with `Busy`.
    pub lock_timeout: Duration,
    pub min_booking_minutes: i64,
    pub max_booking_minutes: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            approval_required: false,
            lock_timeout: Duration::from_millis(2_000),
            min_booking_minutes: DEFAULT_MIN_BOOKING_MINUTES,
            max_booking_minutes: DEFAULT_MAX_BOOKING_MINUTES,
        }
    }
}

/// Process configuration, read once from `ROOMBOOK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub completion_interval: Duration,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = EngineConfig::default();
        Self {
            bind: env_or("ROOMBOOK_BIND", "0.0.0.0".to_string()),
            port: env_or("ROOMBOOK_PORT", 5433),
            data_dir: PathBuf::from(env_or("ROOMBOOK_DATA_DIR", "./data".to_string())),
            password: env_or("ROOMBOOK_PASSWORD", "roombook".to_string()),
            max_connections: env_or("ROOMBOOK_MAX_CONNECTIONS", 256),
            compact_threshold: env_or("ROOMBOOK_COMPACT_THRESHOLD", 1000),
            completion_interval: Duration::from_secs(env_or(
                "ROOMBOOK_COMPLETION_INTERVAL_SECS",
                60,
            )),
            metrics_port: env_opt("ROOMBOOK_METRICS_PORT"),
            tls_cert: std::env::var("ROOMBOOK_TLS_CERT").ok(),
            tls_key: std::env::var("ROOMBOOK_TLS_KEY").ok(),
            engine: EngineConfig {
                approval_required: env_or("ROOMBOOK_APPROVAL_REQUIRED", false),
                lock_timeout: Duration::from_millis(env_or("ROOMBOOK_LOCK_TIMEOUT_MS", 2_000)),
                min_booking_minutes: env_or(
                    "ROOMBOOK_MIN_BOOKING_MINUTES",
                    defaults.min_booking_minutes,
                ),
                max_booking_minutes: env_or(
                    "ROOMBOOK_MAX_BOOKING_MINUTES",
                    defaults.max_booking_minutes,
                ),
            },
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("roombook.wal")
    }

    pub fn tls_acceptor(&self) -> io::Result<Option<TlsAcceptor>> {
        load_tls_acceptor(self.tls_cert.as_deref(), self.tls_key.as_deref())
    }
}

fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env_opt(key).unwrap_or(default)
}

/// Build a TLS acceptor from PEM files. Both paths or neither.
pub fn load_tls_acceptor(
    cert_path: Option<&str>,
    key_path: Option<&str>,
) -> io::Result<Option<TlsAcceptor>> {
    let (cert_path, key_path) = match (cert_path, key_path) {
        (None, None) => return Ok(None),
        (Some(c), Some(k)) => (c, k),
        _ => {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "both ROOMBOOK_TLS_CERT and ROOMBOOK_TLS_KEY must be set, or neither",
            ));
        }
    };

    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))
        .collect::<Result<_, _>>()?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))?
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "no private key found in key file"))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
    config.alpn_protocols = vec![b"postgresql".to_vec()];

    Ok(Some(TlsAcceptor::from(Arc::new(config))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_defaults_match_booking_rules() {
        let cfg = EngineConfig::default();
        assert!(!cfg.approval_required);
        assert_eq!(cfg.min_booking_minutes, 15);
        assert_eq!(cfg.max_booking_minutes, 720);
        assert_eq!(cfg.lock_timeout, Duration::from_secs(2));
    }

    #[test]
    fn tls_disabled_without_paths() {
        assert!(load_tls_acceptor(None, None).unwrap().is_none());
    }

    #[test]
    fn tls_requires_both_paths() {
        let err = load_tls_acceptor(Some("cert.pem"), None).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn env_or_falls_back_on_garbage() {
        assert_eq!(env_or("ROOMBOOK_TEST_UNSET_VARIABLE", 42u16), 42);
    }
}

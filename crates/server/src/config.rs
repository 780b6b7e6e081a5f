use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use apnsmock_rules::ChainKind;

use crate::tls::TlsSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConfig {
    pub bind_addr: SocketAddr,
    pub tls: TlsSource,
    pub comms: CommsConfig,
    pub handler: HandlerKind,
    pub metrics_bind_addr: Option<SocketAddr>,
}

/// Connection and latency behaviour of the emulated service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommsConfig {
    /// Advertised in the HTTP/2 SETTINGS frame of every connection.
    pub max_concurrent_streams: u32,
    /// Connections over this limit are dropped as soon as they are accepted.
    pub max_conns: u32,
    pub connection_delay: Duration,
    /// Added to every notification response; not applied to unknown paths.
    pub response_delay: Duration,
}

impl CommsConfig {
    /// Latency and connection handling close to the production service.
    pub fn typical() -> Self {
        Self {
            max_concurrent_streams: 500,
            max_conns: 1000,
            connection_delay: Duration::from_secs(1),
            response_delay: Duration::from_millis(20),
        }
    }

    pub fn no_delay() -> Self {
        Self {
            max_concurrent_streams: 500,
            max_conns: 1000,
            connection_delay: Duration::ZERO,
            response_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Rules(ChainKind),
    AllOk,
}

impl HandlerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HandlerKind::Rules(kind) => kind.as_str(),
            HandlerKind::AllOk => "allok",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

impl MockConfig {
    /// Loopback server on an ephemeral port with a self-signed certificate.
    pub fn new(comms: CommsConfig) -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            tls: TlsSource::SelfSigned,
            comms,
            handler: HandlerKind::Rules(ChainKind::Standard),
            metrics_bind_addr: None,
        }
    }

    pub fn with_handler(mut self, handler: HandlerKind) -> Self {
        self.handler = handler;
        self
    }

    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("APNSMOCK_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                let file_kv = parse_env_file(config_path)?;
                merged.extend(file_kv);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let bind_addr = parse_socket_addr(
            kv.get("APNSMOCK_BIND_ADDR"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8443),
            "APNSMOCK_BIND_ADDR",
        )?;

        let allow_nonlocal_bind =
            parse_bool(kv.get("APNSMOCK_ALLOW_NONLOCAL_BIND")).unwrap_or(false);
        if !bind_addr.ip().is_loopback() && !allow_nonlocal_bind {
            return Err(StartupError {
                code: "ERR_NONLOCAL_BIND",
                message: "non-local bind requires APNSMOCK_ALLOW_NONLOCAL_BIND=true".to_string(),
            });
        }

        let tls = match (
            non_empty(kv, "APNSMOCK_CERT_PATH"),
            non_empty(kv, "APNSMOCK_KEY_PATH"),
        ) {
            (None, None) => TlsSource::SelfSigned,
            (Some(cert), Some(key)) => TlsSource::PemFiles {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            },
            _ => {
                return Err(StartupError {
                    code: "ERR_INVALID_CONFIG",
                    message: "APNSMOCK_CERT_PATH and APNSMOCK_KEY_PATH must be set together"
                        .to_string(),
                });
            }
        };

        let max_concurrent_streams =
            parse_u32(kv.get("APNSMOCK_MAX_STREAMS"), 500, "APNSMOCK_MAX_STREAMS")?;
        if max_concurrent_streams == 0 {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "APNSMOCK_MAX_STREAMS must be >= 1".to_string(),
            });
        }

        let max_conns = parse_u32(kv.get("APNSMOCK_MAX_CONNS"), 5, "APNSMOCK_MAX_CONNS")?;
        let connection_delay_ms = parse_u64(
            kv.get("APNSMOCK_CONN_DELAY_MS"),
            100,
            "APNSMOCK_CONN_DELAY_MS",
        )?;
        let response_delay_ms = parse_u64(
            kv.get("APNSMOCK_RESP_DELAY_MS"),
            5,
            "APNSMOCK_RESP_DELAY_MS",
        )?;

        let handler = parse_handler(kv.get("APNSMOCK_HANDLER"))?;

        let metrics_bind_addr = match kv.get("APNSMOCK_METRICS_BIND_ADDR") {
            Some(v) if !v.trim().is_empty() => Some(parse_socket_addr(
                Some(v),
                bind_addr,
                "APNSMOCK_METRICS_BIND_ADDR",
            )?),
            _ => None,
        };

        Ok(Self {
            bind_addr,
            tls,
            comms: CommsConfig {
                max_concurrent_streams,
                max_conns,
                connection_delay: Duration::from_millis(connection_delay_ms),
                response_delay: Duration::from_millis(response_delay_ms),
            },
            handler,
            metrics_bind_addr,
        })
    }
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(StartupError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        kv.insert(key.to_string(), strip_quotes(value.trim()).to_string());
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = s
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    s
}

fn non_empty<'a>(kv: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    kv.get(key).map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn parse_socket_addr(
    value: Option<&String>,
    default: SocketAddr,
    key: &'static str,
) -> Result<SocketAddr, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<SocketAddr>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a valid host:port socket address", key),
        }),
    }
}

fn parse_u64(value: Option<&String>, default: u64, key: &'static str) -> Result<u64, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u64>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_u32(value: Option<&String>, default: u32, key: &'static str) -> Result<u32, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u32>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_handler(value: Option<&String>) -> Result<HandlerKind, StartupError> {
    let mode = value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("default");

    match mode {
        "default" => Ok(HandlerKind::Rules(ChainKind::Standard)),
        "token" => Ok(HandlerKind::Rules(ChainKind::TokenAuth)),
        "cert" => Ok(HandlerKind::Rules(ChainKind::CertAuth)),
        "allok" => Ok(HandlerKind::AllOk),
        _ => Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: "APNSMOCK_HANDLER must be default, token, cert or allok".to_string(),
        }),
    }
}

fn parse_bool(value: Option<&String>) -> Option<bool> {
    let value = value.map(|v| v.trim()).filter(|v| !v.is_empty())?;

    match value {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

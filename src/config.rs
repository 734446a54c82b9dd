use crate::assembly::{FlowFilter, StreamOptions};
use crate::http::render::DEFAULT_MAX_BODY;
use crate::http::{ExchangeFilter, Level, RenderOptions, StatusSet};
use crate::output::DEFAULT_QUEUE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

fn empty_path_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<PathBuf>::deserialize(deserializer)?;
    Ok(opt.and_then(|path| {
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    }))
}

fn empty_string_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|s| !s.trim().is_empty()))
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "config io error: {}", err),
            ConfigError::Parse(err) => write!(f, "config parse error: {}", err),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub filter: FilterConfig,
    pub output: OutputConfig,
    pub assembly: AssemblyConfig,
    pub run: RunConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&raw).map_err(ConfigError::Parse)
    }

    /// Check values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.snaplen <= 0 {
            return Err(ConfigError::Invalid("capture.snaplen must be positive".into()));
        }
        if self.assembly.window_capacity == 0 {
            return Err(ConfigError::Invalid("assembly.window_capacity must be at least 1".into()));
        }
        if self.assembly.stream_capacity == 0 {
            return Err(ConfigError::Invalid("assembly.stream_capacity must be at least 1".into()));
        }
        if self.assembly.flush_interval_secs == 0 {
            return Err(ConfigError::Invalid("assembly.flush_interval_secs must be at least 1".into()));
        }
        if self.output.max_body == 0 {
            return Err(ConfigError::Invalid("output.max_body must be at least 1".into()));
        }
        if self.output.queue_capacity == 0 {
            return Err(ConfigError::Invalid("output.queue_capacity must be at least 1".into()));
        }
        self.exchange_filter().map(|_| ())
    }

    pub fn flow_filter(&self) -> FlowFilter {
        FlowFilter {
            ip: self.filter.ip,
            port: self.filter.port,
        }
    }

    pub fn exchange_filter(&self) -> Result<ExchangeFilter, ConfigError> {
        let status = match &self.filter.status {
            Some(raw) => Some(
                raw.parse::<StatusSet>()
                    .map_err(|e| ConfigError::Invalid(format!("filter.status: {}", e)))?,
            ),
            None => None,
        };
        Ok(ExchangeFilter {
            host: self.filter.host.clone(),
            uri: self.filter.uri.clone(),
            status,
        })
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            window_capacity: self.assembly.window_capacity,
            stream_capacity: self.assembly.stream_capacity,
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            level: self.output.level,
            curl: self.output.curl,
            pretty: self.output.pretty,
            force: self.output.force,
            max_body: self.output.max_body,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub interface: String,
    #[serde(deserialize_with = "empty_path_none")]
    pub file: Option<PathBuf>,
    pub promiscuous: bool,
    pub snaplen: i32,
    pub timeout_ms: i32,
    /// Extra BPF expression, ANDed with the generated `tcp` filter.
    #[serde(deserialize_with = "empty_string_none")]
    pub bpf: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            interface: "any".into(),
            file: None,
            promiscuous: false,
            snaplen: 65536,
            timeout_ms: 100,
            bpf: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
    /// Host pattern; without wildcards a suffix match.
    #[serde(deserialize_with = "empty_string_none")]
    pub host: Option<String>,
    /// URI pattern; without wildcards a substring match.
    #[serde(deserialize_with = "empty_string_none")]
    pub uri: Option<String>,
    /// Status codes, e.g. `"200:300-399"`.
    #[serde(deserialize_with = "empty_string_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub level: Level,
    /// Write transcripts here instead of stdout.
    #[serde(deserialize_with = "empty_path_none")]
    pub file: Option<PathBuf>,
    pub curl: bool,
    pub pretty: bool,
    pub force: bool,
    /// Body bytes kept for rendering at `level = "all"`.
    pub max_body: usize,
    pub queue_capacity: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            level: Level::Header,
            file: None,
            curl: false,
            pretty: false,
            force: false,
            max_body: DEFAULT_MAX_BODY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub idle_secs: u64,
    pub flush_interval_secs: u64,
    pub window_capacity: usize,
    pub stream_capacity: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        let stream = StreamOptions::default();
        AssemblyConfig {
            idle_secs: 240,
            flush_interval_secs: 30,
            window_capacity: stream.window_capacity,
            stream_capacity: stream.stream_capacity,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.capture.interface, "any");
        assert_eq!(config.capture.snaplen, 65536);
        assert_eq!(config.output.level, Level::Header);
        assert_eq!(config.output.queue_capacity, 4096);
        assert_eq!(config.output.max_body, 1024 * 1024);
        assert_eq!(config.assembly.idle_secs, 240);
        assert_eq!(config.assembly.window_capacity, 64);
        assert_eq!(config.assembly.stream_capacity, 1024);
        assert_eq!(config.run.count, 0);
        assert!(config.exchange_filter().unwrap().is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn full_file() {
        let raw = r#"
            [capture]
            file = "trace.pcap"
            bpf = "not port 22"

            [filter]
            ip = "10.0.0.2"
            port = 8080
            host = "*.example.com"
            uri = "/api"
            status = "200:300-399"

            [output]
            level = "all"
            file = ""
            curl = true
            pretty = true
            max_body = 2048

            [assembly]
            idle_secs = 60

            [run]
            count = 10
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.capture.file, Some(PathBuf::from("trace.pcap")));
        assert_eq!(config.capture.bpf.as_deref(), Some("not port 22"));
        assert_eq!(config.output.file, None);
        assert_eq!(config.output.level, Level::All);

        let flow = config.flow_filter();
        assert_eq!(flow.ip, Some("10.0.0.2".parse().unwrap()));
        assert_eq!(flow.port, Some(8080));

        let filter = config.exchange_filter().unwrap();
        assert_eq!(filter.host.as_deref(), Some("*.example.com"));
        assert!(filter.matches_status(302));
        assert!(!filter.matches_status(404));

        let render = config.render_options();
        assert!(render.curl && render.pretty && !render.force);
        assert_eq!(render.max_body, 2048);
        assert_eq!(config.stream_options().window_capacity, 64);
        assert_eq!(config.run.count, 10);
    }

    #[test]
    fn invalid_values() {
        let config: Config = toml::from_str("[filter]\nstatus = \"2xx\"").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config: Config = toml::from_str("[assembly]\nwindow_capacity = 0").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        assert!(toml::from_str::<Config>("[output]\nlevel = \"verbose\"").is_err());
        assert!(toml::from_str::<Config>("[filter]\nip = \"not-an-ip\"").is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::load(Path::new("/nonexistent/httpcap.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

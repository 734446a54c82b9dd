//! Opens pcap handles: live devices and offline capture files.

use crate::protocol::LinkType;
use pcap::{Activated, Active, Capture, Device, Offline};
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Errors from the capture engine.
#[derive(Debug)]
pub enum CaptureError {
    /// Failed to find a suitable network device.
    NoDevice(String),
    /// The capture file could not be opened.
    File { path: PathBuf, source: pcap::Error },
    /// The BPF expression was rejected.
    Filter { filter: String, source: pcap::Error },
    /// pcap error.
    Pcap(pcap::Error),
    Spawn(std::io::Error),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::NoDevice(msg) => write!(f, "no capture device: {}", msg),
            CaptureError::File { path, source } => {
                write!(f, "cannot open capture file {}: {}", path.display(), source)
            }
            CaptureError::Filter { filter, source } => {
                write!(f, "invalid capture filter '{}': {}", filter, source)
            }
            CaptureError::Pcap(e) => write!(f, "pcap error: {}", e),
            CaptureError::Spawn(e) => write!(f, "cannot start capture thread: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<pcap::Error> for CaptureError {
    fn from(e: pcap::Error) -> Self {
        CaptureError::Pcap(e)
    }
}

/// Configuration for opening a capture.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Device name; `any` captures on every device.
    pub interface: String,
    /// Read this file instead of capturing live.
    pub file: Option<PathBuf>,
    pub promiscuous: bool,
    pub snaplen: i32,
    pub timeout_ms: i32,
    /// Complete BPF expression, see [`build_filter`].
    pub filter: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            interface: "any".into(),
            file: None,
            promiscuous: false,
            snaplen: 65536,
            timeout_ms: 100,
            filter: "tcp".into(),
        }
    }
}

/// BPF expression for the capture: always `tcp`, narrowed by the port and ip
/// filters and ANDed with any extra user expression.
pub fn build_filter(port: Option<u16>, ip: Option<IpAddr>, extra: Option<&str>) -> String {
    let mut filter = String::from("tcp");
    if let Some(port) = port {
        filter.push_str(&format!(" and port {}", port));
    }
    if let Some(ip) = ip {
        filter.push_str(&format!(" and host {}", ip));
    }
    if let Some(extra) = extra.map(str::trim).filter(|e| !e.is_empty()) {
        filter.push_str(&format!(" and ({})", extra));
    }
    filter
}

/// List all available network interfaces.
pub fn list_interfaces() -> Result<Vec<Device>, CaptureError> {
    Device::list().map_err(CaptureError::Pcap)
}

/// Device names to open for `interface`. Linux has a native `any` device;
/// elsewhere `any` expands to every device pcap reports.
pub fn resolve_devices(interface: &str) -> Result<Vec<String>, CaptureError> {
    if interface != "any" || cfg!(target_os = "linux") {
        return Ok(vec![interface.to_string()]);
    }
    let names: Vec<String> = list_interfaces()?.into_iter().map(|d| d.name).collect();
    if names.is_empty() {
        return Err(CaptureError::NoDevice("no interfaces found".into()));
    }
    Ok(names)
}

/// Open a live packet capture on one device.
pub fn open_live(name: &str, config: &CaptureConfig) -> Result<Capture<Active>, CaptureError> {
    let devices = Device::list().map_err(CaptureError::Pcap)?;
    let device = devices
        .into_iter()
        .find(|d| d.name == name)
        .ok_or_else(|| CaptureError::NoDevice(format!("interface '{}' not found", name)))?;

    let mut cap = Capture::from_device(device)
        .map_err(CaptureError::Pcap)?
        .promisc(config.promiscuous)
        .snaplen(config.snaplen)
        .timeout(config.timeout_ms)
        .open()
        .map_err(CaptureError::Pcap)?;
    apply_filter(&mut cap, &config.filter)?;

    tracing::info!(
        interface = %name,
        promiscuous = config.promiscuous,
        snaplen = config.snaplen,
        filter = %config.filter,
        link = %link_type(&cap),
        "capture started"
    );
    Ok(cap)
}

/// Open a capture file. The filter is applied here too so that offline runs
/// see the same traffic a live run would.
pub fn open_offline(path: &Path, filter: &str) -> Result<Capture<Offline>, CaptureError> {
    let mut cap = Capture::from_file(path).map_err(|source| CaptureError::File {
        path: path.to_path_buf(),
        source,
    })?;
    apply_filter(&mut cap, filter)?;
    tracing::info!(path = %path.display(), filter = %filter, link = %link_type(&cap), "reading capture file");
    Ok(cap)
}

fn apply_filter<T: Activated + ?Sized>(cap: &mut Capture<T>, filter: &str) -> Result<(), CaptureError> {
    cap.filter(filter, true).map_err(|source| CaptureError::Filter {
        filter: filter.to_string(),
        source,
    })
}

pub fn link_type<T: Activated + ?Sized>(cap: &Capture<T>) -> LinkType {
    LinkType::from_dlt(cap.get_datalink().0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn filter_expression() {
        assert_eq!(build_filter(None, None, None), "tcp");
        assert_eq!(build_filter(Some(8080), None, None), "tcp and port 8080");
        assert_eq!(
            build_filter(
                Some(80),
                Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))),
                Some("not net 192.168.0.0/16")
            ),
            "tcp and port 80 and host 10.0.0.2 and (not net 192.168.0.0/16)"
        );
        assert_eq!(build_filter(None, None, Some("  ")), "tcp");
    }

    #[test]
    fn named_interface_is_used_as_is() {
        assert_eq!(resolve_devices("eth0").unwrap(), vec!["eth0".to_string()]);
    }

    #[test]
    fn missing_file_is_a_file_error() {
        let err = open_offline(Path::new("/nonexistent/capture.pcap"), "tcp").err().expect("open_offline should fail");
        assert!(matches!(err, CaptureError::File { .. }));
        assert!(err.to_string().contains("/nonexistent/capture.pcap"));
    }
}

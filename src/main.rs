use clap::Parser;
use httpcap::capture::{self, CaptureConfig};
use httpcap::cli;
use httpcap::config::{self, Config};
use httpcap::output::Printer;
use httpcap::pipeline::{self, PipelineConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() {
    let args = cli::Cli::parse();

    // Diagnostics go to stderr; stdout carries transcripts.
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if args.list_interfaces {
        list_interfaces();
        return;
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
        eprintln!("\nInterrupt received, stopping capture...");
    }) {
        tracing::warn!(error = %err, "failed to set Ctrl-C handler");
    }

    if let Err(e) = run(&config, &running) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

/// List available network interfaces and print them.
fn list_interfaces() {
    match capture::engine::list_interfaces() {
        Ok(devices) => {
            println!("Available network interfaces:");
            println!("{:<20} {:<20} {}", "Name", "Description", "Addresses");
            println!("{}", "-".repeat(70));
            for device in &devices {
                let desc = device.desc.as_deref().unwrap_or("");
                let addrs: Vec<String> = device
                    .addresses
                    .iter()
                    .map(|a| format!("{}", a.addr))
                    .collect();
                println!("{:<20} {:<20} {}", device.name, desc, addrs.join(", "));
            }
            if devices.is_empty() {
                println!("  (no interfaces found, try running with sudo)");
            }
        }
        Err(e) => {
            eprintln!("error listing interfaces: {}", e);
            eprintln!("hint: try running with sudo");
        }
    }
}

fn run(config: &Config, running: &Arc<AtomicBool>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = config.exchange_filter()?;
    let capture_config = CaptureConfig {
        interface: config.capture.interface.clone(),
        file: config.capture.file.clone(),
        promiscuous: config.capture.promiscuous,
        snaplen: config.capture.snaplen,
        timeout_ms: config.capture.timeout_ms,
        filter: capture::build_filter(
            config.filter.port,
            config.filter.ip,
            config.capture.bpf.as_deref(),
        ),
    };

    // Open the destination before capturing so a bad path fails fast.
    let printer = Arc::new(match &config.output.file {
        Some(path) => Printer::to_file(path, config.output.queue_capacity)?,
        None => Printer::stdout(config.output.queue_capacity)?,
    });

    let (sources, packets) = capture::source::start(&capture_config, 4096, running.clone())?;
    match &capture_config.file {
        Some(path) => eprintln!("Reading {}", path.display()),
        None => eprintln!("Capturing on interface: {}", capture_config.interface),
    }
    eprintln!("Filter: {}", capture_config.filter);
    if config.run.count > 0 {
        eprintln!("Capturing {} packets...", config.run.count);
    } else if !sources.offline {
        eprintln!("Capturing packets (Ctrl-C to stop)...");
    }

    let pipeline_config = PipelineConfig {
        flow_filter: config.flow_filter(),
        stream: config.stream_options(),
        idle_secs: config.assembly.idle_secs,
        flush_interval_secs: config.assembly.flush_interval_secs,
        count: config.run.count,
        live: !sources.offline,
    };
    let stats = pipeline::run(
        pipeline_config,
        packets,
        running,
        config.render_options(),
        filter,
        printer,
    );

    // The packet receiver is gone, so blocked capture threads wake up.
    running.store(false, Ordering::SeqCst);
    sources.join();

    eprintln!("{}", stats);
    Ok(())
}

/// Layer command-line overrides on top of the config file.
fn load_config(args: &cli::Cli) -> Result<Config, config::ConfigError> {
    let base = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let mut capture = base.capture.clone();
    let mut filter = base.filter.clone();
    let mut output = base.output.clone();
    let mut assembly = base.assembly.clone();
    let mut run = base.run.clone();

    if let Some(value) = &args.interface {
        capture.interface = value.clone();
    }
    if let Some(value) = &args.file {
        capture.file = Some(value.clone());
    }
    if let Some(value) = &args.bpf {
        capture.bpf = Some(value.clone());
    }
    if let Some(value) = args.snaplen {
        capture.snaplen = value;
    }
    if let Some(value) = args.timeout_ms {
        capture.timeout_ms = value;
    }
    if args.promiscuous {
        capture.promiscuous = true;
    }
    if args.no_promiscuous {
        capture.promiscuous = false;
    }

    if let Some(value) = args.filter {
        if value.ip.is_some() {
            filter.ip = value.ip;
        }
        if value.port.is_some() {
            filter.port = value.port;
        }
    }
    if let Some(value) = args.ip {
        filter.ip = Some(value);
    }
    if let Some(value) = args.port {
        filter.port = Some(value);
    }
    if let Some(value) = &args.host {
        filter.host = Some(value.clone());
    }
    if let Some(value) = &args.uri {
        filter.uri = Some(value.clone());
    }
    if let Some(value) = &args.status {
        filter.status = Some(value.clone());
    }

    if let Some(value) = args.level {
        output.level = value;
    }
    if let Some(value) = &args.output {
        output.file = Some(value.clone());
    }
    if args.curl {
        output.curl = true;
    }
    if args.no_curl {
        output.curl = false;
    }
    if args.pretty {
        output.pretty = true;
    }
    if args.no_pretty {
        output.pretty = false;
    }
    if let Some(value) = args.max_body {
        output.max_body = value;
    }
    if args.force {
        output.force = true;
    }
    if args.no_force {
        output.force = false;
    }

    if let Some(value) = args.idle_secs {
        assembly.idle_secs = value;
    }
    if let Some(value) = args.count {
        run.count = value;
    }

    let config = Config {
        capture,
        filter,
        output,
        assembly,
        run,
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpcap::http::Level;

    #[test]
    fn flags_override_defaults() {
        let args = cli::Cli::try_parse_from([
            "httpcap", "-i", "eth0", "--filter", "10.0.0.2:8080", "--port", "9090", "--host",
            "example.com", "--level", "url", "--curl", "--max-body", "512", "-c", "5",
        ])
        .unwrap();
        let config = load_config(&args).unwrap();
        assert_eq!(config.capture.interface, "eth0");
        assert_eq!(config.filter.ip, Some("10.0.0.2".parse().unwrap()));
        // --port wins over the port half of --filter.
        assert_eq!(config.filter.port, Some(9090));
        assert_eq!(config.filter.host.as_deref(), Some("example.com"));
        assert_eq!(config.output.level, Level::Url);
        assert!(config.output.curl);
        assert_eq!(config.output.max_body, 512);
        assert_eq!(config.run.count, 5);
    }

    #[test]
    fn bad_status_is_rejected() {
        let args = cli::Cli::try_parse_from(["httpcap", "--status", "abc"]).unwrap();
        assert!(matches!(load_config(&args), Err(config::ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args = cli::Cli::try_parse_from(["httpcap", "--config", "/nonexistent/httpcap.toml"]).unwrap();
        assert!(matches!(load_config(&args), Err(config::ConfigError::Io(_))));
    }
}

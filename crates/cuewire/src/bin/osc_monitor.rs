use clap::Parser;
use cuewire::{logging, net, MappingSettings, Settings};
use cuewire_osc::{Handler, MappingEntry, OscServer, ValueKind};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Receive OSC messages over UDP and log them as they are dispatched"
)]
struct Args {
    /// Settings file (defaults to ./cuewire.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overrides the settings file
    #[arg(short, long)]
    port: Option<u16>,

    /// Milliseconds between queue drains
    #[arg(short, long, default_value = "33")]
    tick_ms: u64,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Broadcast the announce message on startup
    #[arg(short, long)]
    announce: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn mapping_handler(mapping: &MappingSettings) -> MappingEntry {
    let address = mapping.address.clone();
    let handler = match mapping.kind {
        ValueKind::Float => Handler::float(move |v| {
            info!("{} <- {}", address, v);
            Ok(())
        }),
        ValueKind::Int => Handler::int(move |v| {
            info!("{} <- {}", address, v);
            Ok(())
        }),
        ValueKind::String => Handler::string(move |v| {
            info!("{} <- {:?}", address, v);
            Ok(())
        }),
        ValueKind::Trigger => Handler::trigger(move || {
            info!("{} triggered", address);
            Ok(())
        }),
    };
    MappingEntry::new(mapping.address.clone(), handler)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init(args.verbose);

    let settings = Settings::resolve(args.config.as_deref())?;
    let mut receive = settings.receive();
    if let Some(port) = args.port {
        receive.port = port;
    }

    let mut server = OscServer::new(receive.receiver_config());
    for mapping in &settings.mappings {
        server.add_mapping(mapping_handler(mapping));
    }

    let addr = server.start()?;
    info!(
        "OSC monitor listening on {} with {} mappings",
        addr,
        settings.mappings.len()
    );

    if args.announce || settings.announce().enabled {
        if let Err(e) = net::announce(&settings) {
            error!("Announce failed: {}", e);
        }
    }

    let tick = Duration::from_millis(args.tick_ms.max(1));
    let deadline = args.duration.map(|s| Instant::now() + Duration::from_secs(s));
    let mut last_report = Instant::now();

    while deadline.map_or(true, |d| Instant::now() < d) {
        for message in server.drain() {
            if message.degraded {
                info!("{} (degraded, tag {:?})", message, message.tag);
            } else {
                info!("{}", message);
            }
            let report = server.dispatch(&message);
            debug!(
                "{}: {} invoked, {} skipped, {} failed",
                message.address, report.invoked, report.skipped, report.failed
            );
        }

        if last_report.elapsed() >= Duration::from_secs(10) {
            if let Some(stats) = server.receiver_stats() {
                info!(
                    "Received {} datagrams ({} bytes), {} decode errors, {} dropped",
                    stats.datagrams, stats.bytes, stats.decode_errors, stats.queue_drops
                );
            }
            last_report = Instant::now();
        }

        thread::sleep(tick);
    }

    let totals = server.totals();
    server.shutdown();
    info!(
        "Dispatched {} messages: {} handler calls, {} failures",
        totals.messages, totals.invoked, totals.failed
    );
    Ok(())
}

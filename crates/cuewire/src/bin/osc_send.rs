use clap::Parser;
use cuewire::{logging, net, Settings};
use cuewire_osc::{OscSender, SendThrottle};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Send OSC messages written as address:value commands"
)]
struct Args {
    /// Commands such as /cue/set:5 or /cue/next
    commands: Vec<String>,

    /// Settings file (defaults to ./cuewire.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Destination host, overrides the settings file
    #[arg(long)]
    host: Option<String>,

    /// Destination port, overrides the settings file
    #[arg(short, long)]
    port: Option<u16>,

    /// Address prefix, overrides the settings file
    #[arg(long)]
    prefix: Option<String>,

    /// Pace commands by the configured send interval
    #[arg(short, long)]
    throttle: bool,

    /// Broadcast the announce message before sending
    #[arg(short, long)]
    broadcast: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init(args.verbose);

    let mut settings = Settings::resolve(args.config.as_deref())?;
    let mut send = settings.send();
    if let Some(host) = args.host {
        send.host = host;
    }
    if let Some(port) = args.port {
        send.port = port;
    }
    if let Some(prefix) = args.prefix {
        send.prefix = prefix;
    }
    settings.send = Some(send.clone());

    if args.broadcast {
        net::announce(&settings)?;
    }

    if args.commands.is_empty() {
        if !args.broadcast {
            warn!("Nothing to send");
        }
        return Ok(());
    }

    let sender = OscSender::connect(send.sender_config())?;
    let mut throttle = SendThrottle::new(send.interval());

    for command in &args.commands {
        if args.throttle {
            while !throttle.ready() {
                thread::sleep(Duration::from_millis(1));
            }
        }
        match sender.send_command(command) {
            Ok(_) => info!("Sent {}", command),
            Err(e) => error!("Failed to send {}: {}", command, e),
        }
    }

    let stats = sender.stats();
    info!(
        "Sent {} messages ({} bytes) to {}:{}, {} failures",
        stats.messages_sent, stats.bytes_sent, send.host, send.port, stats.failures
    );
    if stats.failures > 0 {
        return Err(format!("{} sends failed", stats.failures).into());
    }
    Ok(())
}

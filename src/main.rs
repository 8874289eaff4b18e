//! arksnet - Game server wire protocol tool
//!
//! Inspect the dispatch table, encode protocol fields and run the relay
//! scenario in-process.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use arksnet::config::{self, Config};
use arksnet::dispatch::{self, DispatchOutcome};
use arksnet::network::{drain_outbound, ConnectionRegistry, ConnectionStats};
use arksnet::protocol::{
    opcodes, ObfuscationKey, Packet, PacketWriter, Position, StringEncoding, HEADER_SIZE,
};

/// arksnet - Game server wire protocol tool
#[derive(Parser)]
#[command(name = "arksnet")]
#[command(version)]
#[command(about = "Packet codec, opcode dispatch and movement relay", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered opcode handlers
    Opcodes,

    /// Encode a header-prefixed string and print it as hex
    Encode {
        /// Text to encode
        #[arg(short, long)]
        text: String,

        /// Use UTF-16 instead of ASCII
        #[arg(short, long)]
        wide: bool,

        /// Named obfuscation context from the config file
        #[arg(long, conflicts_with_all = ["xor", "sub"])]
        context: Option<String>,

        /// XOR constant (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_u32, default_value = "0")]
        xor: u32,

        /// SUB constant (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_u32, default_value = "0")]
        sub: u32,
    },

    /// Relay a movement packet between three in-process clients
    Simulate,

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show protocol constants
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Opcodes => {
            let table = dispatch::default_table(&config.dispatch)?;
            for ((major, minor), name) in table.entries() {
                println!("{:#04x}-{:#04x}  {}", major, minor, name);
            }
        }
        Commands::Encode {
            text,
            wide,
            context,
            xor,
            sub,
        } => {
            let key = match context {
                Some(name) => config.obfuscation_key(&name)?,
                None => ObfuscationKey::new(xor, sub),
            };
            let encoding = if wide {
                StringEncoding::Utf16
            } else {
                StringEncoding::Ascii
            };

            let mut writer = PacketWriter::new();
            writer.write_string(&text, key.xor, key.sub, encoding);
            println!("{}", hex(writer.as_slice()));
        }
        Commands::Simulate => {
            run_simulation(config).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_protocol_info(&config);
        }
    }

    Ok(())
}

/// Three clients: A sends and is loaded, B is not loaded, C is loaded
async fn run_simulation(config: Config) -> anyhow::Result<()> {
    let registry = ConnectionRegistry::new(&config.network);
    let table = dispatch::default_table(&config.dispatch)?;

    let clients = [
        ("A", 0x0001_0001u32, true),
        ("B", 0x0001_0002, false),
        ("C", 0x0001_0003, true),
    ];
    let mut handles = Vec::new();
    let mut writers = Vec::new();

    for (label, player_id, loaded) in clients {
        let (handle, outbound) = registry.connect(player_id);
        if loaded {
            handle.set_character(Some(player_id));
        }

        let stats = Arc::new(ConnectionStats::default());
        let writer_stats = stats.clone();
        let writer = tokio::spawn(async move {
            let mut sink: Vec<u8> = Vec::new();
            let result = drain_outbound(outbound, &mut sink, writer_stats).await;
            result.map(|_| sink)
        });

        handles.push(handle);
        writers.push((label, writer, stats));
    }

    let sender = &handles[0];

    // Client-supplied id is garbage; the relay stamps the real one
    let mut payload = PacketWriter::new();
    payload.write_u32(0xDEAD_BEEF);
    payload.write_position(&Position::new(0.0, 0.0, 0.0, 1.5, 120.5, 4.0, -36.25));
    let payload = payload.into_bytes();

    let (major, minor) = opcodes::MOVEMENT;
    let movement = Packet::new(major, minor, 0, payload.clone());
    let frame = movement.to_bytes();
    let outcome = table.dispatch_frame(&registry, sender, &frame, config.network.max_packet_size);
    report_outcome("movement", outcome);

    if let Some([major, minor]) = config.dispatch.movement_event_opcode {
        let event = Packet::new(major, minor, 0, payload.clone());
        report_outcome("movement event", table.dispatch_packet(&registry, sender, &event));
    }

    let unknown = Packet::new(0x7F, 0x7F, 0, payload);
    report_outcome("unknown opcode", table.dispatch_packet(&registry, sender, &unknown));

    let truncated = Packet::new(major, minor, 0, vec![0u8; 2]);
    report_outcome("short movement", table.dispatch_packet(&registry, sender, &truncated));

    // Writers finish once every sender is gone
    for handle in &handles {
        registry.disconnect(handle.id());
    }
    drop(handles);

    for (label, writer, stats) in writers {
        let sink = writer.await??;
        println!(
            "{}: {} packet(s), {} bytes",
            label,
            stats.packets_sent(),
            stats.bytes_sent()
        );
        let mut rest = &sink[..];
        while rest.len() >= HEADER_SIZE {
            let size = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
            let (frame, tail) = rest.split_at(size.clamp(HEADER_SIZE, rest.len()));
            println!("  {}", hex(frame));
            rest = tail;
        }
    }

    table.stats().log_summary();
    Ok(())
}

fn report_outcome(label: &str, outcome: DispatchOutcome) {
    println!("{:<16} -> {:?}", label, outcome);
}

fn print_protocol_info(config: &Config) {
    println!("arksnet Protocol Information");
    println!("============================\n");

    println!("Frame header: {} bytes (size, major, minor, flags, flags2)", HEADER_SIZE);
    println!("Max packet size: {} bytes", config.network.max_packet_size);
    println!("Send queue capacity: {}", config.network.send_queue_capacity);

    println!("\nMovement relay:");
    println!(
        "  inbound  {:#04x}-{:#04x}, {:#04x}-{:#04x}",
        opcodes::MOVEMENT.0,
        opcodes::MOVEMENT.1,
        opcodes::MOVEMENT_END.0,
        opcodes::MOVEMENT_END.1
    );
    println!(
        "  outbound {:#04x}-{:#04x} flags {:#04x} (other loaded players)",
        opcodes::MOVEMENT_MAJOR,
        opcodes::RELAY_MINOR,
        opcodes::RELAY_FLAGS
    );
    println!(
        "  outbound {:#04x}-{:#04x} flags {:#04x} (all loaded players)",
        opcodes::MOVEMENT_MAJOR,
        opcodes::BROADCAST_MINOR,
        opcodes::BROADCAST_FLAGS
    );

    match config.dispatch.movement_event_opcode {
        Some([major, minor]) => println!("  event    {:#04x}-{:#04x}", major, minor),
        None => println!("  event    (not routed)"),
    }

    if !config.obfuscation.is_empty() {
        println!("\nObfuscation contexts:");
        for (name, key) in &config.obfuscation {
            println!("  {:<20} xor={:#x} sub={:#x}", name, key.xor, key.sub);
        }
    }
}

fn parse_u32(value: &str) -> Result<u32, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(digits) => u32::from_str_radix(digits, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid u32 '{}': {}", value, e))
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["arksnet", "info"]);
        assert!(cli.is_ok());

        let cli = Cli::try_parse_from(["arksnet", "encode", "--text", "hi", "--xor", "0x8ba4", "--sub", "182"]);
        assert!(cli.is_ok());

        let cli = Cli::try_parse_from(["arksnet", "encode", "--text", "hi", "--context", "a", "--xor", "1"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_parse_u32() {
        assert_eq!(parse_u32("0x8BA4"), Ok(0x8BA4));
        assert_eq!(parse_u32("182"), Ok(182));
        assert!(parse_u32("0xZZ").is_err());
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x04, 0x71, 0xff]), "04 71 ff");
    }

    #[tokio::test]
    async fn test_simulation_runs() {
        let config = Config::default();
        run_simulation(config).await.unwrap();
    }
}

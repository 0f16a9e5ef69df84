//! CLI argument parsing

use clap::{Parser, Subcommand};
use pktwire_packet::packet::DEFAULT_MAX_DEPTH;
use pktwire_packet::PacketKind;

#[derive(Parser, Debug)]
#[command(name = "pktwire")]
#[command(version, about = "Decode and inspect network packets", long_about = None)]
pub struct Cli {
    /// Verbose output (-v, -vv, -vvv for increasing verbosity)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode a packet given as hex
    Decode {
        /// Hex bytes, separators ':' and whitespace allowed; '-' reads stdin
        #[arg(value_name = "HEX")]
        input: String,

        /// Protocol of the outermost layer (eth, vlan, arp, ip, icmp, tcp, udp)
        #[arg(short, long, default_value = "ethernet", value_parser = parse_kind)]
        kind: PacketKind,

        /// Bit position of the first header bit
        #[arg(long, value_name = "BITS", default_value_t = 0)]
        bit_offset: usize,

        /// Skip checksum verification
        #[arg(long)]
        no_verify: bool,

        /// Maximum payload nesting depth
        #[arg(long, value_name = "DEPTH", default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: usize,
    },

    /// Compute the internet checksum of hex bytes
    Checksum {
        /// Hex bytes, separators ':' and whitespace allowed; '-' reads stdin
        #[arg(value_name = "HEX")]
        input: String,
    },

    /// List supported protocols and dispatch tables
    Kinds,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Default log filter for the requested verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

fn parse_kind(name: &str) -> Result<PacketKind, String> {
    PacketKind::from_name(name).ok_or_else(|| {
        let known: Vec<String> = PacketKind::ALL
            .iter()
            .map(|kind| kind.name().to_ascii_lowercase())
            .collect();
        format!("unknown protocol '{}', expected one of {}", name, known.join(", "))
    })
}

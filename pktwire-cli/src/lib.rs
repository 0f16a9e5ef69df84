//! CLI interface for pktwire
//!
//! Argument parsing lives in [`args`]; [`run`] executes a parsed command and
//! writes its report to any [`Write`] sink so the binary and the tests share
//! one code path.

pub mod args;

use std::io::{self, Read, Write};

use pktwire_core::bits::BITS_PER_BYTE;
use pktwire_packet::{
    ether_types, internet_checksum, ip_protocols, DecodeOptions, Packet, PacketKind,
};
use thiserror::Error;
use tracing::{debug, info};

pub use args::{Cli, Commands};

/// Errors reported by the `pktwire` binary
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid hex input: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("No input bytes")]
    EmptyInput,

    #[error(transparent)]
    Codec(#[from] pktwire_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Parse hex text, ignoring whitespace and ':' separators
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    if digits.is_empty() {
        return Err(CliError::EmptyInput);
    }
    Ok(hex::decode(digits)?)
}

/// Read the hex argument, or stdin when it is "-"
fn read_hex(input: &str) -> Result<Vec<u8>> {
    if input == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        parse_hex(&text)
    } else {
        parse_hex(input)
    }
}

/// Execute a command, writing its output to `out`
pub fn run<W: Write>(command: &Commands, out: &mut W) -> Result<()> {
    match command {
        Commands::Decode {
            input,
            kind,
            bit_offset,
            no_verify,
            max_depth,
        } => {
            let data = read_hex(input)?;
            let options = DecodeOptions::new()
                .with_verify_checksums(!no_verify)
                .with_max_depth(*max_depth);
            decode(out, &data, *kind, *bit_offset, &options)
        }
        Commands::Checksum { input } => {
            let data = read_hex(input)?;
            debug!(len = data.len(), "Computing checksum");
            writeln!(out, "0x{:04x}", internet_checksum(&data))?;
            Ok(())
        }
        Commands::Kinds => kinds(out),
    }
}

/// Decode `data` and print one line per layer
pub fn decode<W: Write>(
    out: &mut W,
    data: &[u8],
    kind: PacketKind,
    bit_offset: usize,
    options: &DecodeOptions,
) -> Result<()> {
    let bit_length = (data.len() * BITS_PER_BYTE).saturating_sub(bit_offset);
    info!(%kind, bytes = data.len(), bit_offset, "Decoding packet");

    let packet = Packet::decode_with(kind, data, bit_offset, bit_length, options)?;

    let mut last = &packet;
    for (depth, layer) in packet.layers().enumerate() {
        let flag = if layer.is_corrupted() { " [corrupted]" } else { "" };
        writeln!(out, "{}: {}{}", depth, layer.header(), flag)?;
        last = layer;
    }
    if let Some(raw) = last.raw_payload() {
        writeln!(out, "raw payload: {} bytes", raw.len())?;
    }
    let trailer: usize = packet.layers().filter_map(Packet::trailer).map(|t| t.len()).sum();
    if trailer > 0 {
        writeln!(out, "trailer: {} bytes", trailer)?;
    }
    Ok(())
}

/// List protocol kinds and the dispatch tables that select them
pub fn kinds<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "Protocols:")?;
    for kind in PacketKind::ALL {
        writeln!(out, "  {}", kind)?;
    }

    let table = ether_types();
    writeln!(out, "{}:", table.name())?;
    for (value, kind) in table.iter() {
        writeln!(out, "  0x{:04x} -> {}", value, kind)?;
    }

    let table = ip_protocols();
    writeln!(out, "{}:", table.name())?;
    for (value, kind) in table.iter() {
        writeln!(out, "  {} -> {}", value, kind)?;
    }
    Ok(())
}

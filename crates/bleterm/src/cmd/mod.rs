use std::path::PathBuf;
use std::time::Duration;

use bleterm_frame::{FrameConfig, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_RECEIVE_BUFFER_CAPACITY};
use clap::{Args, Subcommand};

use crate::exit::{frame_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod chunks;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Advertise a peripheral on a socket path and print received messages.
    Serve(ServeArgs),
    /// Connect to a peripheral and send one message.
    Send(SendArgs),
    /// Show how a message is cut into chunks.
    Chunks(ChunksArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Chunks(args) => chunks::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Framing options shared by every command that touches a link.
#[derive(Args, Debug, Clone)]
pub struct FramingArgs {
    /// Largest chunk handed to the link in one write.
    #[arg(long, default_value_t = DEFAULT_MAX_CHUNK_SIZE)]
    pub max_chunk_size: usize,
    /// Receive buffer capacity in bytes (one slot is reserved).
    #[arg(long, default_value_t = DEFAULT_RECEIVE_BUFFER_CAPACITY)]
    pub receive_buffer: usize,
    /// Byte appended to every sent message (e.g. '\n', '\r', ';', 0x0a).
    #[arg(long, default_value = "\\n", value_parser = parse_separator)]
    pub send_separator: u8,
    /// Byte that ends every received message.
    #[arg(long, default_value = "\\n", value_parser = parse_separator)]
    pub receive_separator: u8,
    /// Pause between chunks of one message (e.g. 100ms, 1s).
    #[arg(long, value_name = "DURATION")]
    pub send_delay: Option<String>,
}

impl FramingArgs {
    pub fn frame_config(&self) -> CliResult<FrameConfig> {
        let inter_chunk_delay = match &self.send_delay {
            Some(delay) => parse_duration(delay)?,
            None => Duration::ZERO,
        };
        let config = FrameConfig {
            send_separator: self.send_separator,
            receive_separator: self.receive_separator,
            max_chunk_size: self.max_chunk_size,
            receive_buffer_capacity: self.receive_buffer,
            inter_chunk_delay,
        };
        config
            .validate()
            .map_err(|err| frame_error("invalid framing options", err))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to advertise on.
    pub path: PathBuf,
    /// Send every received message back to the central.
    #[arg(long)]
    pub echo: bool,
    /// Message sent periodically while a central is connected.
    #[arg(long, value_name = "TEXT")]
    pub announce: Option<String>,
    /// Interval between announcements (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub announce_interval: String,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Advertised device name.
    #[arg(long)]
    pub name: Option<String>,
    /// Advertised service id.
    #[arg(long)]
    pub service: Option<String>,
    /// Advertised characteristic id.
    #[arg(long)]
    pub characteristic: Option<String>,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Message text.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read the message from a file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Wait for one reply message and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct ChunksArgs {
    /// Message text.
    #[arg(long, default_value = "")]
    pub data: String,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a duration like `150ms`, `2s` or `3` (seconds).
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

/// Parse a separator byte: an escape (`\n`, `\r`, `\t`, `\0`), a hex
/// literal (`0x0a`) or a single ASCII character.
pub fn parse_separator(input: &str) -> Result<u8, String> {
    match input {
        "\\n" => return Ok(b'\n'),
        "\\r" => return Ok(b'\r'),
        "\\t" => return Ok(b'\t'),
        "\\0" => return Ok(0),
        _ => {}
    }

    if let Some(hex) = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        return u8::from_str_radix(hex, 16).map_err(|_| format!("invalid hex separator: {input}"));
    }

    match input.as_bytes() {
        [byte] if byte.is_ascii() => Ok(*byte),
        _ => Err(format!(
            "separator must be one ASCII character, an escape or 0xNN: {input}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn parse_separator_forms() {
        assert_eq!(parse_separator("\\n"), Ok(b'\n'));
        assert_eq!(parse_separator("\\r"), Ok(b'\r'));
        assert_eq!(parse_separator(";"), Ok(b';'));
        assert_eq!(parse_separator("0x0A"), Ok(b'\n'));
        assert_eq!(parse_separator("0X00"), Ok(0));
        assert!(parse_separator("ab").is_err());
        assert!(parse_separator("0xzz").is_err());
        assert!(parse_separator("").is_err());
    }

    #[test]
    fn framing_args_validate() {
        let args = FramingArgs {
            max_chunk_size: 0,
            receive_buffer: 128,
            send_separator: b'\n',
            receive_separator: b'\n',
            send_delay: None,
        };
        let err = args.frame_config().unwrap_err();
        assert_eq!(err.code, USAGE);

        let args = FramingArgs {
            max_chunk_size: 20,
            send_delay: Some("25ms".to_string()),
            ..args
        };
        let config = args.frame_config().unwrap();
        assert_eq!(config.inter_chunk_delay, Duration::from_millis(25));
    }
}

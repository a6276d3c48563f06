use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    schema_id: &'a str,
    size: usize,
    message: String,
    peer: &'a str,
    timestamp: String,
}

pub fn print_message(message: &[u8], peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                schema_id: "https://schemas.3leaps.dev/bleterm/cli/v1/message-received.schema.json",
                size: message.len(),
                message: message_preview(message),
                peer,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "SIZE", "MESSAGE"])
                .add_row(vec![
                    peer.to_string(),
                    message.len().to_string(),
                    message_preview(message),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "peer={} size={} message={}",
                peer,
                message.len(),
                message_preview(message)
            );
        }
        OutputFormat::Raw => {
            let mut line = message.to_vec();
            line.push(b'\n');
            print_raw(&line);
        }
    }
}

#[derive(Serialize)]
struct ChunkOutput {
    index: usize,
    size: usize,
    data: String,
}

#[derive(Serialize)]
struct ChunkPlanOutput<'a> {
    schema_id: &'a str,
    message_size: usize,
    max_chunk_size: usize,
    separator: String,
    chunk_count: usize,
    chunks: Vec<ChunkOutput>,
}

/// Print how a message is cut into chunks.
pub fn print_chunk_plan(
    message_size: usize,
    max_chunk_size: usize,
    separator: u8,
    chunks: &[Bytes],
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = ChunkPlanOutput {
                schema_id: "https://schemas.3leaps.dev/bleterm/cli/v1/chunk-plan.schema.json",
                message_size,
                max_chunk_size,
                separator: escaped(&[separator]),
                chunk_count: chunks.len(),
                chunks: chunks
                    .iter()
                    .enumerate()
                    .map(|(index, chunk)| ChunkOutput {
                        index,
                        size: chunk.len(),
                        data: escaped(chunk),
                    })
                    .collect(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHUNK", "SIZE", "DATA"]);
            for (index, chunk) in chunks.iter().enumerate() {
                table.add_row(vec![index.to_string(), chunk.len().to_string(), escaped(chunk)]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "message_size={} max_chunk_size={} chunks={}",
                message_size,
                max_chunk_size,
                chunks.len()
            );
            for (index, chunk) in chunks.iter().enumerate() {
                println!("  [{index}] size={} data={}", chunk.len(), escaped(chunk));
            }
        }
        OutputFormat::Raw => {
            for chunk in chunks {
                print_raw(chunk);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn message_preview(message: &[u8]) -> String {
    match std::str::from_utf8(message) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", message.len()),
    }
}

fn escaped(data: &[u8]) -> String {
    data.escape_ascii().to_string()
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

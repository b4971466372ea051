use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use streamgate_frame::{hex_dump, Frame, FrameError};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
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

#[derive(Debug, Serialize)]
pub struct FrameOutput {
    pub index: usize,
    pub prefix_len: u8,
    pub declared_len: usize,
    pub payload_size: usize,
    pub crc: String,
    pub payload_hex: String,
    /// Present only when the payload is valid UTF-8.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_text: Option<String>,
}

impl FrameOutput {
    pub fn new(index: usize, frame: &Frame) -> Self {
        Self {
            index,
            prefix_len: frame.prefix_len,
            declared_len: frame.declared_len(),
            payload_size: frame.payload.len(),
            crc: format!("{:04X}", frame.crc),
            payload_hex: hex::encode_upper(&frame.payload),
            payload_text: std::str::from_utf8(&frame.payload)
                .ok()
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize)]
struct DecodeReport<'a> {
    frames: &'a [FrameOutput],
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    residue: Option<String>,
}

/// Print decoded frames plus the framing error and residue that stopped decoding, if any.
pub fn print_frames(
    frames: &[Frame],
    failure: Option<(&FrameError, &[u8])>,
    format: OutputFormat,
) {
    let rows: Vec<FrameOutput> = frames
        .iter()
        .enumerate()
        .map(|(index, frame)| FrameOutput::new(index, frame))
        .collect();

    match format {
        OutputFormat::Json => {
            let report = DecodeReport {
                frames: &rows,
                error: failure.map(|(err, _)| err.to_string()),
                residue: failure.map(|(_, residue)| hex_dump(residue)),
            };
            println!(
                "{}",
                serde_json::to_string(&report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "PREFIX", "LEN", "CRC", "PAYLOAD"]);
            for row in &rows {
                table.add_row(vec![
                    row.index.to_string(),
                    row.prefix_len.to_string(),
                    row.declared_len.to_string(),
                    row.crc.clone(),
                    preview(row),
                ]);
            }
            println!("{table}");
            print_failure(failure);
        }
        OutputFormat::Pretty => {
            for row in &rows {
                println!(
                    "frame={} prefix={} len={} crc={} payload={}",
                    row.index,
                    row.prefix_len,
                    row.declared_len,
                    row.crc,
                    preview(row)
                );
            }
            print_failure(failure);
        }
        OutputFormat::Raw => {
            for frame in frames {
                print_raw(&frame.payload);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_failure(failure: Option<(&FrameError, &[u8])>) {
    if let Some((err, residue)) = failure {
        println!("error: {err}");
        println!("residue: {}", hex_dump(residue));
    }
}

fn preview(row: &FrameOutput) -> String {
    match &row.payload_text {
        Some(text) => text.clone(),
        None => format!("<binary {} bytes>", row.payload_size),
    }
}

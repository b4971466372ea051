use bytes::Bytes;
use streamgate_frame::FrameDecoder;
use tracing::{debug, warn};

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_frames, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let datagram = parse_hex(&args.hex.join(""))?;
    debug!(bytes = datagram.len(), "decoding datagram");
    Ok(print_datagram(datagram, format))
}

/// Print every frame of `datagram`. Returns `DATA_INVALID` when decoding stopped early.
pub fn print_datagram(datagram: impl Into<Bytes>, format: OutputFormat) -> i32 {
    let mut decoder = FrameDecoder::new(datagram);
    let mut frames = Vec::new();
    let mut failure = None;
    for item in decoder.by_ref() {
        match item {
            Ok(frame) => frames.push(frame),
            Err(err) => failure = Some(err),
        }
    }

    let residue = decoder.residue().cloned().unwrap_or_default();
    if let Some(err) = &failure {
        warn!(frames = frames.len(), error = %err, "decoding stopped early");
    }
    print_frames(
        &frames,
        failure.as_ref().map(|err| (err, &residue[..])),
        format,
    );

    if failure.is_some() {
        DATA_INVALID
    } else {
        SUCCESS
    }
}

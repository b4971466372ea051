use bytes::BytesMut;
use streamgate_frame::{encode_frame, encoded_len};

use crate::cmd::{parse_payloads, EncodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};

pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let payloads = parse_payloads(&args.payloads, args.text)?;
    let datagram = encode_datagram(&payloads)?;
    println!("{}", hex::encode_upper(&datagram));
    Ok(SUCCESS)
}

/// Pack every payload as one frame, in order, into a single datagram.
pub fn encode_datagram(payloads: &[Vec<u8>]) -> CliResult<BytesMut> {
    let total = payloads.iter().map(|p| encoded_len(p.len())).sum();
    let mut datagram = BytesMut::with_capacity(total);
    for (index, payload) in payloads.iter().enumerate() {
        encode_frame(payload, &mut datagram)
            .map_err(|err| frame_error(&format!("payload {index}"), err))?;
    }
    Ok(datagram)
}

#[cfg(test)]
mod tests {
    use streamgate_frame::FrameDecoder;

    use super::*;
    use crate::exit::USAGE;

    #[test]
    fn encodes_known_frame() {
        let datagram = encode_datagram(&[b"ABC".to_vec()]).unwrap();
        assert_eq!(hex::encode_upper(&datagram), "0541424321AD");
    }

    #[test]
    fn packs_payloads_in_order() {
        let datagram = encode_datagram(&[b"one".to_vec(), vec![0x42; 200]]).unwrap();
        let (frames, err) = FrameDecoder::new(datagram.freeze()).collect_all();
        assert!(err.is_none());
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload.as_ref(), b"one");
        assert_eq!(frames[1].prefix_len, 2);
        assert_eq!(frames[1].payload.len(), 200);
    }

    #[test]
    fn oversized_payload_is_usage_error() {
        let err = encode_datagram(&[vec![0; 40_000]]).unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}

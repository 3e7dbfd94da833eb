#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use survival_net::core::codec::PacketCodec;
use survival_net::error::ProtocolError;
use survival_net::next_packet;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Single-shot decode must never panic.
    let _ = next_packet(data);

    // Streaming decode must always make progress or stop.
    let mut codec = PacketCodec;
    let mut buf = BytesMut::from(data);
    loop {
        let before = buf.len();
        match codec.decode(&mut buf) {
            Ok(Some(_)) | Err(ProtocolError::UnknownMessageType { .. }) => {
                assert!(buf.len() < before);
            }
            Ok(None) | Err(_) => break,
        }
    }
});

#![no_main]

use arena_protocol::core::frame::FrameCodec;
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Drain every complete frame; errors are fine, panics are not
    let mut codec = FrameCodec::with_max_payload(64 * 1024);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(_frame)) = codec.decode(&mut buf) {}
});

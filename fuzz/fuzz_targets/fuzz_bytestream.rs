#![no_main]

use arena_protocol::core::bytestream::ByteReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks the read sequence, the rest is the payload
    let (selector, payload) = data.split_at(1);
    let mut reader = ByteReader::new(payload);
    let mut shape = selector[0];

    loop {
        let outcome = match shape % 7 {
            0 => reader.read_bool().map(drop),
            1 => reader.read_i32().map(drop),
            2 => reader.read_varint().map(drop),
            3 => reader.read_string().map(drop),
            4 => reader.read_data_ref().map(drop),
            5 => reader.read_logic_long().map(drop),
            _ => reader.read_varint_array().map(drop),
        };
        if outcome.is_err() || reader.is_empty() {
            break;
        }
        shape = shape.wrapping_add(3);
    }
});

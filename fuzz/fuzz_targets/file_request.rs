#![no_main]
use libfuzzer_sys::fuzz_target;
use setu::proto::{decode, FileRequest};

fuzz_target!(|data: &[u8]| {
    let _ = decode::<FileRequest>(data);
});

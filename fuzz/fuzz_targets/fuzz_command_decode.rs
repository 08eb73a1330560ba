//! Fuzz target for IPC command decoding.
//!
//! Arbitrary bytes must decode to a command or an error, never a panic.

#![no_main]

use kana_core::ipc::{decode_command, DEFAULT_MAX_FRAME_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decode_command(data, DEFAULT_MAX_FRAME_SIZE);
});

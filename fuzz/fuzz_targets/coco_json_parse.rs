//! Fuzz target for COCO JSON parsing.
//!
//! Run with:
//!   cargo +nightly fuzz run coco_json_parse

#![no_main]

use annoconv::ir::io_coco_json::from_coco_str;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // 10MB is generous for one annotation file.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };

    // Only panics and hangs matter here.
    let _ = from_coco_str(json);
});

//! Fuzz target for YOLO label files: row parsing, class range checks and
//! conversion to pixel corners.

#![no_main]

use annoconv::ir::io_yolo::fuzz_parse_label_file;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Leading bytes pick the class count and the companion image size.
    let Some((header, body)) = data.split_first_chunk::<5>() else {
        return;
    };
    if body.len() > 1024 * 1024 {
        return;
    }
    let Ok(content) = std::str::from_utf8(body) else {
        return;
    };

    let class_count = usize::from(header[0]);
    let width = u32::from(u16::from_le_bytes([header[1], header[2]]));
    let height = u32::from(u16::from_le_bytes([header[3], header[4]]));
    let _ = fuzz_parse_label_file(content, class_count, width, height);
});

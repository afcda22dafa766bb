//! Fuzz target for VOC XML parsing.

#![no_main]

use annoconv::ir::io_voc_xml::from_voc_xml_str;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(xml) = std::str::from_utf8(data) else {
        return;
    };

    let _ = from_voc_xml_str(xml);
});

#![no_main]

use libfuzzer_sys::fuzz_target;
use zugferd_pipeline::cii;

fuzz_target!(|data: &[u8]| {
    // Decode → encode → decode must not panic at any step.
    if let Ok(tree) = cii::decode_xml(data) {
        if let Ok(xml) = cii::encode_xml(&tree) {
            let _ = cii::decode_xml(&xml);
        }
    }
});

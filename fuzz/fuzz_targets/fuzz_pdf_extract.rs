#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as PDF input, must not panic.
    let _ = zugferd_pipeline::pdf::extract_attachment(data);
    let _ = zugferd_pipeline::pdf::list_attachments(data);
    let _ = zugferd_pipeline::pdf::inspect_structure(data);
});

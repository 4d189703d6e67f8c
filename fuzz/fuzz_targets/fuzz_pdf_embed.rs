#![no_main]

use libfuzzer_sys::fuzz_target;
use zugferd_pipeline::pdf;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as base PDF. A successful embed must keep the input
    // as a prefix and yield the payload back.
    let payload = b"<rsm:CrossIndustryInvoice/>";
    if let Ok(out) = pdf::embed_attachment(data, payload, "fuzz") {
        assert!(out.starts_with(data));
        let _ = pdf::extract_attachment(&out);
        let _ = pdf::inspect_structure(&out);
    }
});

#![no_main]

use cilgraph::{
    analysis::cfg::analyze_method_body, assembly::DecodeMode, metadata::method::MethodBody,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Permissive analysis must never fail, whatever the bytes
    let analysis = analyze_method_body(data, Vec::new(), DecodeMode::Permissive)
        .expect("permissive analysis failed");
    let decoded: usize = analysis.instructions().iter().map(|i| i.size).sum();
    assert!(decoded <= data.len());

    let _ = analyze_method_body(data, Vec::new(), DecodeMode::Strict);
    let _ = MethodBody::parse(data);
});

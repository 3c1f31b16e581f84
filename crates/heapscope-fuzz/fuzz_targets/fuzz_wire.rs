#![no_main]
use heapscope_harness::EventRecord;
use heapscope_harness::capture::{extract_runs, validate_stream};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Whatever parses must render back to a line that parses the same way.
    for line in text.lines() {
        if let Ok(record) = EventRecord::parse(line) {
            let rendered = record.to_string();
            assert_eq!(EventRecord::parse(&rendered).as_ref(), Ok(&record));
        }
    }

    let report = validate_stream(text);
    if report.is_ok() {
        assert_eq!(extract_runs(text).len(), report.runs);
    }
});

#![no_main]
use heapscope_core::{AllocationHandle, BackendConfig, BackendKind, build_probe};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Byte 0 picks the backend; the rest is a sequence of 4-byte operations.
    let Some((&selector, ops)) = data.split_first() else {
        return;
    };
    let kind = BackendKind::ALL[selector as usize % BackendKind::ALL.len()];
    let config = BackendConfig {
        heap_bytes: 4096,
        segfit_bytes: 4096,
        arena_bytes: 4096,
        pool_block_count: 32,
        ..BackendConfig::default()
    };
    let capacity = config.region_bytes(kind);
    let mut probe = build_probe(kind, kind.as_str(), &config);
    let mut handles: Vec<AllocationHandle> = Vec::new();

    for chunk in ops.chunks_exact(4) {
        let arg = u16::from_le_bytes([chunk[1], chunk[2]]) as usize;
        match chunk[0] % 6 {
            0 => {
                if let Some(handle) = probe.allocate(arg % 1024) {
                    assert!(handle.addr() >= config.base_address);
                    assert!(handle.addr() < config.base_address + capacity);
                    handles.push(handle);
                }
            }
            1 => {
                // Legal, double, or stale: the handle stays in the list.
                if !handles.is_empty() {
                    let _ = probe.free(handles[arg % handles.len()]);
                }
            }
            2 => {
                let _ = probe.free(AllocationHandle::from_addr(config.base_address + arg));
            }
            3 => {
                if let Some(&handle) = handles.last() {
                    let _ = probe.write_bytes(handle, arg % 512, chunk[3]);
                }
            }
            4 => {
                if let Some(&handle) = handles.first() {
                    let _ = probe.read_bytes(handle.corrupt_handle(arg % 64), chunk[3] as usize);
                }
            }
            _ => {
                let usage = probe.query_usage();
                assert!(usage.allocated_bytes <= capacity);
            }
        }
    }
});

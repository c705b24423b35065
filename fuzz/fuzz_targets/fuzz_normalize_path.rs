#![no_main]

use libfuzzer_sys::fuzz_target;
use notevault_storage::normalize_path;

fuzz_target!(|data: &[u8]| {
    let Ok(path) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(normalized) = normalize_path(path) {
        assert!(!normalized.is_empty());
        assert!(!normalized.starts_with('/'));
        assert!(normalized.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != ".."));
        assert!(!normalized.contains('\\'));
        // Normalising is idempotent.
        assert_eq!(normalize_path(&normalized).expect("normalized path"), normalized);
    }
});

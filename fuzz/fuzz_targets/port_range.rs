#![no_main]

use ironlog_syslog::PortRange;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(spec) = std::str::from_utf8(data) {
        if let Ok(range) = PortRange::parse(spec) {
            assert!(!range.ports().is_empty());
        }
    }
});

#![no_main]

use ironlog_syslog::MessageParser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let parser = MessageParser::new();
    let raw = String::from_utf8_lossy(data);

    // 크래시나 패닉 없이 레코드 또는 MalformedMessage를 반환해야 한다
    if let Ok(record) = parser.parse(&raw) {
        let mut doc = serde_json::Map::new();
        record.write_fields(parser.field_names(), &mut doc);
        let _ = serde_json::to_string(&doc);
    }
});

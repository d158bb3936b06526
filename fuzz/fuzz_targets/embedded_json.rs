#![no_main]

use arbitrary::Arbitrary;
use ironlog_syslog::EmbeddedJsonParser;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    buffer_size: u8,
    text: String,
}

fuzz_target!(|input: Input| {
    let chunked = EmbeddedJsonParser::with_buffer_size(input.text.chars(), input.buffer_size as usize)
        .parse();
    let whole = EmbeddedJsonParser::new(input.text.chars()).parse();

    // 버퍼 크기와 무관하게 같은 결과여야 한다
    assert_eq!(chunked.is_ok(), whole.is_ok());
    if let (Ok(a), Ok(b)) = (chunked, whole) {
        assert_eq!(a, b);
    }
});

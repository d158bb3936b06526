//! 메시지 본문에 포함된 JSON 페이로드(`@cee:`) 디코더
//!
//! 입력 전체를 메모리에 올리지 않고, 고정 크기 미리읽기 버퍼와
//! 캡처 구간(start/pause/end)으로 문자열을 조립하는 단일 패스 재귀 하강 파서입니다.
//!
//! 숫자는 정밀도를 잃지 않도록 리터럴 문자열 그대로 보관합니다([`JsonValue::Number`]).
//! 객체는 삽입 순서를 유지하며, 중복 키는 마지막 값이 첫 위치를 차지합니다.
//!
//! # 사용 예시
//! ```
//! use ironlog_syslog::parser::json::{parse_str, JsonValue};
//!
//! let value = parse_str(r#"{"a":1,"b":"x"}"#).unwrap();
//! assert!(matches!(value, JsonValue::Object(_)));
//! ```

/// 기본 미리읽기 버퍼 크기 (문자 수)
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// 허용하는 최대 중첩 깊이
pub const MAX_DEPTH: usize = 128;

const REPLACEMENT: char = char::REPLACEMENT_CHARACTER;

/// JSON 디코딩 에러
///
/// 호출자(메시지 파서)는 이 에러를 "구조화 페이로드가 아님"으로 취급하고 버립니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JsonError {
    /// 값이 끝나기 전에 입력이 끝남
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,

    /// 최상위 값 뒤에 남은 문자
    #[error("unexpected character: {0:?}")]
    UnexpectedCharacter(char),

    /// 특정 구문 요소를 기대했으나 다른 문자가 나옴
    #[error("expected {0}")]
    Expected(String),

    /// 배열/객체 중첩이 너무 깊음
    #[error("nesting deeper than {0} levels")]
    NestingTooDeep(usize),
}

/// 디코딩된 JSON 값
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    /// 원본 숫자 리터럴 (`-12.5e3` 등)
    Number(String),
    String(String),
    Array(Vec<JsonValue>),
    /// 삽입 순서를 유지하는 키-값 목록 (키 중복 없음)
    Object(Vec<(String, JsonValue)>),
}

impl JsonValue {
    /// 객체라면 키로 값을 찾습니다.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        match self {
            JsonValue::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<JsonValue> for serde_json::Value {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => serde_json::Value::Null,
            JsonValue::Bool(b) => serde_json::Value::Bool(b),
            // f64/i64/u64로 표현할 수 없는 리터럴은 문자열로 보존
            JsonValue::Number(literal) => match literal.parse::<serde_json::Number>() {
                Ok(number) => serde_json::Value::Number(number),
                Err(_) => serde_json::Value::String(literal),
            },
            JsonValue::String(s) => serde_json::Value::String(s),
            JsonValue::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            JsonValue::Object(entries) => serde_json::Value::Object(
                entries.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

/// 문자열 전체를 하나의 JSON 값으로 디코딩합니다.
pub fn parse_str(input: &str) -> Result<JsonValue, JsonError> {
    EmbeddedJsonParser::new(input.chars()).parse()
}

/// 문자 스트림 위의 스트리밍 JSON 파서
///
/// 파서 상태(버퍼, 인덱스, 현재 문자, 캡처 구간)는 모두 이 구조체가 소유하며
/// [`parse`](Self::parse)가 값을 소비합니다.
pub struct EmbeddedJsonParser<I> {
    source: I,
    buf: Vec<char>,
    buffer_size: usize,
    /// 다음에 읽을 버퍼 위치
    index: usize,
    /// 버퍼에 채워진 문자 수
    fill: usize,
    /// 현재 문자. 입력이 끝나면 `None`
    ch: Option<char>,
    ended: bool,
    /// 이스케이프나 버퍼 경계 때문에 먼저 조립된 문자열 조각
    captured: String,
    /// 진행 중인 캡처의 버퍼 시작 위치
    capture_start: Option<usize>,
    depth: usize,
}

impl<I: Iterator<Item = char>> EmbeddedJsonParser<I> {
    /// 기본 버퍼 크기로 파서를 생성합니다.
    pub fn new(source: I) -> Self {
        Self::with_buffer_size(source, DEFAULT_BUFFER_SIZE)
    }

    /// 지정한 버퍼 크기로 파서를 생성합니다. 0은 1로 취급합니다.
    pub fn with_buffer_size(source: I, buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            source,
            buf: Vec::with_capacity(buffer_size),
            buffer_size,
            index: 0,
            fill: 0,
            ch: None,
            ended: false,
            captured: String::new(),
            capture_start: None,
            depth: 0,
        }
    }

    /// 하나의 값을 읽고, 뒤따르는 공백 이후 입력이 끝났는지 확인합니다.
    pub fn parse(mut self) -> Result<JsonValue, JsonError> {
        self.read()?;
        self.skip_blank()?;
        let value = self.parse_value()?;
        self.skip_blank()?;
        match self.ch {
            Some(c) => Err(JsonError::UnexpectedCharacter(c)),
            None => Ok(value),
        }
    }

    fn parse_value(&mut self) -> Result<JsonValue, JsonError> {
        match self.ch {
            Some('n') => self.parse_literal("ull", JsonValue::Null),
            Some('t') => self.parse_literal("rue", JsonValue::Bool(true)),
            Some('f') => self.parse_literal("alse", JsonValue::Bool(false)),
            Some('"') => self.parse_string().map(JsonValue::String),
            Some('[') => self.nested(Self::parse_array),
            Some('{') => self.nested(Self::parse_object),
            Some('-' | '+' | '0'..='9') => self.parse_number(),
            _ => Err(self.expected("value")),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<JsonValue, JsonError>,
    ) -> Result<JsonValue, JsonError> {
        if self.depth >= MAX_DEPTH {
            return Err(JsonError::NestingTooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_array(&mut self) -> Result<JsonValue, JsonError> {
        self.read()?;
        let mut items = Vec::new();
        self.skip_blank()?;
        if self.parse_char(']')? {
            return Ok(JsonValue::Array(items));
        }
        loop {
            self.skip_blank()?;
            items.push(self.parse_value()?);
            self.skip_blank()?;
            if !self.parse_char(',')? {
                break;
            }
        }
        if !self.parse_char(']')? {
            return Err(self.expected("',' or ']'"));
        }
        Ok(JsonValue::Array(items))
    }

    fn parse_object(&mut self) -> Result<JsonValue, JsonError> {
        self.read()?;
        let mut entries: Vec<(String, JsonValue)> = Vec::new();
        self.skip_blank()?;
        if self.parse_char('}')? {
            return Ok(JsonValue::Object(entries));
        }
        loop {
            self.skip_blank()?;
            if self.ch != Some('"') {
                return Err(self.expected("name"));
            }
            let name = self.parse_string()?;
            self.skip_blank()?;
            if !self.parse_char(':')? {
                return Err(self.expected("':'"));
            }
            self.skip_blank()?;
            let value = self.parse_value()?;
            match entries.iter_mut().find(|(k, _)| *k == name) {
                Some(slot) => slot.1 = value,
                None => entries.push((name, value)),
            }
            self.skip_blank()?;
            if !self.parse_char(',')? {
                break;
            }
        }
        if !self.parse_char('}')? {
            return Err(self.expected("',' or '}'"));
        }
        Ok(JsonValue::Object(entries))
    }

    fn parse_literal(&mut self, rest: &str, value: JsonValue) -> Result<JsonValue, JsonError> {
        self.read()?;
        for expected in rest.chars() {
            if !self.parse_char(expected)? {
                return Err(self.expected(&format!("'{expected}'")));
            }
        }
        Ok(value)
    }

    fn parse_string(&mut self) -> Result<String, JsonError> {
        self.read()?;
        self.start_capture();
        loop {
            match self.ch {
                Some('"') => break,
                Some('\\') => {
                    self.pause_capture();
                    self.parse_escaped()?;
                    self.start_capture();
                }
                Some(c) if c < '\u{20}' => return Err(self.expected("valid string character")),
                Some(_) => self.read()?,
                None => return Err(JsonError::UnexpectedEndOfInput),
            }
        }
        let s = self.end_capture();
        self.read()?;
        Ok(s)
    }

    /// 백슬래시 다음부터 이스케이프 시퀀스를 해석합니다.
    ///
    /// 종료 시 현재 문자는 시퀀스 다음 문자입니다.
    fn parse_escaped(&mut self) -> Result<(), JsonError> {
        self.read()?;
        if self.ch != Some('u') {
            self.push_simple_escape()?;
            return self.read();
        }

        let unit = self.parse_hex_unit()?;
        if !(0xD800..=0xDBFF).contains(&unit) {
            self.captured.push(char::from_u32(unit).unwrap_or(REPLACEMENT));
            return self.read();
        }

        // 상위 서로게이트: 바로 뒤에 \uXXXX 하위 서로게이트가 와야 함
        self.read()?;
        if self.ch != Some('\\') {
            self.captured.push(REPLACEMENT);
            return Ok(());
        }
        self.read()?;
        if self.ch != Some('u') {
            self.captured.push(REPLACEMENT);
            self.push_simple_escape()?;
            return self.read();
        }
        let low = self.parse_hex_unit()?;
        if (0xDC00..=0xDFFF).contains(&low) {
            let combined = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
            self.captured.push(char::from_u32(combined).unwrap_or(REPLACEMENT));
        } else {
            self.captured.push(REPLACEMENT);
            self.captured.push(char::from_u32(low).unwrap_or(REPLACEMENT));
        }
        self.read()
    }

    fn push_simple_escape(&mut self) -> Result<(), JsonError> {
        let unescaped = match self.ch {
            Some(c @ ('"' | '/' | '\\')) => c,
            Some('b') => '\u{8}',
            Some('t') => '\t',
            Some('f') => '\u{c}',
            Some('n') => '\n',
            Some('r') => '\r',
            _ => return Err(self.expected("valid escape sequence")),
        };
        self.captured.push(unescaped);
        Ok(())
    }

    /// `u` 뒤의 16진수 4자리를 읽습니다. 현재 문자는 마지막 자리로 남습니다.
    fn parse_hex_unit(&mut self) -> Result<u32, JsonError> {
        let mut unit = 0u32;
        for _ in 0..4 {
            self.read()?;
            let digit = self
                .ch
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.expected("hexadecimal digit"))?;
            unit = unit * 16 + digit;
        }
        Ok(unit)
    }

    fn parse_number(&mut self) -> Result<JsonValue, JsonError> {
        self.start_capture();
        self.parse_char('-')?;
        let first_digit = self.ch;
        if !self.parse_digit()? {
            return Err(self.expected("digit"));
        }
        if first_digit != Some('0') {
            while self.parse_digit()? {}
        }
        self.parse_fraction()?;
        self.parse_exponent()?;
        Ok(JsonValue::Number(self.end_capture()))
    }

    fn parse_fraction(&mut self) -> Result<bool, JsonError> {
        if !self.parse_char('.')? {
            return Ok(false);
        }
        if !self.parse_digit()? {
            return Err(self.expected("digit"));
        }
        while self.parse_digit()? {}
        Ok(true)
    }

    fn parse_exponent(&mut self) -> Result<bool, JsonError> {
        if !self.parse_char('e')? && !self.parse_char('E')? {
            return Ok(false);
        }
        if !self.parse_char('+')? {
            self.parse_char('-')?;
        }
        if !self.parse_digit()? {
            return Err(self.expected("digit"));
        }
        while self.parse_digit()? {}
        Ok(true)
    }

    fn parse_char(&mut self, expected: char) -> Result<bool, JsonError> {
        if self.ch != Some(expected) {
            return Ok(false);
        }
        self.read()?;
        Ok(true)
    }

    fn parse_digit(&mut self) -> Result<bool, JsonError> {
        if !self.ch.is_some_and(|c| c.is_ascii_digit()) {
            return Ok(false);
        }
        self.read()?;
        Ok(true)
    }

    fn skip_blank(&mut self) -> Result<(), JsonError> {
        while matches!(self.ch, Some(' ' | '\t' | '\n' | '\r')) {
            self.read()?;
        }
        Ok(())
    }

    /// 다음 문자로 이동합니다. 이미 입력 끝에 도달한 상태에서 호출하면 에러입니다.
    fn read(&mut self) -> Result<(), JsonError> {
        if self.ended {
            return Err(JsonError::UnexpectedEndOfInput);
        }
        if self.index == self.fill {
            if let Some(start) = self.capture_start {
                self.captured.extend(&self.buf[start..self.fill]);
                self.capture_start = Some(0);
            }
            self.buf.clear();
            self.buf
                .extend(self.source.by_ref().take(self.buffer_size));
            self.fill = self.buf.len();
            self.index = 0;
            if self.fill == 0 {
                self.ended = true;
                self.ch = None;
                return Ok(());
            }
        }
        self.ch = Some(self.buf[self.index]);
        self.index += 1;
        Ok(())
    }

    fn start_capture(&mut self) {
        self.capture_start = Some(self.index.saturating_sub(1));
    }

    fn capture_end(&self) -> usize {
        if self.ended {
            self.index
        } else {
            self.index.saturating_sub(1)
        }
    }

    fn pause_capture(&mut self) {
        let end = self.capture_end();
        if let Some(start) = self.capture_start.take() {
            self.captured.extend(&self.buf[start..end]);
        }
    }

    fn end_capture(&mut self) -> String {
        self.pause_capture();
        std::mem::take(&mut self.captured)
    }

    fn expected(&self, what: &str) -> JsonError {
        if self.ended {
            JsonError::UnexpectedEndOfInput
        } else {
            JsonError::Expected(what.to_owned())
        }
    }
}

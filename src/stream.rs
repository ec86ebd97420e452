//! Incremental reader for one huge JSON array.
//!
//! Export files hold a single multi-gigabyte document whose interesting
//! content is one top-level array (`locations`, `timelineObjects`). This
//! module walks the document byte-by-byte, positions itself at the array
//! named by a chain of object keys, and yields one decoded element at a time,
//! so memory stays bounded by the largest single element.
//!
//! Progress is reported as bytes consumed from the underlying stream, because
//! the element count is unknown until the array is exhausted.

use std::io::{BufReader, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed JSON: {0}")]
    Syntax(String),
}

pub struct JsonArrayStream<R: Read> {
    reader: BufReader<R>,
    peeked: Option<u8>,
    consumed: u64,
    buf: Vec<u8>,
    progress: Option<Arc<AtomicU64>>,
    in_array: bool,
    first: bool,
    done: bool,
}

impl<R: Read> JsonArrayStream<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            peeked: None,
            consumed: 0,
            buf: Vec::new(),
            progress: None,
            in_array: false,
            first: true,
            done: false,
        }
    }

    /// Mirror bytes-consumed into a shared counter after every element, for
    /// callers that poll ingestion progress from outside.
    pub fn with_progress(mut self, progress: Arc<AtomicU64>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Bytes pulled from the underlying stream so far. Monotonic.
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    fn next_byte(&mut self) -> Result<Option<u8>, StreamError> {
        if let Some(b) = self.peeked.take() {
            return Ok(Some(b));
        }
        let mut one = [0u8; 1];
        loop {
            match self.reader.read(&mut one) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.consumed += 1;
                    return Ok(Some(one[0]));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn peek_byte(&mut self) -> Result<Option<u8>, StreamError> {
        if self.peeked.is_none() {
            self.peeked = self.next_byte()?;
        }
        Ok(self.peeked)
    }

    fn skip_ws(&mut self) -> Result<(), StreamError> {
        while let Some(b) = self.peek_byte()? {
            if b.is_ascii_whitespace() {
                self.peeked = None;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn expect(&mut self, want: u8) -> Result<(), StreamError> {
        self.skip_ws()?;
        match self.next_byte()? {
            Some(b) if b == want => Ok(()),
            Some(b) => Err(StreamError::Syntax(format!(
                "expected '{}', found '{}'",
                want as char, b as char
            ))),
            None => Err(StreamError::Syntax(format!(
                "expected '{}', found end of input",
                want as char
            ))),
        }
    }

    /// Read one JSON string and decode its escapes.
    fn read_string(&mut self) -> Result<String, StreamError> {
        self.expect(b'"')?;
        let mut raw = vec![b'"'];
        let mut escape = false;
        loop {
            let b = self
                .next_byte()?
                .ok_or_else(|| StreamError::Syntax("unterminated string".into()))?;
            raw.push(b);
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                break;
            }
        }
        serde_json::from_slice(&raw).map_err(|e| StreamError::Syntax(e.to_string()))
    }

    /// Position the stream just inside the opening `[` of the array found at
    /// `path` (a chain of object keys; empty means the document root is the
    /// array). Values under non-matching keys are skipped without buffering.
    pub fn seek_to_array(&mut self, path: &[&str]) -> Result<(), StreamError> {
        for key in path {
            self.expect(b'{')?;
            loop {
                self.skip_ws()?;
                if self.peek_byte()? == Some(b'}') {
                    return Err(StreamError::Syntax(format!("key {key:?} not found")));
                }
                let k = self.read_string()?;
                self.expect(b':')?;
                if k == *key {
                    break;
                }
                self.read_value(false)?;
                self.skip_ws()?;
                match self.next_byte()? {
                    Some(b',') => continue,
                    Some(b'}') => {
                        return Err(StreamError::Syntax(format!("key {key:?} not found")))
                    }
                    Some(b) => {
                        return Err(StreamError::Syntax(format!(
                            "expected ',' or '}}', found '{}'",
                            b as char
                        )))
                    }
                    None => return Err(StreamError::Syntax("unterminated object".into())),
                }
            }
        }
        self.expect(b'[')?;
        self.in_array = true;
        self.first = true;
        Ok(())
    }

    /// Consume one JSON value. With `keep` set, its raw bytes accumulate in
    /// `self.buf`; otherwise the value is discarded as it streams past.
    fn read_value(&mut self, keep: bool) -> Result<(), StreamError> {
        self.skip_ws()?;
        if keep {
            self.buf.clear();
        }
        let first = self
            .peek_byte()?
            .ok_or_else(|| StreamError::Syntax("unexpected end of input".into()))?;
        match first {
            b'{' | b'[' => {
                let mut depth = 0usize;
                let mut in_string = false;
                let mut escape = false;
                loop {
                    let b = self
                        .next_byte()?
                        .ok_or_else(|| StreamError::Syntax("unterminated value".into()))?;
                    if keep {
                        self.buf.push(b);
                    }
                    if in_string {
                        if escape {
                            escape = false;
                        } else if b == b'\\' {
                            escape = true;
                        } else if b == b'"' {
                            in_string = false;
                        }
                    } else {
                        match b {
                            b'"' => in_string = true,
                            b'{' | b'[' => depth += 1,
                            b'}' | b']' => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            b'"' => {
                self.peeked = None;
                if keep {
                    self.buf.push(b'"');
                }
                let mut escape = false;
                loop {
                    let b = self
                        .next_byte()?
                        .ok_or_else(|| StreamError::Syntax("unterminated string".into()))?;
                    if keep {
                        self.buf.push(b);
                    }
                    if escape {
                        escape = false;
                    } else if b == b'\\' {
                        escape = true;
                    } else if b == b'"' {
                        break;
                    }
                }
            }
            _ => {
                // number / true / false / null: runs until a delimiter
                let mut any = false;
                while let Some(b) = self.peek_byte()? {
                    if b.is_ascii_whitespace() || matches!(b, b',' | b']' | b'}') {
                        break;
                    }
                    self.peeked = None;
                    if keep {
                        self.buf.push(b);
                    }
                    any = true;
                }
                if !any {
                    return Err(StreamError::Syntax("expected a value".into()));
                }
            }
        }
        Ok(())
    }

    /// Decode the next array element, or `None` once the closing `]` is
    /// reached. Arbitrary-precision decimals normalize to `f64` here; that
    /// conversion is lossy by design.
    pub fn next_element(&mut self) -> Result<Option<Value>, StreamError> {
        if !self.in_array {
            return Err(StreamError::Syntax(
                "next_element called before seek_to_array".into(),
            ));
        }
        if self.done {
            return Ok(None);
        }
        self.skip_ws()?;
        if self.first {
            self.first = false;
            if self.peek_byte()? == Some(b']') {
                self.peeked = None;
                self.done = true;
                self.publish();
                return Ok(None);
            }
        } else {
            match self.next_byte()? {
                Some(b',') => {}
                Some(b']') => {
                    self.done = true;
                    self.publish();
                    return Ok(None);
                }
                Some(b) => {
                    return Err(StreamError::Syntax(format!(
                        "expected ',' or ']', found '{}'",
                        b as char
                    )))
                }
                None => return Err(StreamError::Syntax("unterminated array".into())),
            }
        }
        self.read_value(true)?;
        self.publish();
        serde_json::from_slice(&self.buf)
            .map(Some)
            .map_err(|e| StreamError::Syntax(e.to_string()))
    }

    fn publish(&self) {
        if let Some(p) = &self.progress {
            p.store(self.consumed, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stream_of(doc: &str) -> JsonArrayStream<&[u8]> {
        JsonArrayStream::new(doc.as_bytes())
    }

    fn drain(doc: &str, path: &[&str]) -> Vec<Value> {
        let mut s = stream_of(doc);
        s.seek_to_array(path).unwrap();
        let mut out = Vec::new();
        while let Some(v) = s.next_element().unwrap() {
            out.push(v);
        }
        out
    }

    #[test]
    fn root_array_of_scalars() {
        let got = drain(r#"[1, 2.5, "x", null, true]"#, &[]);
        assert_eq!(got, vec![json!(1), json!(2.5), json!("x"), json!(null), json!(true)]);
    }

    #[test]
    fn nested_array_path_skips_other_keys() {
        let doc = r#"{"meta": {"n": 2}, "a": {"skip": [9, 9], "b": [{"v": 1}, {"v": 2}]}}"#;
        let got = drain(doc, &["a", "b"]);
        assert_eq!(got, vec![json!({"v": 1}), json!({"v": 2})]);
    }

    #[test]
    fn strings_containing_brackets_and_escapes_survive() {
        let doc = r#"{"items": [{"s": "a]}\"b"}, {"s": ",{["}]}"#;
        let got = drain(doc, &["items"]);
        assert_eq!(got[0], json!({"s": "a]}\"b"}));
        assert_eq!(got[1], json!({"s": ",{["}));
    }

    #[test]
    fn empty_array_yields_nothing() {
        assert!(drain(r#"{"locations": []}"#, &["locations"]).is_empty());
    }

    #[test]
    fn content_after_the_array_is_left_unread() {
        let doc = r#"{"items": [1, 2], "after": {"big": [3, 4]}}"#;
        let mut s = stream_of(doc);
        s.seek_to_array(&["items"]).unwrap();
        assert_eq!(s.next_element().unwrap(), Some(json!(1)));
        assert_eq!(s.next_element().unwrap(), Some(json!(2)));
        assert_eq!(s.next_element().unwrap(), None);
        assert!(s.bytes_consumed() < doc.len() as u64);
    }

    #[test]
    fn missing_key_is_a_syntax_error() {
        let mut s = stream_of(r#"{"a": 1}"#);
        assert!(matches!(
            s.seek_to_array(&["b"]),
            Err(StreamError::Syntax(_))
        ));
    }

    #[test]
    fn truncated_array_errors_after_the_last_whole_element() {
        let mut s = stream_of(r#"{"items": [{"v": 1}, {"v": 2}"#);
        s.seek_to_array(&["items"]).unwrap();
        assert_eq!(s.next_element().unwrap(), Some(json!({"v": 1})));
        assert_eq!(s.next_element().unwrap(), Some(json!({"v": 2})));
        assert!(s.next_element().is_err());
    }

    #[test]
    fn progress_counter_is_monotonic() {
        let doc = r#"{"items": [{"v": 1}, {"v": 2}, {"v": 3}]}"#;
        let counter = Arc::new(AtomicU64::new(0));
        let mut s = stream_of(doc).with_progress(counter.clone());
        s.seek_to_array(&["items"]).unwrap();
        let mut last = 0;
        while s.next_element().unwrap().is_some() {
            let now = counter.load(Ordering::Relaxed);
            assert!(now >= last);
            last = now;
        }
        assert!(counter.load(Ordering::Relaxed) >= last);
    }
}

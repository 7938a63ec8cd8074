// Output Parsers - convert captured stdout bytes into a typed result

use serde::de::DeserializeOwned;
use std::error::Error as StdError;
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

/// Parser failures
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("output is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("invalid output: {0}")]
    Invalid(String),

    #[error("parser panicked: {0}")]
    Panicked(String),
}

impl ParseError {
    /// Does this failure look like malformed output (syntax-level)?
    pub fn is_syntax(&self) -> bool {
        match self {
            ParseError::Json(e) => e.is_syntax() || e.is_eof(),
            ParseError::Utf8(_) => true,
            ParseError::Invalid(_) | ParseError::Panicked(_) => false,
        }
    }
}

/// Heuristic used to classify uncaught failures: walks the source chain
/// looking for a syntax-shaped parse error.
pub fn looks_like_syntax_error(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(parse) = e.downcast_ref::<ParseError>() {
            if parse.is_syntax() {
                return true;
            }
        }
        if let Some(json) = e.downcast_ref::<serde_json::Error>() {
            if json.is_syntax() || json.is_eof() {
                return true;
            }
        }
        if e.is::<std::str::Utf8Error>() || e.is::<std::string::FromUtf8Error>() {
            return true;
        }
        current = e.source();
    }
    false
}

/// Caller-supplied pure function `bytes -> R`
///
/// Implemented for closures `Fn(&[u8]) -> Result<R, ParseError>`.
pub trait OutputParser: Send + Sync + 'static {
    type Output: Send + 'static;

    fn parse(&self, buf: &[u8]) -> Result<Self::Output, ParseError>;
}

impl<F, R> OutputParser for F
where
    F: Fn(&[u8]) -> Result<R, ParseError> + Send + Sync + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn parse(&self, buf: &[u8]) -> Result<R, ParseError> {
        self(buf)
    }
}

/// Lossy UTF-8 text (never fails)
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextParser;

impl OutputParser for PlaintextParser {
    type Output = String;

    fn parse(&self, buf: &[u8]) -> Result<String, ParseError> {
        Ok(String::from_utf8_lossy(buf).into_owned())
    }
}

/// Whole stdout as one JSON document
pub struct JsonParser<T> {
    _target: PhantomData<fn() -> T>,
}

impl<T> JsonParser<T> {
    pub fn new() -> Self {
        Self {
            _target: PhantomData,
        }
    }
}

impl<T> Default for JsonParser<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonParser<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonParser<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonParser")
    }
}

impl<T> OutputParser for JsonParser<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn parse(&self, buf: &[u8]) -> Result<T, ParseError> {
        Ok(serde_json::from_slice(buf)?)
    }
}

/// JSON report preceded by free-form chatter
///
/// Package managers print install-script output before their `--json`
/// report. Everything before the first line starting with `{` is skipped.
pub struct NpmJsonParser<T> {
    inner: JsonParser<T>,
}

impl<T> NpmJsonParser<T> {
    pub fn new() -> Self {
        Self {
            inner: JsonParser::new(),
        }
    }

    /// Slice starting at the JSON report (whole buffer if no preamble)
    pub fn strip_preamble(buf: &[u8]) -> &[u8] {
        buf.windows(2)
            .position(|w| w == b"\n{")
            .map(|i| &buf[i + 1..])
            .unwrap_or(buf)
    }
}

impl<T> Default for NpmJsonParser<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for NpmJsonParser<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NpmJsonParser")
    }
}

impl<T> OutputParser for NpmJsonParser<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn parse(&self, buf: &[u8]) -> Result<T, ParseError> {
        self.inner.parse(Self::strip_preamble(buf))
    }
}

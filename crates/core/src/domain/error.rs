// SysExec Failure Taxonomy (flat, kind-tagged)

use std::error::Error as StdError;
use std::fmt;

/// Boxed underlying failure, used for chaining original errors
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Machine-distinguishable failure kind
///
/// Callers branch on the kind, never on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The OS could not start the process or provide its stream handles
    SpawnFailure,
    /// The watchdog killed the process after `read_timeout_ms` of silence
    KilledByTimeout { read_timeout_ms: u64 },
    /// The process ended via a signal the watchdog did not send
    KilledExternally { signal: Option<i32> },
    /// The output parser rejected otherwise well-formed output
    ParseFailure,
    /// The process completed but reported failure
    NonZeroExit { code: i32 },
    /// Failure raised by the body itself, not by the process lifecycle
    Uncaught { parser_suspected: bool },
}

impl ErrorKind {
    /// Stable kebab-case tag (log fields, CLI output)
    pub fn tag(&self) -> &'static str {
        match self {
            ErrorKind::SpawnFailure => "spawn-failure",
            ErrorKind::KilledByTimeout { .. } => "killed-by-timeout",
            ErrorKind::KilledExternally { .. } => "killed-externally",
            ErrorKind::ParseFailure => "parse-failure",
            ErrorKind::NonZeroExit { .. } => "nonzero-exit",
            ErrorKind::Uncaught { .. } => "uncaught",
        }
    }

    pub fn is_killed(&self) -> bool {
        matches!(
            self,
            ErrorKind::KilledByTimeout { .. } | ErrorKind::KilledExternally { .. }
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Everything a rejection carries besides its message
#[derive(Debug)]
pub struct ErrorDetails<D> {
    pub kind: ErrorKind,
    pub data: Option<D>,
    pub source: Option<BoxError>,
}

impl<D> ErrorDetails<D> {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            data: None,
            source: None,
        }
    }

    /// Attach a diagnostic payload (e.g. parsed output of a failed process)
    pub fn with_data(mut self, data: D) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach the original underlying failure
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Typed failure of a supervised run
///
/// `D` is the diagnostic payload type. For process runs it is the parser
/// output, so a `nonzero-exit` failure still hands the parsed output back.
pub struct SysExecError<D = ()> {
    kind: ErrorKind,
    message: String,
    data: Option<D>,
    source: Option<BoxError>,
}

impl<D> SysExecError<D> {
    pub fn new(message: impl Into<String>, details: ErrorDetails<D>) -> Self {
        Self {
            kind: details.kind,
            message: message.into(),
            data: details.data,
            source: details.source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Diagnostic payload, if the failure carries one
    pub fn data(&self) -> Option<&D> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<D> {
        self.data
    }

    /// Original underlying failure (parser error, io error, ...)
    pub fn original(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Transform the payload while keeping kind, message and source
    pub fn map_data<E>(self, f: impl FnOnce(D) -> E) -> SysExecError<E> {
        SysExecError {
            kind: self.kind,
            message: self.message,
            data: self.data.map(f),
            source: self.source,
        }
    }

    /// Drop the payload (e.g. to erase the parser output type)
    pub fn without_data(self) -> SysExecError<()> {
        self.map_data(|_| ())
    }
}

impl<D: fmt::Debug> fmt::Debug for SysExecError<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SysExecError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("data", &self.data)
            .field("source", &self.source)
            .finish()
    }
}

impl<D> fmt::Display for SysExecError<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl<D: fmt::Debug> StdError for SysExecError<D> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_distinct() {
        let kinds = [
            ErrorKind::SpawnFailure,
            ErrorKind::KilledByTimeout { read_timeout_ms: 10 },
            ErrorKind::KilledExternally { signal: Some(9) },
            ErrorKind::ParseFailure,
            ErrorKind::NonZeroExit { code: 2 },
            ErrorKind::Uncaught {
                parser_suspected: false,
            },
        ];

        let mut tags: Vec<&str> = kinds.iter().map(|k| k.tag()).collect();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), kinds.len());
    }

    #[test]
    fn test_display_includes_kind_and_message() {
        let err: SysExecError<()> = SysExecError::new(
            "spawned process returned non-success (2) exit code",
            ErrorDetails::new(ErrorKind::NonZeroExit { code: 2 }),
        );

        assert_eq!(
            err.to_string(),
            "nonzero-exit: spawned process returned non-success (2) exit code"
        );
    }

    #[test]
    fn test_source_chain_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: SysExecError<()> = SysExecError::new(
            "failed to spawn",
            ErrorDetails::new(ErrorKind::SpawnFailure).with_source(io),
        );

        let source = StdError::source(&err).expect("source should be kept");
        assert!(source.to_string().contains("no such file"));
        assert!(err.original().is_some());
    }

    #[test]
    fn test_map_data_keeps_kind() {
        let err = SysExecError::new(
            "failed",
            ErrorDetails::new(ErrorKind::NonZeroExit { code: 1 }).with_data(41),
        );

        let mapped = err.map_data(|n| n + 1);
        assert_eq!(mapped.kind(), ErrorKind::NonZeroExit { code: 1 });
        assert_eq!(mapped.data(), Some(&42));
        assert!(ErrorKind::KilledExternally { signal: None }.is_killed());
        assert!(!mapped.kind().is_killed());
    }
}

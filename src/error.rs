//! # Error Handling
//!
//! Every fallible operation in the crate returns [`EnsembleResult<T>`]. The
//! variants of [`EnsembleError`] map one-to-one onto the failure classes the
//! storage engine distinguishes:
//!
//! | Error Type | When It Occurs | Retry? |
//! |------------|----------------|--------|
//! | `UnknownKey` | Key not in a node schema | No, schema/config bug |
//! | `NotFound` | Blob absent in the backing store | Caller decides |
//! | `CorruptBuffer` | Malformed serialized bytes | No, fatal for that key |
//! | `Parse` | Stored text is not a number | No |
//! | `IncompleteEnsemble` | Matrix assembly missing a cell | No |
//! | `Load` | External record incomplete or mistyped | Resubmission |
//! | `Configuration` | Invalid schema, template or ensemble config | No |
//! | `Io` | Backend I/O other than not-found | Resubmission |
//! | `Generic` | Anything else | - |
//!
//! Driver errors ([`StoreError`](crate::store::StoreError)) convert
//! automatically, with a missing key becoming [`EnsembleError::NotFound`].

/// Error type for the ensemble storage engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsembleError {
    /// A key is not part of the node schema
    UnknownKey(String),

    /// No blob is stored under the requested key
    ///
    /// Legitimate for report steps that have not been written yet.
    NotFound(String),

    /// Serialized bytes do not match the node buffer format
    CorruptBuffer(String),

    /// A stored value is not a syntactically valid number
    Parse(String),

    /// A measurement matrix cell could not be filled
    IncompleteEnsemble(String),

    /// An external record could not populate a node
    Load(String),

    /// Invalid schema, path template or ensemble configuration
    Configuration(String),

    /// Backend I/O failure
    Io(String),

    /// General-purpose error
    Generic(String),
}

impl EnsembleError {
    /// Create a new unknown key error
    pub fn unknown_key<S: Into<String>>(key: S) -> Self {
        EnsembleError::UnknownKey(key.into())
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        EnsembleError::NotFound(msg.into())
    }

    /// Create a new corrupt buffer error
    pub fn corrupt_buffer<S: Into<String>>(msg: S) -> Self {
        EnsembleError::CorruptBuffer(msg.into())
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        EnsembleError::Parse(msg.into())
    }

    /// Create a new incomplete ensemble error
    pub fn incomplete_ensemble<S: Into<String>>(msg: S) -> Self {
        EnsembleError::IncompleteEnsemble(msg.into())
    }

    /// Create a new load error
    pub fn load<S: Into<String>>(msg: S) -> Self {
        EnsembleError::Load(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        EnsembleError::Configuration(msg.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(msg: S) -> Self {
        EnsembleError::Io(msg.into())
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        EnsembleError::Generic(msg.into())
    }

    /// Prefix the message with context, keeping the variant
    ///
    /// Used to attach realization / report step information to errors raised
    /// deep inside node code.
    pub fn context<S: AsRef<str>>(self, ctx: S) -> Self {
        let ctx = ctx.as_ref();
        match self {
            EnsembleError::UnknownKey(msg) => EnsembleError::UnknownKey(format!("{ctx}: {msg}")),
            EnsembleError::NotFound(msg) => EnsembleError::NotFound(format!("{ctx}: {msg}")),
            EnsembleError::CorruptBuffer(msg) => {
                EnsembleError::CorruptBuffer(format!("{ctx}: {msg}"))
            }
            EnsembleError::Parse(msg) => EnsembleError::Parse(format!("{ctx}: {msg}")),
            EnsembleError::IncompleteEnsemble(msg) => {
                EnsembleError::IncompleteEnsemble(format!("{ctx}: {msg}"))
            }
            EnsembleError::Load(msg) => EnsembleError::Load(format!("{ctx}: {msg}")),
            EnsembleError::Configuration(msg) => {
                EnsembleError::Configuration(format!("{ctx}: {msg}"))
            }
            EnsembleError::Io(msg) => EnsembleError::Io(format!("{ctx}: {msg}")),
            EnsembleError::Generic(msg) => EnsembleError::Generic(format!("{ctx}: {msg}")),
        }
    }

    /// Get the error message as a string slice
    pub fn message(&self) -> &str {
        match self {
            EnsembleError::UnknownKey(msg) => msg,
            EnsembleError::NotFound(msg) => msg,
            EnsembleError::CorruptBuffer(msg) => msg,
            EnsembleError::Parse(msg) => msg,
            EnsembleError::IncompleteEnsemble(msg) => msg,
            EnsembleError::Load(msg) => msg,
            EnsembleError::Configuration(msg) => msg,
            EnsembleError::Io(msg) => msg,
            EnsembleError::Generic(msg) => msg,
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            EnsembleError::UnknownKey(_) => "unknown_key",
            EnsembleError::NotFound(_) => "not_found",
            EnsembleError::CorruptBuffer(_) => "corrupt_buffer",
            EnsembleError::Parse(_) => "parse",
            EnsembleError::IncompleteEnsemble(_) => "incomplete_ensemble",
            EnsembleError::Load(_) => "load",
            EnsembleError::Configuration(_) => "configuration",
            EnsembleError::Io(_) => "io",
            EnsembleError::Generic(_) => "generic",
        }
    }
}

impl std::fmt::Display for EnsembleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnsembleError::UnknownKey(msg) => write!(f, "Unknown key: {msg}"),
            EnsembleError::NotFound(msg) => write!(f, "Not found: {msg}"),
            EnsembleError::CorruptBuffer(msg) => write!(f, "Corrupt buffer: {msg}"),
            EnsembleError::Parse(msg) => write!(f, "Parse error: {msg}"),
            EnsembleError::IncompleteEnsemble(msg) => write!(f, "Incomplete ensemble: {msg}"),
            EnsembleError::Load(msg) => write!(f, "Load error: {msg}"),
            EnsembleError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            EnsembleError::Io(msg) => write!(f, "IO error: {msg}"),
            EnsembleError::Generic(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for EnsembleError {}

impl From<&str> for EnsembleError {
    fn from(err: &str) -> Self {
        EnsembleError::Generic(err.to_string())
    }
}

impl From<String> for EnsembleError {
    fn from(err: String) -> Self {
        EnsembleError::Generic(err)
    }
}

impl From<std::io::Error> for EnsembleError {
    fn from(err: std::io::Error) -> Self {
        EnsembleError::io(err.to_string())
    }
}

impl From<crate::store::error::StoreError> for EnsembleError {
    fn from(err: crate::store::error::StoreError) -> Self {
        use crate::store::error::StoreError;
        match err {
            StoreError::KeyNotFound(msg) => EnsembleError::NotFound(msg),
            other => EnsembleError::io(other.to_string()),
        }
    }
}

/// Result alias used throughout the crate
pub type EnsembleResult<T> = Result<T, EnsembleError>;

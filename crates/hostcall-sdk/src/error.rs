//! Error types for the method proxy

use std::fmt;

use crate::host::HostException;
use crate::value::ScriptValue;

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Where in a call a value is being converted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// The `this` value
    Receiver,
    /// A formal parameter, by index
    Argument(usize),
    /// An element of the variadic tail, by script argument index
    Variadic(usize),
    /// The return value
    Return,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Receiver => write!(f, "receiver"),
            Position::Argument(i) => write!(f, "argument {}", i),
            Position::Variadic(i) => write!(f, "variadic argument {}", i),
            Position::Return => write!(f, "return value"),
        }
    }
}

/// Expected argument count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    /// Check a received argument count
    pub fn accepts(self, received: usize) -> bool {
        match self {
            Arity::Exactly(n) => received == n,
            Arity::AtLeast(n) => received >= n,
        }
    }

    /// "argument" or "arguments", agreeing with the expected count
    pub fn noun(self) -> &'static str {
        match self {
            Arity::Exactly(1) | Arity::AtLeast(1) => "argument",
            _ => "arguments",
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// Why a single value could not be converted
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionKind {
    /// Wrong kind of value
    #[error("got {got}")]
    TypeMismatch { got: String },

    /// Numeric value outside the target's domain
    #[error("{value} is out of range")]
    OutOfRange { value: String },

    /// Null or undefined where a primitive is required
    #[error("null is not allowed")]
    NullNotAllowed,

    /// A plain script value where a wrapped host object is required
    #[error("value is not a host object")]
    NotHostObject,

    /// The wrapper's host handle has already been released
    #[error("host object handle {0} has been released")]
    StaleHandle(u32),

    /// Host object is not an instance of the declared class
    #[error("got an instance of {actual}")]
    IncompatibleClass { actual: String },

    /// The host or script runtime refused an operation
    #[error("{0}")]
    Runtime(String),
}

/// A rejected argument, receiver or return value
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot convert {position} to {expected}: {kind}")]
pub struct ConversionError {
    pub position: Position,
    /// Declared type, rendered
    pub expected: String,
    pub kind: ConversionKind,
}

/// Proxy error taxonomy
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProxyError {
    /// A parameter or return type has no converter (construction time)
    #[error("Unsupported type {descriptor} for {position}")]
    UnsupportedType {
        position: Position,
        descriptor: String,
    },

    /// Malformed descriptor or unusable signature (construction time)
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// The host bridge does not know the method (construction time)
    #[error("No such method: {0}")]
    NoSuchMethod(String),

    /// Wrong number of arguments
    #[error("{method} expected {expected} {} but received {received}", .expected.noun())]
    Arity {
        method: String,
        expected: Arity,
        received: usize,
    },

    /// A converter rejected a value
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The host method raised an exception
    #[error("{0}")]
    HostInvocation(HostException),

    /// A call tried to enter a context mid-conversion
    #[error("Reentrant call rejected: {0}")]
    Reentrant(String),

    /// Host-to-script callbacks nested too deeply
    #[error("Call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),

    /// The context was closed before the call
    #[error("Context {0} is closed")]
    ContextClosed(u64),
}

impl ProxyError {
    /// Name of the script error class raised for this error
    pub fn script_error_name(&self) -> &str {
        match self {
            ProxyError::HostInvocation(exception) => &exception.class,
            ProxyError::Reentrant(_)
            | ProxyError::CallDepthExceeded(_)
            | ProxyError::ContextClosed(_) => "InternalError",
            _ => "TypeError",
        }
    }
}

/// The single script-level error surfaced by a failed call.
///
/// Carries both the typed cause and the error value already constructed in
/// the script runtime, so the caller can rethrow it into the script.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct ScriptError {
    pub error: ProxyError,
    /// Script-side error object
    pub value: ScriptValue,
}

impl ScriptError {
    /// The typed cause
    pub fn cause(&self) -> &ProxyError {
        &self.error
    }
}

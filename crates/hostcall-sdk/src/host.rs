//! Host value model
//!
//! Values of the statically-typed host runtime as they cross the proxy:
//! unboxed primitives inline, everything else (strings, arrays, boxed
//! primitives, object instances) behind an opaque [`HostRef`].

use std::fmt;
use std::num::NonZeroU64;

/// Opaque reference to a host-side value.
///
/// A reference is either a local temporary (released at the end of the call
/// that created it) or pinned (kept alive until explicitly released).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostRef(NonZeroU64);

impl HostRef {
    /// Create from a raw id; `None` for zero.
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Raw id
    pub const fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl From<NonZeroU64> for HostRef {
    fn from(id: NonZeroU64) -> Self {
        Self(id)
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostRef({})", self.0)
    }
}

/// Id of a pinned host object in a context's handle table.
///
/// This is what a script-side wrapper stores instead of a host pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostHandle(pub u32);

/// A host-runtime value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostValue {
    /// Return value of a void method
    Void,
    /// The null reference
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Char(u16),
    Float(f32),
    Double(f64),
    /// String, array, boxed primitive or object instance
    Ref(HostRef),
}

impl HostValue {
    /// Host-side type name for diagnostics
    pub const fn type_name(&self) -> &'static str {
        match self {
            HostValue::Void => "void",
            HostValue::Null => "null",
            HostValue::Boolean(_) => "boolean",
            HostValue::Byte(_) => "byte",
            HostValue::Short(_) => "short",
            HostValue::Int(_) => "int",
            HostValue::Long(_) => "long",
            HostValue::Char(_) => "char",
            HostValue::Float(_) => "float",
            HostValue::Double(_) => "double",
            HostValue::Ref(_) => "reference",
        }
    }

    /// Extract the reference, if any
    pub const fn as_host_ref(&self) -> Option<HostRef> {
        match self {
            HostValue::Ref(r) => Some(*r),
            _ => None,
        }
    }

    /// Check for the null reference
    pub const fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }
}

/// One frame of a host exception's stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub class: String,
    pub method: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}.{}", self.class, self.method)?;
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, " ({}:{})", file, line),
            (Some(file), None) => write!(f, " ({})", file),
            _ => Ok(()),
        }
    }
}

/// An exception raised by a host method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostException {
    /// Fully qualified exception class name
    pub class: String,
    pub message: String,
    pub stack: Vec<StackFrame>,
}

impl HostException {
    /// Create an exception without a stack trace
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            stack: Vec::new(),
        }
    }

    /// Append a stack frame
    pub fn with_frame(mut self, frame: StackFrame) -> Self {
        self.stack.push(frame);
        self
    }

    /// Render the stack as newline-separated `at ...` lines
    pub fn stack_trace(&self) -> String {
        self.stack
            .iter()
            .map(|frame| frame.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for HostException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}

impl std::error::Error for HostException {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_ref_rejects_zero() {
        assert!(HostRef::new(0).is_none());
        assert_eq!(HostRef::new(9).map(HostRef::as_u64), Some(9));
    }

    #[test]
    fn test_exception_display_and_stack() {
        let exception = HostException::new("java.lang.IllegalStateException", "boom")
            .with_frame(StackFrame {
                class: "com.example.Greeter".to_string(),
                method: "greet".to_string(),
                file: Some("Greeter.java".to_string()),
                line: Some(12),
            })
            .with_frame(StackFrame {
                class: "com.example.Main".to_string(),
                method: "run".to_string(),
                file: None,
                line: None,
            });
        assert_eq!(exception.to_string(), "java.lang.IllegalStateException: boom");
        assert_eq!(
            exception.stack_trace(),
            "at com.example.Greeter.greet (Greeter.java:12)\nat com.example.Main.run"
        );
    }
}

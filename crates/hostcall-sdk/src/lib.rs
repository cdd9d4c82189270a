//! hostcall SDK - value models shared by the proxy and its embedders
//!
//! This crate holds the types both sides of the proxy agree on without
//! depending on the proxy core:
//!
//! - [`ScriptValue`]: the script engine's NaN-boxed value
//! - [`HostValue`], [`HostRef`], [`HostException`]: the host runtime's values
//! - [`TypeDescriptor`], [`MethodSignature`]: declared host types, parsed
//!   from JVM-style method descriptors
//! - [`ProxyError`], [`ScriptError`]: the error taxonomy
//!
//! # Example
//!
//! ```ignore
//! use hostcall_sdk::{MethodSignature, TypeDescriptor};
//!
//! let sig = MethodSignature::parse("com/example/Greeter", "greet", "(Ljava/lang/String;)Ljava/lang/String;")?;
//! assert_eq!(sig.parameters, vec![TypeDescriptor::String]);
//! ```

pub mod descriptor;
pub mod error;
pub mod host;
pub mod value;

pub use descriptor::{MethodSignature, PrimitiveType, TypeDescriptor, STRING_CLASS};
pub use error::{
    Arity, ConversionError, ConversionKind, Position, ProxyError, ProxyResult, ScriptError,
};
pub use host::{HostException, HostHandle, HostRef, HostValue, StackFrame};
pub use value::ScriptValue;

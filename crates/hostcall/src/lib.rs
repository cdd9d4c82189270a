//! hostcall - cross-runtime method proxy
//!
//! Lets a dynamically typed script engine call methods of a statically
//! typed, reflective host runtime:
//!
//! - [`MethodProxy`]: built once per host method; `call` converts the script
//!   `this` and arguments, invokes the host method, and converts the result
//! - [`Context`]: owns both runtimes and every cross-runtime resource a call
//!   creates (frame temporaries, pinned host objects)
//! - [`convert`]: the converter registry, resolved at proxy construction
//! - [`ScriptRuntime`] / [`HostBridge`]: the collaborator seams
//! - [`ScriptHeap`] / [`ReflectHost`]: in-process implementations of both
//!
//! # Example
//!
//! ```ignore
//! use hostcall::{Context, MethodProxy, ReflectHost, ScriptHeap};
//! use hostcall_sdk::{HostValue, MethodSignature, ScriptValue};
//!
//! let host = ReflectHost::new();
//! let sig = MethodSignature::parse("com/example/Math", "add", "(II)I")?.with_static(true);
//! host.define_method(&sig, |_ctx, _this, args| match args {
//!     [HostValue::Int(a), HostValue::Int(b)] => Ok(HostValue::Int(a + b)),
//!     _ => unreachable!(),
//! });
//!
//! let ctx = Context::new(ScriptHeap::new(), host);
//! let add = MethodProxy::lookup(&ctx, &sig)?;
//! let sum = add.call(&ctx, ScriptValue::undefined(), &[ScriptValue::int(2), ScriptValue::int(3)])?;
//! assert_eq!(sum, ScriptValue::int(5));
//! ```

pub mod context;
pub mod convert;
pub mod heap;
pub mod proxy;
pub mod reflect;
pub mod runtime;

pub use context::{CallFrame, Context, ContextId, ContextOptions, Phase};
pub use convert::{Converter, ConverterRegistry, TypeCategory};
pub use heap::{ErrorInfo, HeapStats, ScriptHeap};
pub use proxy::MethodProxy;
pub use reflect::{HostMethodFn, HostStats, ReflectHost, OBJECT_CLASS};
pub use runtime::{HostBridge, MethodHandle, ScriptKind, ScriptRuntime};

pub use hostcall_sdk::{
    Arity, ConversionError, ConversionKind, HostException, HostHandle, HostRef, HostValue,
    MethodSignature, Position, PrimitiveType, ProxyError, ProxyResult, ScriptError, ScriptValue,
    StackFrame, TypeDescriptor,
};

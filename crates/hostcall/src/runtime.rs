//! Collaborator traits for the script engine and the host runtime
//!
//! The proxy never reaches into either runtime directly. Embedders implement
//! [`ScriptRuntime`] over their script engine and [`HostBridge`] over their
//! host reflection layer; [`crate::Context`] owns one of each.

use std::sync::Arc;

use hostcall_sdk::{
    HostException, HostHandle, HostRef, HostValue, MethodSignature, PrimitiveType, ScriptValue,
    TypeDescriptor,
};

use crate::context::Context;

/// Type tag of a script value as reported by the script runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    Undefined,
    Null,
    Bool,
    Int,
    Float,
    String,
    Array,
    Object,
    /// Script wrapper around a pinned host object
    HostObject,
    Error,
}

impl ScriptKind {
    /// Kind name for diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            ScriptKind::Undefined => "undefined",
            ScriptKind::Null => "null",
            ScriptKind::Bool => "boolean",
            ScriptKind::Int => "int",
            ScriptKind::Float => "float",
            ScriptKind::String => "string",
            ScriptKind::Array => "array",
            ScriptKind::Object => "object",
            ScriptKind::HostObject => "host object",
            ScriptKind::Error => "error",
        }
    }
}

/// Script engine primitives used by the proxy.
///
/// Immediate values (numbers, booleans, null, undefined) are encoded in
/// [`ScriptValue`] itself; everything else is a heap slot the runtime owns.
pub trait ScriptRuntime: Send {
    /// Inspect a value's type tag
    fn kind(&self, value: ScriptValue) -> ScriptKind;

    /// The canonical "no value" marker
    fn undefined(&self) -> ScriptValue {
        ScriptValue::undefined()
    }

    /// Allocate a new string
    fn create_string(&self, s: &str) -> ScriptValue;

    /// Read a string value. The returned buffer is shared with the script
    /// heap; callers copy out of it.
    fn read_string(&self, value: ScriptValue) -> Option<Arc<str>>;

    /// Allocate a new array
    fn create_array(&self, items: &[ScriptValue]) -> ScriptValue;

    /// Array length, `None` if not an array
    fn array_len(&self, value: ScriptValue) -> Option<usize>;

    /// Array element, `None` if not an array or out of bounds
    fn array_get(&self, value: ScriptValue, index: usize) -> Option<ScriptValue>;

    /// Create a wrapper for a pinned host object
    fn wrap_host(&self, handle: HostHandle) -> ScriptValue;

    /// Handle stored in a host object wrapper, `None` for other values
    fn unwrap_host(&self, value: ScriptValue) -> Option<HostHandle>;

    /// Construct an error object to be thrown into the script
    fn create_error(&self, name: &str, message: &str, stack: Option<&str>) -> ScriptValue;
}

/// Opaque, pre-resolved reference to a host method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodHandle(pub u64);

/// Host runtime primitives used by the proxy.
///
/// Every method that produces a [`HostRef`] hands the caller a new reference
/// that must be given back through [`HostBridge::release`] exactly once.
pub trait HostBridge: Send {
    /// Resolve a method handle for a signature
    fn method_handle(&self, signature: &MethodSignature) -> Option<MethodHandle>;

    /// Invoke a method synchronously.
    ///
    /// `ctx` is the context driving the call; the host may use it to call
    /// back into the script while the invocation is in flight.
    fn invoke(
        &self,
        ctx: &Context,
        method: MethodHandle,
        receiver: Option<HostRef>,
        args: &[HostValue],
    ) -> Result<HostValue, HostException>;

    /// Create a host string (copying `s`)
    fn new_string(&self, s: &str) -> Result<HostRef, HostException>;

    /// Copy a host string out
    fn read_string(&self, string: HostRef) -> Result<String, HostException>;

    /// Create a host array of `component` holding `items`
    fn new_array(
        &self,
        component: &TypeDescriptor,
        items: &[HostValue],
    ) -> Result<HostRef, HostException>;

    /// Read all elements of a host array
    fn array_elements(&self, array: HostRef) -> Result<Vec<HostValue>, HostException>;

    /// Box an unboxed primitive
    fn box_value(&self, value: HostValue) -> Result<HostRef, HostException>;

    /// Unbox a boxed primitive of the given type
    fn unbox_value(
        &self,
        boxed: HostRef,
        primitive: PrimitiveType,
    ) -> Result<HostValue, HostException>;

    /// Class name of the referenced value
    fn class_name(&self, value: HostRef) -> Result<String, HostException>;

    /// Whether the referenced value is assignable to `class`
    fn is_instance_of(&self, value: HostRef, class: &str) -> bool;

    /// Create a pinned reference that outlives the current call
    fn pin(&self, value: HostRef) -> Result<HostRef, HostException>;

    /// Give a reference back
    fn release(&self, value: HostRef);
}

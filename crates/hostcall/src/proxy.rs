//! Method proxy
//!
//! A [`MethodProxy`] is built once per resolved host method. Construction
//! resolves one converter per declared parameter (the variadic tail gets an
//! element converter instead) and one for the return type; any type without
//! a converter fails construction, so a proxy that exists can always
//! marshal its signature.
//!
//! `call` then runs the fixed sequence: arity check, argument conversion,
//! tail packing, receiver resolution, host invocation, result conversion.
//! All host temporaries live in one call frame and are released when the
//! call returns, on every path.

use std::fmt;

use tracing::{debug, trace};

use hostcall_sdk::{
    Arity, ConversionError, ConversionKind, HostRef, MethodSignature, Position, ProxyError,
    ProxyResult, ScriptError, ScriptValue, TypeDescriptor,
};

use crate::context::Context;
use crate::convert::{Converter, ConverterRegistry};
use crate::runtime::MethodHandle;

/// Packs trailing script arguments into one host array
#[derive(Debug, Clone)]
struct VariadicTail {
    /// Declared type of the last parameter (an array)
    descriptor: TypeDescriptor,
    component: TypeDescriptor,
    element: Converter,
}

/// Invokes one host method with script arguments
#[derive(Clone)]
pub struct MethodProxy {
    name: String,
    declaring_class: String,
    handle: MethodHandle,
    is_static: bool,
    argument_converters: Vec<Converter>,
    variadic: Option<VariadicTail>,
    result_converter: Converter,
}

impl MethodProxy {
    /// Build a proxy with the standard converters
    pub fn new(handle: MethodHandle, signature: &MethodSignature) -> ProxyResult<Self> {
        Self::with_registry(handle, signature, ConverterRegistry::standard())
    }

    /// Build a proxy resolving converters from `registry`
    pub fn with_registry(
        handle: MethodHandle,
        signature: &MethodSignature,
        registry: &ConverterRegistry,
    ) -> ProxyResult<Self> {
        signature.validate()?;

        let fixed = if signature.is_variadic {
            signature.parameters.len() - 1
        } else {
            signature.parameters.len()
        };
        let argument_converters = signature.parameters[..fixed]
            .iter()
            .enumerate()
            .map(|(i, descriptor)| registry.resolve(descriptor, Position::Argument(i)))
            .collect::<ProxyResult<Vec<_>>>()?;

        let variadic = match signature.parameters.get(fixed) {
            Some(descriptor) if signature.is_variadic => {
                let position = Position::Argument(fixed);
                let unsupported = || ProxyError::UnsupportedType {
                    position,
                    descriptor: descriptor.to_string(),
                };
                let component = descriptor.component().ok_or_else(unsupported)?.clone();
                let element = registry
                    .resolve(&component, position)
                    .map_err(|_| unsupported())?;
                Some(VariadicTail {
                    descriptor: descriptor.clone(),
                    component,
                    element,
                })
            }
            _ => None,
        };

        let result_converter = registry.resolve_return(&signature.return_type)?;

        debug!(
            method = %signature,
            handle = handle.0,
            parameters = signature.parameters.len(),
            variadic = signature.is_variadic,
            "method proxy built"
        );

        Ok(Self {
            name: signature.name.clone(),
            declaring_class: signature.declaring_class.clone(),
            handle,
            is_static: signature.is_static,
            argument_converters,
            variadic,
            result_converter,
        })
    }

    /// Look up `signature` on the context's host and build a proxy for it
    pub fn lookup(ctx: &Context, signature: &MethodSignature) -> ProxyResult<Self> {
        signature.validate()?;
        let handle = ctx
            .host()
            .method_handle(signature)
            .ok_or_else(|| ProxyError::NoSuchMethod(signature.to_string()))?;
        Self::new(handle, signature)
    }

    /// Parse a method descriptor, look it up and build an instance-method
    /// proxy
    pub fn resolve(
        ctx: &Context,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> ProxyResult<Self> {
        let signature = MethodSignature::parse(class, name, descriptor)?;
        Self::lookup(ctx, &signature)
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaring class, dotted
    pub fn declaring_class(&self) -> &str {
        &self.declaring_class
    }

    /// The host method handle
    pub fn handle(&self) -> MethodHandle {
        self.handle
    }

    /// Whether the method ignores `this`
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Whether trailing arguments are packed into the last parameter
    pub fn is_variadic(&self) -> bool {
        self.variadic.is_some()
    }

    /// Number of declared parameters, counting the variadic tail as one
    pub fn parameter_count(&self) -> usize {
        self.argument_converters.len() + usize::from(self.variadic.is_some())
    }

    /// Accepted script argument count
    pub fn arity(&self) -> Arity {
        if self.variadic.is_some() {
            Arity::AtLeast(self.argument_converters.len())
        } else {
            Arity::Exactly(self.argument_converters.len())
        }
    }

    /// Invoke the host method.
    ///
    /// A failed call produces exactly one [`ScriptError`], whose `value` is
    /// ready to be thrown into the script.
    pub fn call(
        &self,
        ctx: &Context,
        this: ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        trace!(
            context = ctx.id().as_u64(),
            class = %self.declaring_class,
            method = %self.name,
            args = args.len(),
            "call"
        );
        self.call_inner(ctx, this, args).map_err(|error| {
            debug!(
                context = ctx.id().as_u64(),
                class = %self.declaring_class,
                method = %self.name,
                %error,
                "call failed"
            );
            ctx.raise(error)
        })
    }

    fn call_inner(
        &self,
        ctx: &Context,
        this: ScriptValue,
        args: &[ScriptValue],
    ) -> ProxyResult<ScriptValue> {
        let arity = self.arity();
        if !arity.accepts(args.len()) {
            return Err(ProxyError::Arity {
                method: self.name.clone(),
                expected: arity,
                received: args.len(),
            });
        }

        let frame = ctx.enter_frame()?;

        let fixed = self.argument_converters.len();
        let mut host_args = Vec::with_capacity(self.parameter_count());
        for (i, (converter, value)) in self.argument_converters.iter().zip(args).enumerate() {
            host_args.push(converter.to_host(ctx, *value, Position::Argument(i))?);
        }

        if let Some(tail) = &self.variadic {
            let items = args[fixed..]
                .iter()
                .enumerate()
                .map(|(i, value)| tail.element.to_host(ctx, *value, Position::Variadic(fixed + i)))
                .collect::<Result<Vec<_>, _>>()?;
            let packed = ctx
                .new_host_array(&tail.component, &items)
                .map_err(|kind| ConversionError {
                    position: Position::Argument(fixed),
                    expected: tail.descriptor.to_string(),
                    kind,
                })?;
            host_args.push(packed);
        }

        let receiver = if self.is_static {
            None
        } else {
            Some(self.receiver(ctx, this)?)
        };

        let result = ctx
            .invoke(&frame, self.handle, receiver, &host_args)
            .map_err(ProxyError::HostInvocation)?;

        let value = self
            .result_converter
            .to_script(ctx, result, Position::Return)?;
        Ok(value)
    }

    /// Resolve `this` to a host instance of the declaring class
    fn receiver(&self, ctx: &Context, this: ScriptValue) -> Result<HostRef, ConversionError> {
        let error = |kind: ConversionKind| ConversionError {
            position: Position::Receiver,
            expected: self.declaring_class.clone(),
            kind,
        };
        let object = ctx.resolve_host_object(this).map_err(error)?;
        if !ctx.host().is_instance_of(object, &self.declaring_class) {
            let actual = ctx
                .host()
                .class_name(object)
                .map_err(|e| error(ConversionKind::Runtime(e.to_string())))?;
            return Err(error(ConversionKind::IncompatibleClass { actual }));
        }
        Ok(object)
    }
}

impl fmt::Display for MethodProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodProxy{{name={}, arity={}}}", self.name, self.arity())
    }
}

impl fmt::Debug for MethodProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostcall_sdk::{HostValue, PrimitiveType};

    use crate::heap::ScriptHeap;
    use crate::reflect::ReflectHost;

    fn signature(descriptor: &str) -> MethodSignature {
        MethodSignature::parse("com/example/Calc", "op", descriptor).unwrap()
    }

    #[test]
    fn test_arity_and_display() {
        let proxy = MethodProxy::new(MethodHandle(1), &signature("(II)I")).unwrap();
        assert_eq!(proxy.arity(), Arity::Exactly(2));
        assert!(!proxy.is_variadic());
        assert_eq!(proxy.to_string(), "MethodProxy{name=op, arity=2}");
        assert_eq!(format!("{:?}", proxy), "MethodProxy{name=op, arity=2}");

        let sig = signature("(I[Ljava/lang/Object;)V").with_variadic(true);
        let proxy = MethodProxy::new(MethodHandle(2), &sig).unwrap();
        assert_eq!(proxy.arity(), Arity::AtLeast(1));
        assert_eq!(proxy.parameter_count(), 2);
        assert_eq!(proxy.to_string(), "MethodProxy{name=op, arity=at least 1}");
    }

    #[test]
    fn test_unsupported_parameter_fails_construction() {
        let err = MethodProxy::new(MethodHandle(1), &signature("(IC)V")).unwrap_err();
        assert_eq!(
            err,
            ProxyError::UnsupportedType {
                position: Position::Argument(1),
                descriptor: "char".to_string(),
            }
        );

        let err = MethodProxy::new(MethodHandle(1), &signature("()C")).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::UnsupportedType {
                position: Position::Return,
                ..
            }
        ));
    }

    #[test]
    fn test_unsupported_variadic_component() {
        let sig = signature("([C)V").with_variadic(true);
        let err = MethodProxy::new(MethodHandle(1), &sig).unwrap_err();
        assert_eq!(
            err,
            ProxyError::UnsupportedType {
                position: Position::Argument(0),
                descriptor: "char[]".to_string(),
            }
        );
    }

    #[test]
    fn test_variadic_requires_trailing_array() {
        let sig = signature("(I)V").with_variadic(true);
        assert!(matches!(
            MethodProxy::new(MethodHandle(1), &sig),
            Err(ProxyError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_lookup_unknown_method() {
        let ctx = Context::new(ScriptHeap::new(), ReflectHost::new());
        let err = MethodProxy::resolve(&ctx, "com/example/Calc", "missing", "()V").unwrap_err();
        assert!(matches!(err, ProxyError::NoSuchMethod(_)));
    }

    #[test]
    fn test_arity_checked_before_frame() {
        let heap = ScriptHeap::new();
        let host = ReflectHost::new();
        let sig = signature("(I)I").with_static(true);
        let handle = host.define_method(&sig, |_ctx, _this, args| Ok(args[0]));
        let ctx = Context::new(heap.clone(), host.clone());
        let proxy = MethodProxy::new(handle, &sig).unwrap();

        // A frame mid-conversion would reject entry; arity fails first
        let frame = ctx.enter_frame().unwrap();
        let err = proxy.call(&ctx, ScriptValue::undefined(), &[]).unwrap_err();
        assert!(matches!(err.cause(), ProxyError::Arity { received: 0, .. }));
        let err = proxy
            .call(&ctx, ScriptValue::undefined(), &[ScriptValue::int(1)])
            .unwrap_err();
        assert!(matches!(err.cause(), ProxyError::Reentrant(_)));
        drop(frame);

        let value = proxy
            .call(&ctx, ScriptValue::undefined(), &[ScriptValue::int(4)])
            .unwrap();
        assert_eq!(value, ScriptValue::int(4));
        assert_eq!(host.stats().invocations, 1);
    }

    #[test]
    fn test_boxed_return() {
        let heap = ScriptHeap::new();
        let host = ReflectHost::new();
        let sig = signature("(Z)Ljava/lang/Double;").with_static(true);
        let handle = host.define_method(&sig, |ctx, _this, args| match args {
            [HostValue::Boolean(true)] => {
                let boxed = ctx.host().box_value(HostValue::Double(2.5))?;
                ctx.track(boxed);
                Ok(HostValue::Ref(boxed))
            }
            _ => Ok(HostValue::Null),
        });
        let ctx = Context::new(heap, host.clone());
        let proxy = MethodProxy::new(handle, &sig).unwrap();
        let before = host.live_refs();

        let value = proxy
            .call(&ctx, ScriptValue::null(), &[ScriptValue::bool(true)])
            .unwrap();
        assert_eq!(value, ScriptValue::float(2.5));
        let value = proxy
            .call(&ctx, ScriptValue::null(), &[ScriptValue::bool(false)])
            .unwrap();
        assert!(value.is_null());
        assert_eq!(host.live_refs(), before);
        assert_eq!(
            proxy.result_converter.descriptor(),
            &TypeDescriptor::Boxed(PrimitiveType::Double)
        );
    }
}

//! Value converters and the converter registry
//!
//! A converter is a pair of stateless functions for one declared host type:
//! script → host for arguments, host → script for results. Converters are
//! selected once, when a proxy is built, by resolving each declared
//! [`TypeDescriptor`] against a [`ConverterRegistry`]. After resolution a
//! call is a direct invocation of stored closures; no descriptor is
//! inspected on the call path.
//!
//! Leaf categories (primitives, their boxed forms, strings) live in the
//! registry table. Arrays and object references are composed on top of it.

mod primitive;
mod reference;
mod text;

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use hostcall_sdk::{
    ConversionError, ConversionKind, HostValue, Position, PrimitiveType, ProxyError, ProxyResult,
    ScriptValue, TypeDescriptor,
};

use crate::context::Context;

/// Script → host conversion function
pub type ToHostFn =
    Arc<dyn Fn(&Context, ScriptValue) -> Result<HostValue, ConversionKind> + Send + Sync>;

/// Host → script conversion function
pub type ToScriptFn =
    Arc<dyn Fn(&Context, HostValue) -> Result<ScriptValue, ConversionKind> + Send + Sync>;

/// Type mismatch error describing a host value
pub(crate) fn host_mismatch(value: HostValue) -> ConversionKind {
    ConversionKind::TypeMismatch {
        got: value.type_name().to_string(),
    }
}

/// Registry key for leaf converters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Primitive(PrimitiveType),
    Boxed(PrimitiveType),
    String,
}

impl TypeCategory {
    /// Leaf category of a descriptor, if it has one
    pub fn of(descriptor: &TypeDescriptor) -> Option<Self> {
        match descriptor {
            TypeDescriptor::Primitive(p) => Some(TypeCategory::Primitive(*p)),
            TypeDescriptor::Boxed(p) => Some(TypeCategory::Boxed(*p)),
            TypeDescriptor::String => Some(TypeCategory::String),
            _ => None,
        }
    }
}

/// A resolved converter for one declared type
#[derive(Clone)]
pub struct Converter {
    descriptor: TypeDescriptor,
    to_host: ToHostFn,
    to_script: ToScriptFn,
}

impl Converter {
    /// Build from a function pair
    pub fn new(descriptor: TypeDescriptor, to_host: ToHostFn, to_script: ToScriptFn) -> Self {
        Self {
            descriptor,
            to_host,
            to_script,
        }
    }

    /// Converter for a void return: yields the script "no value" marker
    pub fn void() -> Self {
        Self {
            descriptor: TypeDescriptor::Void,
            to_host: Arc::new(
                |ctx: &Context, value: ScriptValue| -> Result<HostValue, ConversionKind> {
                    Err(ctx.mismatch(value))
                },
            ),
            to_script: Arc::new(
                |ctx: &Context, _: HostValue| -> Result<ScriptValue, ConversionKind> {
                    Ok(ctx.script().undefined())
                },
            ),
        }
    }

    /// The declared type
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Convert a script value, reporting failures at `position`
    pub fn to_host(
        &self,
        ctx: &Context,
        value: ScriptValue,
        position: Position,
    ) -> Result<HostValue, ConversionError> {
        (self.to_host)(ctx, value).map_err(|kind| self.error(position, kind))
    }

    /// Convert a host value, reporting failures at `position`
    pub fn to_script(
        &self,
        ctx: &Context,
        value: HostValue,
        position: Position,
    ) -> Result<ScriptValue, ConversionError> {
        (self.to_script)(ctx, value).map_err(|kind| self.error(position, kind))
    }

    /// Convert without position information (used inside composites)
    pub fn convert_to_host(
        &self,
        ctx: &Context,
        value: ScriptValue,
    ) -> Result<HostValue, ConversionKind> {
        (self.to_host)(ctx, value)
    }

    /// Convert without position information (used inside composites)
    pub fn convert_to_script(
        &self,
        ctx: &Context,
        value: HostValue,
    ) -> Result<ScriptValue, ConversionKind> {
        (self.to_script)(ctx, value)
    }

    fn error(&self, position: Position, kind: ConversionKind) -> ConversionError {
        ConversionError {
            position,
            expected: self.descriptor.to_string(),
            kind,
        }
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Converter").field(&self.descriptor).finish()
    }
}

/// Table of leaf converters keyed by [`TypeCategory`]
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    leaves: FxHashMap<TypeCategory, (ToHostFn, ToScriptFn)>,
}

static STANDARD: Lazy<ConverterRegistry> = Lazy::new(ConverterRegistry::build_standard);

impl ConverterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry of built-in converters
    pub fn standard() -> &'static ConverterRegistry {
        &STANDARD
    }

    fn build_standard() -> Self {
        let mut registry = Self::new();
        for (primitive, to_host, to_script) in primitive::leaves() {
            registry.register(
                TypeCategory::Boxed(primitive),
                primitive::boxed_to_host(to_host.clone()),
                primitive::boxed_to_script(primitive, to_script.clone()),
            );
            registry.register(TypeCategory::Primitive(primitive), to_host, to_script);
        }
        registry.register(
            TypeCategory::String,
            Arc::new(text::string_to_host),
            Arc::new(text::string_to_script),
        );
        registry
    }

    /// Register (or replace) a leaf converter pair
    pub fn register(&mut self, category: TypeCategory, to_host: ToHostFn, to_script: ToScriptFn) {
        self.leaves.insert(category, (to_host, to_script));
    }

    /// Check if a leaf category is registered
    pub fn contains(&self, category: TypeCategory) -> bool {
        self.leaves.contains_key(&category)
    }

    /// Number of registered leaf categories
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Resolve the converter for a parameter (or array element) type
    pub fn resolve(
        &self,
        descriptor: &TypeDescriptor,
        position: Position,
    ) -> ProxyResult<Converter> {
        let unsupported = || ProxyError::UnsupportedType {
            position,
            descriptor: descriptor.to_string(),
        };
        match descriptor {
            TypeDescriptor::Array(component) => {
                let element = self.resolve(component, position).map_err(|_| unsupported())?;
                Ok(reference::array(descriptor.clone(), element))
            }
            TypeDescriptor::Object(class) => Ok(reference::object(class.clone())),
            TypeDescriptor::Void | TypeDescriptor::Opaque(_) => Err(unsupported()),
            _ => {
                let category = TypeCategory::of(descriptor).ok_or_else(unsupported)?;
                let (to_host, to_script) = self.leaves.get(&category).ok_or_else(unsupported)?;
                Ok(Converter::new(descriptor.clone(), to_host.clone(), to_script.clone()))
            }
        }
    }

    /// Resolve the converter for a return type; `void` is allowed
    pub fn resolve_return(&self, descriptor: &TypeDescriptor) -> ProxyResult<Converter> {
        match descriptor {
            TypeDescriptor::Void => Ok(Converter::void()),
            _ => self.resolve(descriptor, Position::Return),
        }
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("count", &self.leaves.len())
            .finish()
    }
}

//! Array and object reference converters
//!
//! These are composed at resolution time rather than stored in the
//! registry: an array converter closes over its element converter, an
//! object converter over its declared class.

use std::sync::Arc;

use hostcall_sdk::{ConversionKind, HostValue, ScriptValue, TypeDescriptor};

use super::{host_mismatch, Converter};
use crate::context::Context;
use crate::runtime::ScriptKind;

/// Converter for instances of `class` (and its subclasses).
///
/// Script side, these are wrappers created by [`Context::wrap_host_object`].
pub(super) fn object(class: String) -> Converter {
    let descriptor = TypeDescriptor::Object(class.clone());
    Converter::new(
        descriptor,
        Arc::new(
            move |ctx: &Context, value: ScriptValue| -> Result<HostValue, ConversionKind> {
                if value.is_nullish() {
                    return Ok(HostValue::Null);
                }
                let object = ctx.resolve_host_object(value)?;
                if !ctx.host().is_instance_of(object, &class) {
                    let actual = ctx
                        .host()
                        .class_name(object)
                        .map_err(|e| ConversionKind::Runtime(e.to_string()))?;
                    return Err(ConversionKind::IncompatibleClass { actual });
                }
                Ok(HostValue::Ref(object))
            },
        ),
        Arc::new(
            |ctx: &Context, value: HostValue| -> Result<ScriptValue, ConversionKind> {
                match value {
                    HostValue::Null => Ok(ScriptValue::null()),
                    HostValue::Ref(object) => ctx.wrap_host_object(object),
                    other => Err(host_mismatch(other)),
                }
            },
        ),
    )
}

/// Converter for arrays of `element`'s type.
///
/// Arrays are copied in both directions; element order is preserved.
pub(super) fn array(descriptor: TypeDescriptor, element: Converter) -> Converter {
    let to_host_element = element.clone();
    Converter::new(
        descriptor,
        Arc::new(
            move |ctx: &Context, value: ScriptValue| -> Result<HostValue, ConversionKind> {
                if value.is_nullish() {
                    return Ok(HostValue::Null);
                }
                if ctx.kind_of(value) != ScriptKind::Array {
                    return Err(ctx.mismatch(value));
                }
                let script = ctx.script();
                let len = script.array_len(value).ok_or_else(|| ctx.mismatch(value))?;
                let mut items = Vec::with_capacity(len);
                for index in 0..len {
                    let item = script.array_get(value, index).unwrap_or_default();
                    items.push(to_host_element.convert_to_host(ctx, item)?);
                }
                ctx.new_host_array(to_host_element.descriptor(), &items)
            },
        ),
        Arc::new(
            move |ctx: &Context, value: HostValue| -> Result<ScriptValue, ConversionKind> {
                let array = match value {
                    HostValue::Null => return Ok(ScriptValue::null()),
                    HostValue::Ref(array) => array,
                    other => return Err(host_mismatch(other)),
                };
                let elements = ctx
                    .host()
                    .array_elements(array)
                    .map_err(|e| ConversionKind::Runtime(e.to_string()))?;
                for reference in elements.iter().filter_map(HostValue::as_host_ref) {
                    ctx.track(reference);
                }
                let items = elements
                    .into_iter()
                    .map(|item| element.convert_to_script(ctx, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ctx.script().create_array(&items))
            },
        ),
    )
}

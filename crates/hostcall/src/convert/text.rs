//! String converters

use hostcall_sdk::{ConversionKind, HostValue, ScriptValue};

use super::host_mismatch;
use crate::context::Context;
use crate::runtime::ScriptKind;

/// Script string → host string. The host copy is a frame temporary.
pub(super) fn string_to_host(ctx: &Context, value: ScriptValue) -> Result<HostValue, ConversionKind> {
    if value.is_nullish() {
        return Ok(HostValue::Null);
    }
    if ctx.kind_of(value) != ScriptKind::String {
        return Err(ctx.mismatch(value));
    }
    let text = ctx
        .script()
        .read_string(value)
        .ok_or_else(|| ctx.mismatch(value))?;
    ctx.new_host_string(&text)
}

/// Host string → script string
pub(super) fn string_to_script(ctx: &Context, value: HostValue) -> Result<ScriptValue, ConversionKind> {
    match value {
        HostValue::Null => Ok(ScriptValue::null()),
        HostValue::Ref(string) => {
            let text = ctx
                .host()
                .read_string(string)
                .map_err(|e| ConversionKind::Runtime(e.to_string()))?;
            Ok(ctx.script().create_string(&text))
        }
        other => Err(host_mismatch(other)),
    }
}

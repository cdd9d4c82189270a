//! Boolean and numeric converters
//!
//! Script numbers are either 32-bit ints or doubles. Integer parameters
//! accept both, as long as the value is integral and fits the target width;
//! anything else is rejected rather than clamped, wrapped or truncated.

use std::sync::Arc;

use hostcall_sdk::{ConversionKind, HostValue, PrimitiveType, ScriptValue};

use super::{host_mismatch, ToHostFn, ToScriptFn};
use crate::context::Context;

/// Largest integer magnitude a script double represents exactly (2^53)
const MAX_SAFE_INTEGER: u64 = 1 << 53;

/// Exclusive bounds of i64 as doubles (-2^63 and 2^63 are exact)
const I64_MIN_F: f64 = -9_223_372_036_854_775_808.0;
const I64_END_F: f64 = 9_223_372_036_854_775_808.0;

type ToHostLeaf = fn(&Context, ScriptValue) -> Result<HostValue, ConversionKind>;
type ToScriptLeaf = fn(&Context, HostValue) -> Result<ScriptValue, ConversionKind>;

fn leaf(
    primitive: PrimitiveType,
    to_host: ToHostLeaf,
    to_script: ToScriptLeaf,
) -> (PrimitiveType, ToHostFn, ToScriptFn) {
    let to_host: ToHostFn = Arc::new(to_host);
    let to_script: ToScriptFn = Arc::new(to_script);
    (primitive, to_host, to_script)
}

/// Leaf converters for every supported primitive
pub(super) fn leaves() -> Vec<(PrimitiveType, ToHostFn, ToScriptFn)> {
    vec![
        leaf(PrimitiveType::Boolean, boolean_to_host, boolean_to_script),
        leaf(PrimitiveType::Byte, byte_to_host, integer_to_script),
        leaf(PrimitiveType::Short, short_to_host, integer_to_script),
        leaf(PrimitiveType::Int, int_to_host, integer_to_script),
        leaf(PrimitiveType::Long, long_to_host, integer_to_script),
        leaf(PrimitiveType::Float, float_to_host, float_to_script),
        leaf(PrimitiveType::Double, double_to_host, float_to_script),
    ]
}

/// Wrap a primitive converter to produce boxed host values.
///
/// Script null and undefined become the host null reference.
pub(super) fn boxed_to_host(unboxed: ToHostFn) -> ToHostFn {
    Arc::new(move |ctx: &Context, value: ScriptValue| -> Result<HostValue, ConversionKind> {
        if value.is_nullish() {
            return Ok(HostValue::Null);
        }
        let primitive = unboxed(ctx, value)?;
        ctx.box_primitive(primitive)
    })
}

/// Wrap a primitive converter to accept boxed host values
pub(super) fn boxed_to_script(primitive: PrimitiveType, unboxed: ToScriptFn) -> ToScriptFn {
    Arc::new(move |ctx: &Context, value: HostValue| -> Result<ScriptValue, ConversionKind> {
        match value {
            HostValue::Null => Ok(ScriptValue::null()),
            HostValue::Ref(boxed) => {
                let inner = ctx
                    .host()
                    .unbox_value(boxed, primitive)
                    .map_err(|e| ConversionKind::Runtime(e.to_string()))?;
                unboxed(ctx, inner)
            }
            other => unboxed(ctx, other),
        }
    })
}

fn boolean_to_host(ctx: &Context, value: ScriptValue) -> Result<HostValue, ConversionKind> {
    value
        .as_bool()
        .map(HostValue::Boolean)
        .ok_or_else(|| ctx.mismatch(value))
}

fn boolean_to_script(_ctx: &Context, value: HostValue) -> Result<ScriptValue, ConversionKind> {
    match value {
        HostValue::Boolean(b) => Ok(ScriptValue::bool(b)),
        other => Err(host_mismatch(other)),
    }
}

fn out_of_range(value: impl std::fmt::Debug) -> ConversionKind {
    ConversionKind::OutOfRange {
        value: format!("{:?}", value),
    }
}

/// Extract an integral value, accepting ints and integral doubles
fn integral(ctx: &Context, value: ScriptValue) -> Result<i64, ConversionKind> {
    if let Some(i) = value.as_int() {
        return Ok(i as i64);
    }
    match value.as_float() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && (I64_MIN_F..I64_END_F).contains(&f) => {
            Ok(f as i64)
        }
        Some(f) => Err(out_of_range(f)),
        None => Err(ctx.mismatch(value)),
    }
}

fn narrow<T: TryFrom<i64>>(n: i64) -> Result<T, ConversionKind> {
    T::try_from(n).map_err(|_| out_of_range(n))
}

fn byte_to_host(ctx: &Context, value: ScriptValue) -> Result<HostValue, ConversionKind> {
    narrow(integral(ctx, value)?).map(HostValue::Byte)
}

fn short_to_host(ctx: &Context, value: ScriptValue) -> Result<HostValue, ConversionKind> {
    narrow(integral(ctx, value)?).map(HostValue::Short)
}

fn int_to_host(ctx: &Context, value: ScriptValue) -> Result<HostValue, ConversionKind> {
    narrow(integral(ctx, value)?).map(HostValue::Int)
}

fn long_to_host(ctx: &Context, value: ScriptValue) -> Result<HostValue, ConversionKind> {
    integral(ctx, value).map(HostValue::Long)
}

/// Integers that fit in 32 bits become script ints; wider ones become
/// doubles only while exactly representable.
fn integer_to_script(_ctx: &Context, value: HostValue) -> Result<ScriptValue, ConversionKind> {
    let n = match value {
        HostValue::Byte(b) => b as i64,
        HostValue::Short(s) => s as i64,
        HostValue::Int(i) => i as i64,
        HostValue::Long(l) => l,
        other => return Err(host_mismatch(other)),
    };
    if let Ok(i) = i32::try_from(n) {
        Ok(ScriptValue::int(i))
    } else if n.unsigned_abs() <= MAX_SAFE_INTEGER {
        Ok(ScriptValue::float(n as f64))
    } else {
        Err(out_of_range(n))
    }
}

fn number(ctx: &Context, value: ScriptValue) -> Result<f64, ConversionKind> {
    value.as_number().ok_or_else(|| ctx.mismatch(value))
}

fn float_to_host(ctx: &Context, value: ScriptValue) -> Result<HostValue, ConversionKind> {
    let f = number(ctx, value)?;
    if f.is_finite() && f.abs() > f32::MAX as f64 {
        return Err(out_of_range(f));
    }
    Ok(HostValue::Float(f as f32))
}

fn double_to_host(ctx: &Context, value: ScriptValue) -> Result<HostValue, ConversionKind> {
    number(ctx, value).map(HostValue::Double)
}

fn float_to_script(_ctx: &Context, value: HostValue) -> Result<ScriptValue, ConversionKind> {
    match value {
        HostValue::Float(f) => Ok(ScriptValue::float(f as f64)),
        HostValue::Double(d) => Ok(ScriptValue::float(d)),
        other => Err(host_mismatch(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::ScriptHeap;
    use crate::reflect::ReflectHost;
    use crate::runtime::{HostBridge, ScriptRuntime};

    fn context() -> (Context, ScriptHeap, ReflectHost) {
        let heap = ScriptHeap::new();
        let host = ReflectHost::new();
        let ctx = Context::new(heap.clone(), host.clone());
        (ctx, heap, host)
    }

    #[test]
    fn test_boolean_round_trip() {
        let (ctx, _heap, _host) = context();
        for b in [true, false] {
            let host = boolean_to_host(&ctx, ScriptValue::bool(b)).unwrap();
            assert_eq!(host, HostValue::Boolean(b));
            assert_eq!(boolean_to_script(&ctx, host).unwrap(), ScriptValue::bool(b));
        }
    }

    #[test]
    fn test_boolean_does_not_coerce_truthiness() {
        let (ctx, heap, _host) = context();
        assert_eq!(
            boolean_to_host(&ctx, ScriptValue::int(1)),
            Err(ConversionKind::TypeMismatch {
                got: "int".to_string()
            })
        );
        assert!(boolean_to_host(&ctx, heap.create_string("true")).is_err());
        assert_eq!(
            boolean_to_host(&ctx, ScriptValue::undefined()),
            Err(ConversionKind::NullNotAllowed)
        );
    }

    #[test]
    fn test_integer_round_trip_within_domain() {
        let (ctx, _heap, _host) = context();
        for n in [i32::MIN, -1, 0, 1, 42, i32::MAX] {
            let host = int_to_host(&ctx, ScriptValue::int(n)).unwrap();
            assert_eq!(integer_to_script(&ctx, host).unwrap(), ScriptValue::int(n));
        }
        for n in [i8::MIN, 0, i8::MAX] {
            let host = byte_to_host(&ctx, ScriptValue::int(n as i32)).unwrap();
            assert_eq!(host, HostValue::Byte(n));
            assert_eq!(integer_to_script(&ctx, host).unwrap(), ScriptValue::int(n as i32));
        }
        let host = short_to_host(&ctx, ScriptValue::int(-30000)).unwrap();
        assert_eq!(host, HostValue::Short(-30000));
    }

    #[test]
    fn test_narrowing_rejects_instead_of_truncating() {
        let (ctx, _heap, _host) = context();
        assert_eq!(
            byte_to_host(&ctx, ScriptValue::int(128)),
            Err(ConversionKind::OutOfRange {
                value: "128".to_string()
            })
        );
        assert!(byte_to_host(&ctx, ScriptValue::int(-129)).is_err());
        assert!(short_to_host(&ctx, ScriptValue::int(40000)).is_err());
        assert!(int_to_host(&ctx, ScriptValue::float(4294967296.0)).is_err());
        assert_eq!(
            int_to_host(&ctx, ScriptValue::float(1.5)),
            Err(ConversionKind::OutOfRange {
                value: "1.5".to_string()
            })
        );
        assert!(matches!(
            int_to_host(&ctx, ScriptValue::float(f64::NAN)),
            Err(ConversionKind::OutOfRange { .. })
        ));
        assert!(matches!(
            long_to_host(&ctx, ScriptValue::float(f64::NEG_INFINITY)),
            Err(ConversionKind::OutOfRange { .. })
        ));
        assert_eq!(
            short_to_host(&ctx, ScriptValue::bool(true)),
            Err(ConversionKind::TypeMismatch {
                got: "boolean".to_string()
            })
        );
        assert!(long_to_host(&ctx, ScriptValue::float(f64::INFINITY)).is_err());
        assert!(long_to_host(&ctx, ScriptValue::float(1e19)).is_err());
    }

    #[test]
    fn test_integral_doubles_accepted() {
        let (ctx, _heap, _host) = context();
        assert_eq!(int_to_host(&ctx, ScriptValue::float(7.0)), Ok(HostValue::Int(7)));
        assert_eq!(
            long_to_host(&ctx, ScriptValue::float(9007199254740992.0)),
            Ok(HostValue::Long(9007199254740992))
        );
    }

    #[test]
    fn test_long_to_script_precision() {
        let (ctx, _heap, _host) = context();
        assert_eq!(
            integer_to_script(&ctx, HostValue::Long(5_000_000_000)).unwrap(),
            ScriptValue::float(5_000_000_000.0)
        );
        assert_eq!(
            integer_to_script(&ctx, HostValue::Long(-(1 << 53))).unwrap(),
            ScriptValue::float(-9007199254740992.0)
        );
        assert!(integer_to_script(&ctx, HostValue::Long((1 << 53) + 1)).is_err());
        assert!(integer_to_script(&ctx, HostValue::Long(i64::MIN)).is_err());
    }

    #[test]
    fn test_float_and_double() {
        let (ctx, heap, _host) = context();
        assert_eq!(float_to_host(&ctx, ScriptValue::float(0.5)), Ok(HostValue::Float(0.5)));
        assert_eq!(float_to_host(&ctx, ScriptValue::int(3)), Ok(HostValue::Float(3.0)));
        assert!(float_to_host(&ctx, ScriptValue::float(1e39)).is_err());
        assert!(matches!(
            float_to_host(&ctx, ScriptValue::float(f64::INFINITY)),
            Ok(HostValue::Float(f)) if f.is_infinite()
        ));
        assert_eq!(double_to_host(&ctx, ScriptValue::float(1.123)), Ok(HostValue::Double(1.123)));
        assert_eq!(
            float_to_script(&ctx, HostValue::Double(1.123)).unwrap(),
            ScriptValue::float(1.123)
        );
        assert!(double_to_host(&ctx, heap.create_string("1.0")).is_err());
    }

    #[test]
    fn test_boxed_null_and_values() {
        let (ctx, _heap, host) = context();
        let to_host = boxed_to_host(Arc::new(int_to_host));
        let to_script = boxed_to_script(PrimitiveType::Int, Arc::new(integer_to_script));
        let _frame = ctx.enter_frame().unwrap();

        assert_eq!(to_host(&ctx, ScriptValue::null()), Ok(HostValue::Null));
        assert_eq!(to_host(&ctx, ScriptValue::undefined()), Ok(HostValue::Null));
        assert_eq!(to_script(&ctx, HostValue::Null), Ok(ScriptValue::null()));

        let boxed = to_host(&ctx, ScriptValue::int(12)).unwrap();
        let boxed_ref = boxed.as_host_ref().unwrap();
        assert_eq!(host.class_name(boxed_ref).unwrap(), "java.lang.Integer");
        assert_eq!(ctx.temporary_count(), 1);
        assert_eq!(to_script(&ctx, boxed), Ok(ScriptValue::int(12)));
        assert_eq!(to_script(&ctx, HostValue::Int(5)), Ok(ScriptValue::int(5)));
    }

    #[test]
    fn test_float_round_trip_is_exact() {
        let (ctx, _heap, _host) = context();
        for f in [0.0, -0.5, 1.25, 16_777_216.0, f32::MIN_POSITIVE as f64, f32::MAX as f64] {
            let host = float_to_host(&ctx, ScriptValue::float(f)).unwrap();
            assert_eq!(host, HostValue::Float(f as f32));
            assert_eq!(float_to_script(&ctx, host).unwrap(), ScriptValue::float(f));
        }
    }

    #[test]
    fn test_short_and_long_round_trip() {
        let (ctx, _heap, _host) = context();
        for n in [i16::MIN, -1, 0, i16::MAX] {
            let host = short_to_host(&ctx, ScriptValue::int(n as i32)).unwrap();
            assert_eq!(host, HostValue::Short(n));
            assert_eq!(integer_to_script(&ctx, host).unwrap(), ScriptValue::int(n as i32));
        }
        for n in [i32::MIN, 0, 99, i32::MAX] {
            let host = long_to_host(&ctx, ScriptValue::int(n)).unwrap();
            assert_eq!(host, HostValue::Long(n as i64));
            assert_eq!(integer_to_script(&ctx, host).unwrap(), ScriptValue::int(n));
        }
    }

    #[test]
    fn test_boxed_round_trip_for_each_primitive() {
        let (ctx, _heap, host) = context();
        let cases: [(PrimitiveType, ToHostLeaf, ToScriptLeaf, ScriptValue); 6] = [
            (PrimitiveType::Boolean, boolean_to_host, boolean_to_script, ScriptValue::bool(true)),
            (PrimitiveType::Byte, byte_to_host, integer_to_script, ScriptValue::int(-7)),
            (PrimitiveType::Short, short_to_host, integer_to_script, ScriptValue::int(1234)),
            (PrimitiveType::Long, long_to_host, integer_to_script, ScriptValue::int(77)),
            (PrimitiveType::Float, float_to_host, float_to_script, ScriptValue::float(2.5)),
            (PrimitiveType::Double, double_to_host, float_to_script, ScriptValue::float(0.1)),
        ];
        let _frame = ctx.enter_frame().unwrap();
        for (primitive, unboxed_host, unboxed_script, value) in cases {
            let to_host = boxed_to_host(Arc::new(unboxed_host));
            let to_script = boxed_to_script(primitive, Arc::new(unboxed_script));
            let boxed = to_host(&ctx, value).unwrap();
            let boxed_ref = boxed.as_host_ref().unwrap();
            assert_eq!(host.class_name(boxed_ref).unwrap(), primitive.boxed_class());
            assert_eq!(to_script(&ctx, boxed), Ok(value));
        }
    }

    #[test]
    fn test_primitive_rejects_null() {
        let (ctx, _heap, _host) = context();
        assert_eq!(
            int_to_host(&ctx, ScriptValue::null()),
            Err(ConversionKind::NullNotAllowed)
        );
    }
}

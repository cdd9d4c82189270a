//! In-process reflective host
//!
//! [`ReflectHost`] is a small object model with single-inheritance classes,
//! strings, typed arrays, boxed primitives and instances with fields.
//! Methods are Rust closures registered against a [`MethodSignature`].
//!
//! Every reference handed out is counted, so tests can assert that a call
//! left no host references behind. Method bodies follow local-reference
//! discipline: anything they allocate is tracked on the calling frame with
//! [`Context::track`], and a returned reference is re-issued to the caller.

use std::num::NonZeroU64;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::warn;

use hostcall_sdk::{
    HostException, HostRef, HostValue, MethodSignature, PrimitiveType, TypeDescriptor,
    STRING_CLASS,
};

use crate::context::Context;
use crate::runtime::{HostBridge, MethodHandle};

/// Root of the class hierarchy; every object is an instance of it.
pub const OBJECT_CLASS: &str = "java.lang.Object";

const CLASS_CAST: &str = "java.lang.ClassCastException";
const ILLEGAL_ARGUMENT: &str = "java.lang.IllegalArgumentException";
const ILLEGAL_STATE: &str = "java.lang.IllegalStateException";
const NULL_POINTER: &str = "java.lang.NullPointerException";

/// Host method body
pub type HostMethodFn = Arc<
    dyn Fn(&Context, Option<HostRef>, &[HostValue]) -> Result<HostValue, HostException>
        + Send
        + Sync,
>;

/// A value stored inside a host object: primitives inline, objects by id
#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Value(HostValue),
    Object(u64),
}

#[derive(Debug, Clone)]
enum HostObject {
    String(String),
    Array {
        component: TypeDescriptor,
        items: Vec<Slot>,
    },
    Boxed(HostValue),
    Instance {
        class: String,
        fields: FxHashMap<String, Slot>,
    },
}

#[derive(Debug, Clone, Copy)]
struct RefEntry {
    object: u64,
    pinned: bool,
}

/// Reference accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    /// References handed out so far
    pub allocations: usize,
    /// References given back
    pub releases: usize,
    /// Releases of unknown or already released references
    pub invalid_releases: usize,
    /// Completed method invocations (including ones that threw)
    pub invocations: usize,
}

#[derive(Default)]
struct HostState {
    classes: FxHashMap<String, Option<String>>,
    methods: FxHashMap<(String, String, String), MethodHandle>,
    bodies: FxHashMap<u64, HostMethodFn>,
    objects: FxHashMap<u64, HostObject>,
    refs: FxHashMap<u64, RefEntry>,
    next_object: u64,
    next_ref: u64,
    stats: HostStats,
}

impl HostState {
    fn alloc_object(&mut self, object: HostObject) -> u64 {
        self.next_object += 1;
        self.objects.insert(self.next_object, object);
        self.next_object
    }

    fn new_ref(&mut self, object: u64, pinned: bool) -> HostRef {
        let id = NonZeroU64::MIN.saturating_add(self.next_ref);
        self.next_ref += 1;
        self.refs.insert(id.get(), RefEntry { object, pinned });
        self.stats.allocations += 1;
        HostRef::from(id)
    }

    fn object_id(&self, value: HostRef) -> Result<u64, HostException> {
        self.refs
            .get(&value.as_u64())
            .map(|entry| entry.object)
            .ok_or_else(|| {
                HostException::new(ILLEGAL_STATE, format!("invalid reference {:?}", value))
            })
    }

    fn object(&self, value: HostRef) -> Result<&HostObject, HostException> {
        let id = self.object_id(value)?;
        self.objects
            .get(&id)
            .ok_or_else(|| HostException::new(ILLEGAL_STATE, format!("dangling object {}", id)))
    }

    fn object_mut(&mut self, value: HostRef) -> Result<&mut HostObject, HostException> {
        let id = self.object_id(value)?;
        self.objects
            .get_mut(&id)
            .ok_or_else(|| HostException::new(ILLEGAL_STATE, format!("dangling object {}", id)))
    }

    fn class_of(&self, object: &HostObject) -> String {
        match object {
            HostObject::String(_) => STRING_CLASS.to_string(),
            HostObject::Array { component, .. } => format!("{}[]", component),
            HostObject::Boxed(value) => primitive_of(value)
                .map_or(OBJECT_CLASS, PrimitiveType::boxed_class)
                .to_string(),
            HostObject::Instance { class, .. } => class.clone(),
        }
    }

    fn is_subclass(&self, class: &str, ancestor: &str) -> bool {
        let mut current = Some(class.to_string());
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self.classes.get(&name).cloned().flatten();
        }
        false
    }

    fn store(&self, value: HostValue) -> Result<Slot, HostException> {
        match value {
            HostValue::Ref(r) => Ok(Slot::Object(self.object_id(r)?)),
            other => Ok(Slot::Value(other)),
        }
    }

    fn load(&mut self, slot: Slot) -> HostValue {
        match slot {
            Slot::Value(value) => value,
            Slot::Object(id) => HostValue::Ref(self.new_ref(id, false)),
        }
    }
}

fn primitive_of(value: &HostValue) -> Option<PrimitiveType> {
    Some(match value {
        HostValue::Boolean(_) => PrimitiveType::Boolean,
        HostValue::Byte(_) => PrimitiveType::Byte,
        HostValue::Short(_) => PrimitiveType::Short,
        HostValue::Int(_) => PrimitiveType::Int,
        HostValue::Long(_) => PrimitiveType::Long,
        HostValue::Char(_) => PrimitiveType::Char,
        HostValue::Float(_) => PrimitiveType::Float,
        HostValue::Double(_) => PrimitiveType::Double,
        HostValue::Void | HostValue::Null | HostValue::Ref(_) => return None,
    })
}

fn method_key(class: &str, name: &str, descriptor: String) -> (String, String, String) {
    (class.to_string(), name.to_string(), descriptor)
}

/// Shared-handle reflective host.
///
/// Clones refer to the same object model.
#[derive(Clone, Default)]
pub struct ReflectHost {
    state: Arc<Mutex<HostState>>,
}

impl ReflectHost {
    /// Create an empty host with only the root class defined
    pub fn new() -> Self {
        let host = Self::default();
        host.state.lock().classes.insert(OBJECT_CLASS.to_string(), None);
        host
    }

    /// Define a class. Without a superclass it extends the root class.
    pub fn define_class(&self, name: &str, superclass: Option<&str>) {
        let superclass = superclass.unwrap_or(OBJECT_CLASS).to_string();
        self.state
            .lock()
            .classes
            .insert(name.to_string(), Some(superclass));
    }

    /// Register a method body, returning its handle
    pub fn define_method<F>(&self, signature: &MethodSignature, body: F) -> MethodHandle
    where
        F: Fn(&Context, Option<HostRef>, &[HostValue]) -> Result<HostValue, HostException>
            + Send
            + Sync
            + 'static,
    {
        let mut state = self.state.lock();
        let key = method_key(
            &signature.declaring_class,
            &signature.name,
            signature.descriptor(),
        );
        let next = MethodHandle(state.methods.len() as u64 + 1);
        let handle = *state.methods.entry(key).or_insert(next);
        state.bodies.insert(handle.0, Arc::new(body));
        handle
    }

    /// Allocate an instance of `class`, returning a local reference
    pub fn new_instance(&self, class: &str) -> HostRef {
        let mut state = self.state.lock();
        let id = state.alloc_object(HostObject::Instance {
            class: class.to_string(),
            fields: FxHashMap::default(),
        });
        state.new_ref(id, false)
    }

    /// Set an instance field
    pub fn set_field(&self, object: HostRef, name: &str, value: HostValue) -> Result<(), HostException> {
        let mut state = self.state.lock();
        let slot = state.store(value)?;
        match state.object_mut(object)? {
            HostObject::Instance { fields, .. } => {
                fields.insert(name.to_string(), slot);
                Ok(())
            }
            _ => Err(HostException::new(ILLEGAL_ARGUMENT, "not an instance")),
        }
    }

    /// Read an instance field. Unset fields read as null; object fields
    /// come back as new local references.
    pub fn get_field(&self, object: HostRef, name: &str) -> Result<HostValue, HostException> {
        let mut state = self.state.lock();
        let slot = match state.object(object)? {
            HostObject::Instance { fields, .. } => fields.get(name).copied(),
            _ => return Err(HostException::new(ILLEGAL_ARGUMENT, "not an instance")),
        };
        Ok(slot.map_or(HostValue::Null, |slot| state.load(slot)))
    }

    /// Whether two references point at the same object
    pub fn same_object(&self, a: HostRef, b: HostRef) -> bool {
        let state = self.state.lock();
        match (state.object_id(a), state.object_id(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Number of outstanding references, local and pinned
    pub fn live_refs(&self) -> usize {
        self.state.lock().refs.len()
    }

    /// Number of outstanding pinned references
    pub fn pinned_refs(&self) -> usize {
        self.state.lock().refs.values().filter(|e| e.pinned).count()
    }

    /// Reference accounting
    pub fn stats(&self) -> HostStats {
        self.state.lock().stats
    }
}

impl HostBridge for ReflectHost {
    fn method_handle(&self, signature: &MethodSignature) -> Option<MethodHandle> {
        let key = method_key(
            &signature.declaring_class,
            &signature.name,
            signature.descriptor(),
        );
        self.state.lock().methods.get(&key).copied()
    }

    fn invoke(
        &self,
        ctx: &Context,
        method: MethodHandle,
        receiver: Option<HostRef>,
        args: &[HostValue],
    ) -> Result<HostValue, HostException> {
        let body = {
            let state = self.state.lock();
            if let Some(receiver) = receiver {
                state.object_id(receiver)?;
            }
            state.bodies.get(&method.0).cloned()
        };
        let body = body.ok_or_else(|| {
            HostException::new(ILLEGAL_STATE, format!("unknown method handle {}", method.0))
        })?;
        // The lock is not held here: the body may call back into the context
        let result = body(ctx, receiver, args);
        let mut state = self.state.lock();
        state.stats.invocations += 1;
        match result {
            // The caller gets its own reference; the body's locals stay with
            // the frame that tracked them
            Ok(HostValue::Ref(value)) => {
                let object = state.object_id(value)?;
                Ok(HostValue::Ref(state.new_ref(object, false)))
            }
            other => other,
        }
    }

    fn new_string(&self, s: &str) -> Result<HostRef, HostException> {
        let mut state = self.state.lock();
        let id = state.alloc_object(HostObject::String(s.to_string()));
        Ok(state.new_ref(id, false))
    }

    fn read_string(&self, string: HostRef) -> Result<String, HostException> {
        let state = self.state.lock();
        match state.object(string)? {
            HostObject::String(s) => Ok(s.clone()),
            other => Err(HostException::new(
                CLASS_CAST,
                format!("{} cannot be cast to {}", state.class_of(other), STRING_CLASS),
            )),
        }
    }

    fn new_array(
        &self,
        component: &TypeDescriptor,
        items: &[HostValue],
    ) -> Result<HostRef, HostException> {
        let mut state = self.state.lock();
        let items = items
            .iter()
            .map(|item| state.store(*item))
            .collect::<Result<Vec<_>, _>>()?;
        let id = state.alloc_object(HostObject::Array {
            component: component.clone(),
            items,
        });
        Ok(state.new_ref(id, false))
    }

    fn array_elements(&self, array: HostRef) -> Result<Vec<HostValue>, HostException> {
        let mut state = self.state.lock();
        let items = match state.object(array)? {
            HostObject::Array { items, .. } => items.clone(),
            other => {
                return Err(HostException::new(
                    CLASS_CAST,
                    format!("{} is not an array", state.class_of(other)),
                ))
            }
        };
        Ok(items.into_iter().map(|slot| state.load(slot)).collect())
    }

    fn box_value(&self, value: HostValue) -> Result<HostRef, HostException> {
        if primitive_of(&value).is_none() {
            return Err(HostException::new(
                ILLEGAL_ARGUMENT,
                format!("cannot box a {} value", value.type_name()),
            ));
        }
        let mut state = self.state.lock();
        let id = state.alloc_object(HostObject::Boxed(value));
        Ok(state.new_ref(id, false))
    }

    fn unbox_value(
        &self,
        boxed: HostRef,
        primitive: PrimitiveType,
    ) -> Result<HostValue, HostException> {
        let state = self.state.lock();
        let object = state.object(boxed)?;
        match object {
            HostObject::Boxed(value) if primitive_of(value) == Some(primitive) => Ok(*value),
            other => Err(HostException::new(
                CLASS_CAST,
                format!(
                    "{} cannot be cast to {}",
                    state.class_of(other),
                    primitive.boxed_class()
                ),
            )),
        }
    }

    fn class_name(&self, value: HostRef) -> Result<String, HostException> {
        let state = self.state.lock();
        let object = state.object(value)?;
        Ok(state.class_of(object))
    }

    fn is_instance_of(&self, value: HostRef, class: &str) -> bool {
        let state = self.state.lock();
        let Ok(object) = state.object(value) else {
            return false;
        };
        class == OBJECT_CLASS || state.is_subclass(&state.class_of(object), class)
    }

    fn pin(&self, value: HostRef) -> Result<HostRef, HostException> {
        let mut state = self.state.lock();
        let id = state
            .object_id(value)
            .map_err(|_| HostException::new(NULL_POINTER, "cannot pin an invalid reference"))?;
        Ok(state.new_ref(id, true))
    }

    fn release(&self, value: HostRef) {
        let mut state = self.state.lock();
        if state.refs.remove(&value.as_u64()).is_some() {
            state.stats.releases += 1;
        } else {
            state.stats.invalid_releases += 1;
            drop(state);
            warn!(?value, "release of unknown host reference");
        }
    }
}

impl std::fmt::Debug for ReflectHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ReflectHost")
            .field("classes", &state.classes.len())
            .field("methods", &state.methods.len())
            .field("objects", &state.objects.len())
            .field("refs", &state.refs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_hierarchy() {
        let host = ReflectHost::new();
        host.define_class("a.Animal", None);
        host.define_class("a.Dog", Some("a.Animal"));
        let dog = host.new_instance("a.Dog");
        assert!(host.is_instance_of(dog, "a.Dog"));
        assert!(host.is_instance_of(dog, "a.Animal"));
        assert!(host.is_instance_of(dog, OBJECT_CLASS));
        assert!(!host.is_instance_of(dog, "a.Cat"));
        assert_eq!(host.class_name(dog).unwrap(), "a.Dog");
    }

    #[test]
    fn test_strings_and_boxes() {
        let host = ReflectHost::new();
        let s = host.new_string("hi").unwrap();
        assert_eq!(host.read_string(s).unwrap(), "hi");
        assert!(host.is_instance_of(s, STRING_CLASS));

        let boxed = host.box_value(HostValue::Long(9)).unwrap();
        assert_eq!(host.class_name(boxed).unwrap(), "java.lang.Long");
        assert_eq!(host.unbox_value(boxed, PrimitiveType::Long).unwrap(), HostValue::Long(9));
        let err = host.unbox_value(boxed, PrimitiveType::Int).unwrap_err();
        assert_eq!(err.class, CLASS_CAST);
        assert!(host.box_value(HostValue::Null).is_err());
        assert_eq!(host.read_string(boxed).unwrap_err().class, CLASS_CAST);
    }

    #[test]
    fn test_array_elements_are_fresh_references() {
        let host = ReflectHost::new();
        let s = host.new_string("x").unwrap();
        let array = host
            .new_array(&TypeDescriptor::String, &[HostValue::Ref(s), HostValue::Null])
            .unwrap();
        host.release(s);
        let elements = host.array_elements(array).unwrap();
        let element = elements[0].as_host_ref().unwrap();
        assert_eq!(host.read_string(element).unwrap(), "x");
        assert_eq!(elements[1], HostValue::Null);
        assert_eq!(host.class_name(array).unwrap(), "java.lang.String[]");
    }

    #[test]
    fn test_release_accounting() {
        let host = ReflectHost::new();
        host.define_class("a.Thing", None);
        let thing = host.new_instance("a.Thing");
        let pinned = host.pin(thing).unwrap();
        assert_eq!(host.live_refs(), 2);
        assert_eq!(host.pinned_refs(), 1);
        assert!(host.same_object(thing, pinned));

        host.release(thing);
        host.release(thing);
        host.release(pinned);
        let stats = host.stats();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.releases, 2);
        assert_eq!(stats.invalid_releases, 1);
        assert_eq!(host.live_refs(), 0);
    }

    #[test]
    fn test_fields() {
        let host = ReflectHost::new();
        host.define_class("a.Node", None);
        let node = host.new_instance("a.Node");
        let next = host.new_instance("a.Node");
        host.set_field(node, "value", HostValue::Int(3)).unwrap();
        host.set_field(node, "next", HostValue::Ref(next)).unwrap();
        assert_eq!(host.get_field(node, "value").unwrap(), HostValue::Int(3));
        assert_eq!(host.get_field(node, "missing").unwrap(), HostValue::Null);
        let loaded = host.get_field(node, "next").unwrap().as_host_ref().unwrap();
        assert!(host.same_object(loaded, next));
    }

    #[test]
    fn test_method_lookup() {
        let host = ReflectHost::new();
        let sig = MethodSignature::parse("a/Math", "twice", "(I)I").unwrap();
        let handle = host.define_method(&sig, |_ctx, _this, args| match args {
            [HostValue::Int(n)] => Ok(HostValue::Int(n * 2)),
            _ => Err(HostException::new(ILLEGAL_ARGUMENT, "twice(int)")),
        });
        assert_eq!(host.method_handle(&sig), Some(handle));
        let other = MethodSignature::parse("a/Math", "twice", "(J)J").unwrap();
        assert_eq!(host.method_handle(&other), None);
    }
}

//! In-process script runtime
//!
//! A slot heap behind [`ScriptValue`]'s heap tag. It backs the crate's own
//! tests and benchmarks, and serves as a reference [`ScriptRuntime`] for
//! embedders wiring up a real engine.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use hostcall_sdk::{HostHandle, ScriptValue};

use crate::runtime::{ScriptKind, ScriptRuntime};

/// Contents of a script error object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

#[derive(Debug, Clone)]
enum Slot {
    String(Arc<str>),
    Array(Vec<ScriptValue>),
    Object(FxHashMap<String, ScriptValue>),
    HostWrapper(HostHandle),
    Error(ErrorInfo),
}

impl Slot {
    fn kind(&self) -> ScriptKind {
        match self {
            Slot::String(_) => ScriptKind::String,
            Slot::Array(_) => ScriptKind::Array,
            Slot::Object(_) => ScriptKind::Object,
            Slot::HostWrapper(_) => ScriptKind::HostObject,
            Slot::Error(_) => ScriptKind::Error,
        }
    }
}

/// Heap statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Number of live slots
    pub slots: usize,
    /// Number of error objects created
    pub errors: usize,
}

/// Shared-handle script heap.
///
/// Clones refer to the same heap, so a test can keep one while a
/// [`crate::Context`] owns another.
#[derive(Clone, Default)]
pub struct ScriptHeap {
    slots: Arc<Mutex<Vec<Slot>>>,
}

impl ScriptHeap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&self, slot: Slot) -> ScriptValue {
        let mut slots = self.slots.lock();
        let id = slots.len() as u32;
        slots.push(slot);
        ScriptValue::heap(id)
    }

    fn with_slot<R>(&self, value: ScriptValue, f: impl FnOnce(&Slot) -> Option<R>) -> Option<R> {
        let id = value.as_heap()?;
        let slots = self.slots.lock();
        slots.get(id as usize).and_then(f)
    }

    /// Allocate an empty plain object
    pub fn create_object(&self) -> ScriptValue {
        self.alloc(Slot::Object(FxHashMap::default()))
    }

    /// Set a property on a plain object. Returns false for other values.
    pub fn set_property(&self, object: ScriptValue, key: &str, value: ScriptValue) -> bool {
        let Some(id) = object.as_heap() else {
            return false;
        };
        match self.slots.lock().get_mut(id as usize) {
            Some(Slot::Object(properties)) => {
                properties.insert(key.to_string(), value);
                true
            }
            _ => false,
        }
    }

    /// Read a property of a plain object
    pub fn get_property(&self, object: ScriptValue, key: &str) -> Option<ScriptValue> {
        self.with_slot(object, |slot| match slot {
            Slot::Object(properties) => properties.get(key).copied(),
            _ => None,
        })
    }

    /// Contents of an error object
    pub fn error_info(&self, value: ScriptValue) -> Option<ErrorInfo> {
        self.with_slot(value, |slot| match slot {
            Slot::Error(info) => Some(info.clone()),
            _ => None,
        })
    }

    /// Collect the elements of an array value
    pub fn array_items(&self, value: ScriptValue) -> Option<Vec<ScriptValue>> {
        self.with_slot(value, |slot| match slot {
            Slot::Array(items) => Some(items.clone()),
            _ => None,
        })
    }

    /// Heap statistics
    pub fn stats(&self) -> HeapStats {
        let slots = self.slots.lock();
        HeapStats {
            slots: slots.len(),
            errors: slots.iter().filter(|s| matches!(s, Slot::Error(_))).count(),
        }
    }
}

impl ScriptRuntime for ScriptHeap {
    fn kind(&self, value: ScriptValue) -> ScriptKind {
        if value.is_undefined() {
            ScriptKind::Undefined
        } else if value.is_null() {
            ScriptKind::Null
        } else if value.is_bool() {
            ScriptKind::Bool
        } else if value.is_int() {
            ScriptKind::Int
        } else if value.is_float() {
            ScriptKind::Float
        } else {
            // A dangling slot id reads as undefined
            self.with_slot(value, |slot| Some(slot.kind()))
                .unwrap_or(ScriptKind::Undefined)
        }
    }

    fn create_string(&self, s: &str) -> ScriptValue {
        self.alloc(Slot::String(Arc::from(s)))
    }

    fn read_string(&self, value: ScriptValue) -> Option<Arc<str>> {
        self.with_slot(value, |slot| match slot {
            Slot::String(s) => Some(s.clone()),
            _ => None,
        })
    }

    fn create_array(&self, items: &[ScriptValue]) -> ScriptValue {
        self.alloc(Slot::Array(items.to_vec()))
    }

    fn array_len(&self, value: ScriptValue) -> Option<usize> {
        self.with_slot(value, |slot| match slot {
            Slot::Array(items) => Some(items.len()),
            _ => None,
        })
    }

    fn array_get(&self, value: ScriptValue, index: usize) -> Option<ScriptValue> {
        self.with_slot(value, |slot| match slot {
            Slot::Array(items) => items.get(index).copied(),
            _ => None,
        })
    }

    fn wrap_host(&self, handle: HostHandle) -> ScriptValue {
        self.alloc(Slot::HostWrapper(handle))
    }

    fn unwrap_host(&self, value: ScriptValue) -> Option<HostHandle> {
        self.with_slot(value, |slot| match slot {
            Slot::HostWrapper(handle) => Some(*handle),
            _ => None,
        })
    }

    fn create_error(&self, name: &str, message: &str, stack: Option<&str>) -> ScriptValue {
        self.alloc(Slot::Error(ErrorInfo {
            name: name.to_string(),
            message: message.to_string(),
            stack: stack.map(str::to_string),
        }))
    }
}

impl std::fmt::Debug for ScriptHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHeap")
            .field("slots", &self.slots.lock().len())
            .finish()
    }
}

//! Proxy execution context
//!
//! A [`Context`] owns one script runtime and one host bridge for the
//! lifetime of an embedding session. Every cross-runtime allocation made
//! during a call goes through it:
//!
//! - Host temporaries (strings, arrays, boxes, returned references) are
//!   recorded in the active [`CallFrame`] and released when the frame drops,
//!   whichever way the call exits.
//! - Host objects handed to the script are pinned and entered into a handle
//!   table; script wrappers carry the table id, never a host reference.
//! - A frame stack serializes reentry: a host callback may enter a new
//!   frame while its caller is invoking, but nothing may enter while a frame
//!   is converting or finishing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use hostcall_sdk::{
    ConversionKind, HostException, HostHandle, HostRef, HostValue, ProxyError, ProxyResult,
    ScriptError, ScriptValue, TypeDescriptor,
};

use crate::runtime::{HostBridge, MethodHandle, ScriptKind, ScriptRuntime};

/// Unique identifier for a Context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Create a new unique context ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

/// Context configuration
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Maximum number of nested call frames (host callbacks into script)
    pub max_call_depth: usize,

    /// Log a warning when a context is dropped without `close()`
    pub warn_on_leaked_handles: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            max_call_depth: 64,
            warn_on_leaked_handles: true,
        }
    }
}

impl ContextOptions {
    /// Options with a specific call depth limit
    pub fn with_max_call_depth(max_call_depth: usize) -> Self {
        Self {
            max_call_depth,
            ..Self::default()
        }
    }
}

/// What the active frame is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Converting script arguments into host values
    Converting,
    /// Inside the host method; callbacks may enter new frames
    Invoking,
    /// Converting the host result back
    Finishing,
}

impl Phase {
    fn describe(self) -> &'static str {
        match self {
            Phase::Converting => "converting arguments",
            Phase::Invoking => "invoking",
            Phase::Finishing => "converting a result",
        }
    }
}

struct Frame {
    phase: Phase,
    temporaries: Vec<HostRef>,
}

/// Pinned host objects visible to the script
#[derive(Default)]
struct HandleTable {
    entries: FxHashMap<u32, HostRef>,
    next_id: u32,
}

impl HandleTable {
    fn insert(&mut self, pinned: HostRef) -> HostHandle {
        self.next_id = self.next_id.wrapping_add(1);
        while self.entries.contains_key(&self.next_id) || self.next_id == 0 {
            self.next_id = self.next_id.wrapping_add(1);
        }
        self.entries.insert(self.next_id, pinned);
        HostHandle(self.next_id)
    }
}

/// Owner of the script runtime, the host bridge, and every cross-runtime
/// resource created on their behalf.
pub struct Context {
    id: ContextId,
    options: ContextOptions,
    script: Box<dyn ScriptRuntime>,
    host: Box<dyn HostBridge>,
    handles: Mutex<HandleTable>,
    frames: Mutex<Vec<Frame>>,
    closed: AtomicBool,
}

impl Context {
    /// Create a context with default options
    pub fn new(script: impl ScriptRuntime + 'static, host: impl HostBridge + 'static) -> Self {
        Self::with_options(script, host, ContextOptions::default())
    }

    /// Create a context with specific options
    pub fn with_options(
        script: impl ScriptRuntime + 'static,
        host: impl HostBridge + 'static,
        options: ContextOptions,
    ) -> Self {
        let id = ContextId::new();
        debug!(context = id.as_u64(), max_call_depth = options.max_call_depth, "context created");
        Self {
            id,
            options,
            script: Box::new(script),
            host: Box::new(host),
            handles: Mutex::new(HandleTable::default()),
            frames: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Get the context ID
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Get the options
    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// The script runtime
    pub fn script(&self) -> &dyn ScriptRuntime {
        self.script.as_ref()
    }

    /// The host bridge
    pub fn host(&self) -> &dyn HostBridge {
        self.host.as_ref()
    }

    // ========================================================================
    // Call frames
    // ========================================================================

    /// Enter a new call frame.
    ///
    /// Fails once the context is closed, if another frame is mid-conversion,
    /// or if the depth limit is reached.
    pub fn enter_frame(&self) -> ProxyResult<CallFrame<'_>> {
        if self.is_closed() {
            return Err(ProxyError::ContextClosed(self.id.as_u64()));
        }
        let mut frames = self.frames.lock();
        if let Some(top) = frames.last() {
            if top.phase != Phase::Invoking {
                return Err(ProxyError::Reentrant(format!(
                    "context {} is {}",
                    self.id.as_u64(),
                    top.phase.describe()
                )));
            }
        }
        if frames.len() >= self.options.max_call_depth {
            return Err(ProxyError::CallDepthExceeded(self.options.max_call_depth));
        }
        frames.push(Frame {
            phase: Phase::Converting,
            temporaries: Vec::new(),
        });
        let index = frames.len() - 1;
        trace!(context = self.id.as_u64(), depth = index + 1, "frame entered");
        Ok(CallFrame { ctx: self, index })
    }

    /// Number of active frames
    pub fn depth(&self) -> usize {
        self.frames.lock().len()
    }

    /// Phase of the innermost active frame
    pub fn phase(&self) -> Option<Phase> {
        self.frames.lock().last().map(|frame| frame.phase)
    }

    /// Record a host reference as a temporary of the innermost frame.
    ///
    /// Outside of any frame the reference cannot be tracked and is released
    /// immediately.
    pub fn track(&self, value: HostRef) {
        let mut frames = self.frames.lock();
        match frames.last_mut() {
            Some(frame) => frame.temporaries.push(value),
            None => {
                drop(frames);
                warn!(context = self.id.as_u64(), ?value, "temporary created outside a call frame");
                self.host.release(value);
            }
        }
    }

    /// Number of temporaries held by the innermost frame
    pub fn temporary_count(&self) -> usize {
        self.frames
            .lock()
            .last()
            .map_or(0, |frame| frame.temporaries.len())
    }

    // ========================================================================
    // Conversion primitives
    // ========================================================================

    /// Copy `s` into a new host string temporary
    pub fn new_host_string(&self, s: &str) -> Result<HostValue, ConversionKind> {
        let string = self.host.new_string(s).map_err(runtime_error)?;
        self.track(string);
        Ok(HostValue::Ref(string))
    }

    /// Build a host array temporary
    pub fn new_host_array(
        &self,
        component: &TypeDescriptor,
        items: &[HostValue],
    ) -> Result<HostValue, ConversionKind> {
        let array = self.host.new_array(component, items).map_err(runtime_error)?;
        self.track(array);
        Ok(HostValue::Ref(array))
    }

    /// Box a primitive into a host temporary
    pub fn box_primitive(&self, value: HostValue) -> Result<HostValue, ConversionKind> {
        let boxed = self.host.box_value(value).map_err(runtime_error)?;
        self.track(boxed);
        Ok(HostValue::Ref(boxed))
    }

    /// Script kind of a value
    pub fn kind_of(&self, value: ScriptValue) -> ScriptKind {
        self.script.kind(value)
    }

    /// Type mismatch error describing `value`
    pub fn mismatch(&self, value: ScriptValue) -> ConversionKind {
        match self.script.kind(value) {
            ScriptKind::Null | ScriptKind::Undefined => ConversionKind::NullNotAllowed,
            kind => ConversionKind::TypeMismatch {
                got: kind.name().to_string(),
            },
        }
    }

    // ========================================================================
    // Host object handles
    // ========================================================================

    /// Pin a host object and wrap it as a script value.
    ///
    /// The caller keeps ownership of `value`; the pinned copy belongs to the
    /// context until [`Context::release_handle`] or [`Context::close`].
    /// Nothing is pinned once the context is closed.
    pub fn wrap_host_object(&self, value: HostRef) -> Result<ScriptValue, ConversionKind> {
        if self.is_closed() {
            return Err(ConversionKind::Runtime(format!(
                "context {} is closed",
                self.id.as_u64()
            )));
        }
        let pinned = self.host.pin(value).map_err(runtime_error)?;
        let handle = self.handles.lock().insert(pinned);
        trace!(context = self.id.as_u64(), handle = handle.0, "host object pinned");
        Ok(self.script.wrap_host(handle))
    }

    /// Map a script wrapper back to its pinned host reference
    pub fn resolve_host_object(&self, value: ScriptValue) -> Result<HostRef, ConversionKind> {
        let handle = match self.script.unwrap_host(value) {
            Some(handle) => handle,
            None if value.is_nullish() => return Err(ConversionKind::NullNotAllowed),
            None => return Err(ConversionKind::NotHostObject),
        };
        self.handles
            .lock()
            .entries
            .get(&handle.0)
            .copied()
            .ok_or(ConversionKind::StaleHandle(handle.0))
    }

    /// Unpin a host object once its script wrapper is gone.
    ///
    /// Returns false if the handle was unknown.
    pub fn release_handle(&self, handle: HostHandle) -> bool {
        let pinned = self.handles.lock().entries.remove(&handle.0);
        match pinned {
            Some(pinned) => {
                self.host.release(pinned);
                true
            }
            None => false,
        }
    }

    /// Number of pinned host objects
    pub fn handle_count(&self) -> usize {
        self.handles.lock().entries.len()
    }

    // ========================================================================
    // Invocation and errors
    // ========================================================================

    /// Invoke a host method from within `frame`.
    ///
    /// The frame is in the invoking phase for the duration of the host call,
    /// so host callbacks may enter nested frames. A returned reference is
    /// tracked as a temporary of `frame`.
    pub fn invoke(
        &self,
        frame: &CallFrame<'_>,
        method: MethodHandle,
        receiver: Option<HostRef>,
        args: &[HostValue],
    ) -> Result<HostValue, HostException> {
        frame.set_phase(Phase::Invoking);
        let result = self.host.invoke(self, method, receiver, args);
        frame.set_phase(Phase::Finishing);
        match result {
            Ok(HostValue::Ref(value)) => {
                frame.track(value);
                Ok(HostValue::Ref(value))
            }
            Ok(value) => Ok(value),
            Err(exception) => {
                warn!(
                    context = self.id.as_u64(),
                    class = %exception.class,
                    message = %exception.message,
                    "host method raised an exception"
                );
                Err(exception)
            }
        }
    }

    /// Turn a proxy error into the script-level error value
    pub fn raise(&self, error: ProxyError) -> ScriptError {
        let value = match &error {
            ProxyError::HostInvocation(exception) => {
                let stack = exception.stack_trace();
                self.script.create_error(
                    &exception.class,
                    &exception.message,
                    (!stack.is_empty()).then_some(stack.as_str()),
                )
            }
            other => self
                .script
                .create_error(other.script_error_name(), &other.to_string(), None),
        };
        ScriptError { error, value }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Release every pinned host object and refuse further calls. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let released = self.release_all_handles();
        debug!(context = self.id.as_u64(), released, "context closed");
    }

    fn release_all_handles(&self) -> usize {
        let pinned: Vec<HostRef> = self.handles.lock().entries.drain().map(|(_, r)| r).collect();
        let count = pinned.len();
        for value in pinned {
            self.host.release(value);
        }
        count
    }

    /// Whether `close()` has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if !self.is_closed() && self.options.warn_on_leaked_handles && self.handle_count() > 0 {
            warn!(
                context = self.id.as_u64(),
                handles = self.handle_count(),
                "context dropped without close(); releasing pinned host objects"
            );
        }
        self.closed.store(true, Ordering::Release);
        self.release_all_handles();
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("depth", &self.depth())
            .field("handles", &self.handle_count())
            .finish()
    }
}

fn runtime_error(exception: HostException) -> ConversionKind {
    ConversionKind::Runtime(exception.to_string())
}

/// RAII guard for one call frame.
///
/// Dropping the guard pops the frame and releases its temporaries.
pub struct CallFrame<'a> {
    ctx: &'a Context,
    index: usize,
}

impl CallFrame<'_> {
    /// 1-based nesting depth of this frame
    pub fn depth(&self) -> usize {
        self.index + 1
    }

    /// Switch this frame's phase
    pub fn set_phase(&self, phase: Phase) {
        if let Some(frame) = self.ctx.frames.lock().get_mut(self.index) {
            frame.phase = phase;
        }
    }

    /// Record a temporary on this frame specifically
    pub fn track(&self, value: HostRef) {
        let mut frames = self.ctx.frames.lock();
        match frames.get_mut(self.index) {
            Some(frame) => frame.temporaries.push(value),
            None => {
                drop(frames);
                self.ctx.host.release(value);
            }
        }
    }
}

impl std::fmt::Debug for CallFrame<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallFrame")
            .field("context", &self.ctx.id)
            .field("depth", &self.depth())
            .finish()
    }
}

impl Drop for CallFrame<'_> {
    fn drop(&mut self) {
        let released: Vec<HostRef> = {
            let mut frames = self.ctx.frames.lock();
            // Nested frames always drop first; anything above us is stale.
            let mut released = Vec::new();
            while frames.len() > self.index {
                if let Some(frame) = frames.pop() {
                    released.extend(frame.temporaries);
                }
            }
            released
        };
        trace!(
            context = self.ctx.id.as_u64(),
            depth = self.index + 1,
            temporaries = released.len(),
            "frame exited"
        );
        for value in released.into_iter().rev() {
            self.ctx.host.release(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::ScriptHeap;
    use crate::reflect::ReflectHost;

    fn context() -> (Context, ScriptHeap, ReflectHost) {
        let heap = ScriptHeap::new();
        let host = ReflectHost::new();
        let ctx = Context::new(heap.clone(), host.clone());
        (ctx, heap, host)
    }

    #[test]
    fn test_context_id_uniqueness() {
        let id1 = ContextId::new();
        let id2 = ContextId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_frame_releases_temporaries() {
        let (ctx, _heap, host) = context();
        let before = host.live_refs();
        {
            let _frame = ctx.enter_frame().unwrap();
            ctx.new_host_string("hello").unwrap();
            ctx.box_primitive(HostValue::Int(3)).unwrap();
            assert_eq!(ctx.temporary_count(), 2);
            assert_eq!(host.live_refs(), before + 2);
        }
        assert_eq!(host.live_refs(), before);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_reentry_rejected_while_converting() {
        let (ctx, _heap, _host) = context();
        let frame = ctx.enter_frame().unwrap();
        assert_eq!(ctx.phase(), Some(Phase::Converting));
        let err = ctx.enter_frame().unwrap_err();
        assert!(matches!(err, ProxyError::Reentrant(_)));

        frame.set_phase(Phase::Finishing);
        assert!(matches!(ctx.enter_frame(), Err(ProxyError::Reentrant(_))));

        frame.set_phase(Phase::Invoking);
        let nested = ctx.enter_frame().unwrap();
        assert_eq!(nested.depth(), 2);
        drop(nested);
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_call_depth_limit() {
        let heap = ScriptHeap::new();
        let host = ReflectHost::new();
        let ctx = Context::with_options(heap, host, ContextOptions::with_max_call_depth(2));
        let outer = ctx.enter_frame().unwrap();
        outer.set_phase(Phase::Invoking);
        let inner = ctx.enter_frame().unwrap();
        inner.set_phase(Phase::Invoking);
        assert_eq!(ctx.enter_frame().unwrap_err(), ProxyError::CallDepthExceeded(2));
    }

    #[test]
    fn test_track_outside_frame_releases() {
        let (ctx, _heap, host) = context();
        let before = host.live_refs();
        let string = host.new_string("orphan").unwrap();
        ctx.track(string);
        assert_eq!(host.live_refs(), before);
    }

    #[test]
    fn test_handle_round_trip_and_release() {
        let (ctx, heap, host) = context();
        host.define_class("com.example.Widget", None);
        let widget = host.new_instance("com.example.Widget");

        let wrapper = ctx.wrap_host_object(widget).unwrap();
        assert_eq!(heap.kind(wrapper), ScriptKind::HostObject);
        let pinned = ctx.resolve_host_object(wrapper).unwrap();
        assert_ne!(pinned, widget);
        assert!(host.same_object(pinned, widget));

        let handle = heap.unwrap_host(wrapper).unwrap();
        assert!(ctx.release_handle(handle));
        assert!(!ctx.release_handle(handle));
        assert_eq!(
            ctx.resolve_host_object(wrapper),
            Err(ConversionKind::StaleHandle(handle.0))
        );
    }

    #[test]
    fn test_resolve_plain_values() {
        let (ctx, heap, _host) = context();
        assert_eq!(
            ctx.resolve_host_object(heap.create_string("nope")),
            Err(ConversionKind::NotHostObject)
        );
        assert_eq!(
            ctx.resolve_host_object(ScriptValue::null()),
            Err(ConversionKind::NullNotAllowed)
        );
    }

    #[test]
    fn test_close_releases_pinned_handles() {
        let (ctx, _heap, host) = context();
        host.define_class("com.example.Widget", None);
        let widget = host.new_instance("com.example.Widget");
        ctx.wrap_host_object(widget).unwrap();
        ctx.wrap_host_object(widget).unwrap();
        let before = host.live_refs();
        ctx.close();
        assert_eq!(host.live_refs(), before - 2);
        assert_eq!(ctx.handle_count(), 0);
        ctx.close();
        assert!(ctx.is_closed());
    }

    #[test]
    fn test_closed_context_refuses_frames_and_pins() {
        let (ctx, _heap, host) = context();
        host.define_class("com.example.Widget", None);
        let widget = host.new_instance("com.example.Widget");
        ctx.close();
        let before = host.live_refs();

        let err = ctx.enter_frame().unwrap_err();
        assert_eq!(err, ProxyError::ContextClosed(ctx.id().as_u64()));
        assert_eq!(err.script_error_name(), "InternalError");
        assert!(matches!(
            ctx.wrap_host_object(widget),
            Err(ConversionKind::Runtime(_))
        ));
        assert_eq!(ctx.handle_count(), 0);
        assert_eq!(host.live_refs(), before);
    }

    #[test]
    fn test_drop_releases_handles_without_close() {
        let (ctx, _heap, host) = context();
        host.define_class("com.example.Widget", None);
        let widget = host.new_instance("com.example.Widget");
        ctx.wrap_host_object(widget).unwrap();
        let before = host.live_refs();
        drop(ctx);
        assert_eq!(host.live_refs(), before - 1);
    }

    #[test]
    fn test_raise_builds_script_error() {
        let (ctx, heap, _host) = context();
        let err = ctx.raise(ProxyError::HostInvocation(HostException::new(
            "java.lang.IllegalArgumentException",
            "negative",
        )));
        let info = heap.error_info(err.value).unwrap();
        assert_eq!(info.name, "java.lang.IllegalArgumentException");
        assert_eq!(info.message, "negative");
        assert_eq!(info.stack, None);

        let err = ctx.raise(ProxyError::CallDepthExceeded(3));
        let info = heap.error_info(err.value).unwrap();
        assert_eq!(info.name, "InternalError");
        assert_eq!(info.message, "Call depth limit of 3 exceeded");
    }
}

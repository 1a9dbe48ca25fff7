//! Links scripted objects to the native side.
//!
//! Construction runs in two phases: the native base initializer consumes the full argument list,
//! then the class's optional `construct(args, kwargs)` runs with `this` bound to the base object.
//! The object only enters the heap once both phases succeed.

use std::rc::Rc;

use generational_arena::Index;
use log::{debug, trace, warn};
use rhai::{CallFnOptions, Dynamic, FnPtr, Map, Scope};

use crate::args::{BaseInit, ConstructionArgs};
use crate::class::ControllerClass;
use crate::dispatch::ControllerState;
use crate::error::{ControllerError, Result};
use crate::runtime::{RuntimeHandle, ScriptRuntime};

/// Class method run as the second construction phase.
pub const CONSTRUCTOR: &str = "construct";

/// A script-side reference to a scripted object. Keeps the object reachable while it lives.
pub struct ScriptObject {
    runtime: RuntimeHandle,
    index: Index,
    class: Rc<ControllerClass>,
}

/// Observes a scripted object without keeping it reachable.
#[derive(Clone)]
pub struct WeakObject {
    runtime: RuntimeHandle,
    index: Index,
    class: Rc<ControllerClass>,
}

/// Native ownership of a scripted object, held by exactly one controller proxy.
pub struct AdaptedHandle {
    runtime: RuntimeHandle,
    index: Index,
    class: Rc<ControllerClass>,
}

/// A resolved, invocable handler.
#[derive(Debug, Clone)]
pub enum Handler {
    /// A class method, with the parameter counts it is defined for.
    Method { name: String, arities: Vec<usize> },
    /// A function pointer or closure stored as an instance attribute.
    Pointer(FnPtr),
}

pub fn instantiate(
    runtime: &RuntimeHandle,
    class: &Rc<ControllerClass>,
    args: ConstructionArgs,
) -> Result<ScriptObject> {
    let base = BaseInit::from_args(class.name(), &args)?;
    let mut this = Dynamic::from_map(base.into_object());

    let arities = class.method_arities(CONSTRUCTOR);
    if arities.contains(&2) {
        let call_args = vec![Dynamic::from_array(args.args_array()), Dynamic::from_map(args.kwargs_map())];
        let _ = call_script(runtime, class, &mut this, CONSTRUCTOR, call_args)?;
    } else if arities.contains(&0) {
        let _ = call_script(runtime, class, &mut this, CONSTRUCTOR, Vec::new())?;
    } else if !arities.is_empty() {
        return Err(ControllerError::HandlerSignature {
            class: class.name().to_string(),
            handler: CONSTRUCTOR.to_string(),
            expected: 2,
            found: arities,
        });
    }

    if !this.is_map() {
        return Err(ControllerError::InvalidObject {
            class: class.name().to_string(),
            reason: format!("{CONSTRUCTOR} replaced `this` with a {}", this.type_name()),
        });
    }

    let index = runtime.alloc(class.clone(), this);
    trace!("instantiated '{}' object", class.name());
    Ok(ScriptObject { runtime: runtime.clone(), index, class: class.clone() })
}

/// Transfers native ownership of `object` to a new handle. The script-side reference is
/// released once ownership is in place, so no moment exists where neither side holds it.
pub fn adapt(object: ScriptObject, owner: &str) -> Result<AdaptedHandle> {
    object.runtime.claim(object.index, owner)?;
    debug!("controller '{owner}' adopted '{}' object", object.class.name());
    Ok(AdaptedHandle { runtime: object.runtime.clone(), index: object.index, class: object.class.clone() })
}

/// Looks `name` up on the object, instance attributes first, then class methods.
///
/// An attribute that exists but holds anything other than a function pointer shadows the
/// class method and resolves to nothing.
pub fn resolve_handler(class: &ControllerClass, object: &Dynamic, name: &str) -> Option<Handler> {
    if let Some(map) = object.read_lock::<Map>() {
        if let Some(attr) = map.get(name) {
            let handler = attr.clone().try_cast::<FnPtr>().map(Handler::Pointer);
            if handler.is_none() {
                trace!("'{}' attribute '{name}' is a {}, not callable", class.name(), attr.type_name());
            }
            return handler;
        }
    }
    let arities = class.method_arities(name);
    (!arities.is_empty()).then(|| Handler::Method { name: name.to_string(), arities })
}

impl Handler {
    /// The script function the handler calls.
    pub fn name(&self) -> &str {
        match self {
            Handler::Method { name, .. } => name,
            Handler::Pointer(fn_ptr) => fn_ptr.fn_name(),
        }
    }
}

fn invoke_bound(
    runtime: &ScriptRuntime,
    class: &ControllerClass,
    this: &mut Dynamic,
    handler: &Handler,
    args: Vec<Dynamic>,
) -> Result<Dynamic> {
    match handler {
        Handler::Method { name, arities } => {
            if !arities.contains(&args.len()) {
                return Err(ControllerError::HandlerSignature {
                    class: class.name().to_string(),
                    handler: name.clone(),
                    expected: args.len(),
                    found: arities.clone(),
                });
            }
            call_script(runtime, class, this, name, args)
        }
        Handler::Pointer(fn_ptr) => {
            let mut full: Vec<Dynamic> = fn_ptr.curry().to_vec();
            full.extend(args.iter().cloned());
            if class.method_arities(fn_ptr.fn_name()).contains(&full.len()) {
                call_script(runtime, class, this, fn_ptr.fn_name(), full)
            } else {
                Ok(fn_ptr.call::<Dynamic>(runtime.engine(), class.ast(), args)?)
            }
        }
    }
}

fn call_script(
    runtime: &ScriptRuntime,
    class: &ControllerClass,
    this: &mut Dynamic,
    name: &str,
    args: Vec<Dynamic>,
) -> Result<Dynamic> {
    let mut scope = Scope::new();
    let options = CallFnOptions::new().eval_ast(false).rewind_scope(true).bind_this_ptr(this);
    Ok(runtime.engine().call_fn_with_options::<Dynamic>(options, &mut scope, class.ast(), name, args)?)
}

fn read_attr(runtime: &ScriptRuntime, index: Index, name: &str) -> Result<Option<Dynamic>> {
    runtime.with_entry(index, |_, value| value.read_lock::<Map>().and_then(|map| map.get(name).cloned()))
}

fn has_attr(runtime: &ScriptRuntime, index: Index, name: &str) -> Result<bool> {
    runtime.with_entry(index, |class, value| {
        value.read_lock::<Map>().map_or(false, |map| map.contains_key(name)) || class.has_method(name)
    })
}

fn write_attr(runtime: &ScriptRuntime, index: Index, name: &str, attr: Dynamic) -> Result<()> {
    let written = runtime.with_value_mut(index, |value| {
        if !value.is_map() {
            return Err(value.type_name());
        }
        if let Some(mut map) = value.write_lock::<Map>() {
            map.insert(name.into(), attr);
        }
        Ok(())
    })?;
    written.map_err(|found| ControllerError::InvalidObject {
        class: runtime.with_entry(index, |class, _| class.name().to_string()).unwrap_or_default(),
        reason: format!("cannot set '{name}' on a {found}"),
    })
}

fn read_attributes(runtime: &ScriptRuntime, index: Index) -> Result<Map> {
    runtime.with_entry(index, |_, value| value.read_lock::<Map>().map(|map| (*map).clone()).unwrap_or_default())
}

impl ScriptObject {
    pub fn class(&self) -> &Rc<ControllerClass> {
        &self.class
    }

    /// Identity set by base initialization.
    pub fn name(&self) -> Result<String> {
        Ok(self.attr("name")?.map(|name| name.to_string()).unwrap_or_default())
    }

    pub fn state(&self) -> ControllerState {
        match self.runtime.owner(self.index) {
            Some(_) => ControllerState::Attached,
            None => ControllerState::Unattached,
        }
    }

    pub fn attr(&self, name: &str) -> Result<Option<Dynamic>> {
        read_attr(&self.runtime, self.index, name)
    }

    /// True for instance attributes and class methods alike.
    pub fn has_attr(&self, name: &str) -> Result<bool> {
        has_attr(&self.runtime, self.index, name)
    }

    pub fn set_attr(&self, name: &str, value: impl Into<Dynamic>) -> Result<()> {
        write_attr(&self.runtime, self.index, name, value.into())
    }

    pub fn attributes(&self) -> Result<Map> {
        read_attributes(&self.runtime, self.index)
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject { runtime: self.runtime.clone(), index: self.index, class: self.class.clone() }
    }
}

impl Clone for ScriptObject {
    fn clone(&self) -> Self {
        self.runtime.retain_ref(self.index);
        Self { runtime: self.runtime.clone(), index: self.index, class: self.class.clone() }
    }
}

impl Drop for ScriptObject {
    fn drop(&mut self) {
        self.runtime.release_ref(self.index);
    }
}

impl std::fmt::Debug for ScriptObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptObject").field("class", &self.class.name()).field("index", &self.index).finish()
    }
}

impl WeakObject {
    pub fn is_alive(&self) -> bool {
        self.runtime.contains(self.index)
    }

    pub fn upgrade(&self) -> Option<ScriptObject> {
        self.runtime.retain_ref(self.index).then(|| ScriptObject {
            runtime: self.runtime.clone(),
            index: self.index,
            class: self.class.clone(),
        })
    }
}

impl AdaptedHandle {
    pub fn class(&self) -> &Rc<ControllerClass> {
        &self.class
    }

    pub fn resolve(&self, name: &str) -> Result<Option<Handler>> {
        self.runtime.with_entry(self.index, |class, value| resolve_handler(class, value, name))
    }

    /// Runs `handler` with `this` bound to the owned object. The object is put back whether or
    /// not the handler fails.
    ///
    /// A handler that rebinds `this` to anything but an object map would erase the object's
    /// identity, so the object is restored to its state before the call and the call fails with
    /// [`ControllerError::InvalidObject`]. A script error raised by the handler still wins.
    pub fn invoke(&self, handler: &Handler, args: Vec<Dynamic>) -> Result<Dynamic> {
        let (class, mut this) = self.runtime.take_value(self.index)?;
        let before = this.clone();
        let result = invoke_bound(&self.runtime, &class, &mut this, handler, args);
        if this.is_map() {
            self.runtime.restore_value(self.index, this);
            return result;
        }
        warn!("'{}' handler '{}' replaced `this` with a {}", class.name(), handler.name(), this.type_name());
        self.runtime.restore_value(self.index, before);
        let _ = result?;
        Err(ControllerError::InvalidObject {
            class: class.name().to_string(),
            reason: format!("handler '{}' replaced `this` with a {}", handler.name(), this.type_name()),
        })
    }

    pub fn attr(&self, name: &str) -> Result<Option<Dynamic>> {
        read_attr(&self.runtime, self.index, name)
    }

    pub fn has_attr(&self, name: &str) -> Result<bool> {
        has_attr(&self.runtime, self.index, name)
    }

    pub fn set_attr(&self, name: &str, value: Dynamic) -> Result<()> {
        write_attr(&self.runtime, self.index, name, value)
    }

    pub fn attributes(&self) -> Result<Map> {
        read_attributes(&self.runtime, self.index)
    }

    /// A script-side reference to the owned object.
    pub fn script_object(&self) -> Option<ScriptObject> {
        WeakObject { runtime: self.runtime.clone(), index: self.index, class: self.class.clone() }.upgrade()
    }
}

impl Drop for AdaptedHandle {
    fn drop(&mut self) {
        self.runtime.release_owner(self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ScriptRuntime;

    const SHADOWED: &str = r#"
        fn construct() {
            this.onAnimateEndEvent = "not a method";
        }
        fn onAnimateEndEvent(event) { }
        fn onEvent(event) { }
    "#;

    #[test]
    fn string_attribute_shadows_class_method() {
        let runtime = ScriptRuntime::new();
        let class = runtime.compile_class("Shadowed", SHADOWED).expect("compile");
        let object = instantiate(&runtime, &class, ConstructionArgs::new()).expect("instantiate");
        let handle = adapt(object, "controller").expect("adapt");
        assert!(handle.resolve("onAnimateEndEvent").expect("resolve").is_none());
        assert!(matches!(handle.resolve("onEvent").expect("resolve"), Some(Handler::Method { .. })));
        assert!(handle.resolve("onAnimateBeginEvent").expect("resolve").is_none());
    }

    #[test]
    fn function_pointer_attribute_resolves() {
        let runtime = ScriptRuntime::new();
        let class = runtime.compile_class("Pointer", "fn target(event) { this.hit = true; }").expect("compile");
        let object = instantiate(&runtime, &class, ConstructionArgs::new()).expect("instantiate");
        object.set_attr("onEvent", FnPtr::new("target").expect("fn ptr")).expect("set attr");
        let handle = adapt(object, "controller").expect("adapt");
        let handler = handle.resolve("onEvent").expect("resolve").expect("handler");
        let _ = handle.invoke(&handler, vec![Dynamic::UNIT]).expect("invoke");
        assert_eq!(handle.attr("hit").expect("attr").and_then(|v| v.as_bool().ok()), Some(true));
    }

    #[test]
    fn constructor_runs_after_base_init() {
        let runtime = ScriptRuntime::new();
        let class = runtime
            .compile_class("Ordered", r#"fn construct(args, kwargs) { this.seen = this.name + ":" + args.len(); }"#)
            .expect("compile");
        let args = ConstructionArgs::new().positional("controller").positional(1 as rhai::INT);
        let object = instantiate(&runtime, &class, args).expect("instantiate");
        assert_eq!(object.attr("seen").expect("attr").map(|v| v.to_string()), Some("controller:2".to_string()));
    }

    #[test]
    fn failed_construction_leaves_nothing_behind() {
        let runtime = ScriptRuntime::new();
        let class = runtime.compile_class("Failing", r#"fn construct() { throw "nope"; }"#).expect("compile");
        let err = instantiate(&runtime, &class, ConstructionArgs::new()).unwrap_err();
        assert!(err.as_script().is_some(), "constructor error should pass through, got {err:?}");
        assert_eq!(runtime.live_objects(), 0);
    }

    #[test]
    fn unsupported_constructor_arity_is_rejected() {
        let runtime = ScriptRuntime::new();
        let class = runtime.compile_class("Odd", "fn construct(only) { }").expect("compile");
        let err = instantiate(&runtime, &class, ConstructionArgs::new()).unwrap_err();
        assert!(matches!(err, ControllerError::HandlerSignature { .. }), "got {err:?}");
    }

    #[test]
    fn handler_rebinding_this_restores_the_object() {
        let runtime = ScriptRuntime::new();
        let class = runtime
            .compile_class("Rebinder", "fn construct() { this.count = 1; } fn init() { this.count += 1; this = 42; }")
            .expect("compile");
        let object = instantiate(&runtime, &class, ConstructionArgs::named_as("keeper")).expect("instantiate");
        let handle = adapt(object, "keeper").expect("adapt");
        let handler = handle.resolve("init").expect("resolve").expect("handler");

        let err = handle.invoke(&handler, Vec::new()).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidObject { .. }), "got {err:?}");
        assert_eq!(handle.attr("count").expect("attr").and_then(|v| v.as_int().ok()), Some(1));
        assert_eq!(handle.attr("name").expect("attr").map(|v| v.to_string()), Some("keeper".to_string()));
    }

    #[test]
    fn constructor_rebinding_this_is_rejected() {
        let runtime = ScriptRuntime::new();
        let class = runtime.compile_class("Scalar", "fn construct() { this = 1; }").expect("compile");
        let err = instantiate(&runtime, &class, ConstructionArgs::new()).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidObject { .. }), "got {err:?}");
        assert_eq!(runtime.live_objects(), 0);
    }

    #[test]
    fn writes_to_a_non_map_object_fail() {
        let runtime = ScriptRuntime::new();
        let class = runtime.compile_class("Empty", "").expect("compile");
        let index = runtime.alloc(class, Dynamic::UNIT);
        let err = write_attr(&runtime, index, "inited", Dynamic::from(7 as rhai::INT)).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidObject { ref class, .. } if class == "Empty"), "got {err:?}");
    }

    #[test]
    fn weak_upgrade_fails_after_collection() {
        let runtime = ScriptRuntime::new();
        let class = runtime.compile_class("Empty", "").expect("compile");
        let object = instantiate(&runtime, &class, ConstructionArgs::new()).expect("instantiate");
        let weak = object.downgrade();
        drop(object);
        assert!(weak.is_alive());
        assert_eq!(runtime.collect_garbage(), 1);
        assert!(weak.upgrade().is_none());
    }
}

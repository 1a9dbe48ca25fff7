use std::cell::RefCell;
use std::fs;
use std::mem;
use std::path::Path;
use std::rc::Rc;

use generational_arena::{Arena, Index};
use log::{debug, info, trace};
use rhai::{Dynamic, Engine};

use crate::class::ControllerClass;
use crate::config::EngineConfig;
use crate::error::{ControllerError, Result};

pub type RuntimeHandle = Rc<ScriptRuntime>;

/// One scripted object living in the runtime heap.
struct HeapEntry {
    class: Rc<ControllerClass>,
    value: Dynamic,
    /// References held from the script side (`ScriptObject` values).
    script_refs: usize,
    /// Name of the controller proxy that owns the object, if any.
    owner: Option<String>,
}

impl HeapEntry {
    fn reachable(&self) -> bool {
        self.script_refs > 0 || self.owner.is_some()
    }
}

/// The embedding runtime: a rhai engine plus the heap scripted objects live in.
///
/// Dropping a script-side reference never frees an object by itself. Unreachable objects stay
/// in the heap until [`ScriptRuntime::collect_garbage`] sweeps them, while an object owned by a
/// controller proxy is never swept.
pub struct ScriptRuntime {
    engine: Engine,
    heap: RefCell<Arena<HeapEntry>>,
    logs: Rc<RefCell<Vec<String>>>,
}

impl ScriptRuntime {
    pub fn new() -> RuntimeHandle {
        Self::with_config(&EngineConfig::default())
    }

    pub fn with_config(config: &EngineConfig) -> RuntimeHandle {
        let logs = Rc::new(RefCell::new(Vec::new()));
        let mut engine = Engine::new();
        engine.set_fast_operators(true);
        config.apply(&mut engine);
        register_api(&mut engine, &logs);
        Rc::new(Self { engine, heap: RefCell::new(Arena::new()), logs })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn compile_class(&self, name: &str, source: &str) -> Result<Rc<ControllerClass>> {
        let ast = self
            .engine
            .compile(source)
            .map_err(|source| ControllerError::Compile { class: name.to_string(), source })?;
        debug!("compiled controller class '{name}'");
        Ok(Rc::new(ControllerClass::new(name.to_string(), ast, None)))
    }

    /// Loads a class from a script file. The class takes the file stem as its name.
    pub fn load_class(&self, path: impl AsRef<Path>) -> Result<Rc<ControllerClass>> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|source| ControllerError::Io { path: path.display().to_string(), source })?;
        let name = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
        let ast = self.engine.compile(source).map_err(|source| ControllerError::Compile { class: name.clone(), source })?;
        debug!("loaded controller class '{name}' from {}", path.display());
        Ok(Rc::new(ControllerClass::new(name, ast, Some(path.to_path_buf()))))
    }

    /// Drains the lines scripts wrote through `log` and `print`.
    pub fn take_logs(&self) -> Vec<String> {
        mem::take(&mut *self.logs.borrow_mut())
    }

    pub fn live_objects(&self) -> usize {
        self.heap.borrow().len()
    }

    /// Sweeps every object with neither script references nor a native owner.
    pub fn collect_garbage(&self) -> usize {
        let mut heap = self.heap.borrow_mut();
        let garbage: Vec<Index> =
            heap.iter().filter(|(_, entry)| !entry.reachable()).map(|(index, _)| index).collect();
        for index in &garbage {
            if let Some(entry) = heap.remove(*index) {
                trace!("collected unreachable '{}' object", entry.class.name());
            }
        }
        if !garbage.is_empty() {
            debug!("garbage collection swept {} object(s), {} live", garbage.len(), heap.len());
        }
        garbage.len()
    }

    pub(crate) fn alloc(&self, class: Rc<ControllerClass>, value: Dynamic) -> Index {
        self.heap.borrow_mut().insert(HeapEntry { class, value, script_refs: 1, owner: None })
    }

    pub(crate) fn contains(&self, index: Index) -> bool {
        self.heap.borrow().contains(index)
    }

    pub(crate) fn retain_ref(&self, index: Index) -> bool {
        match self.heap.borrow_mut().get_mut(index) {
            Some(entry) => {
                entry.script_refs += 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn release_ref(&self, index: Index) {
        if let Some(entry) = self.heap.borrow_mut().get_mut(index) {
            entry.script_refs = entry.script_refs.saturating_sub(1);
        }
    }

    pub(crate) fn owner(&self, index: Index) -> Option<String> {
        self.heap.borrow().get(index).and_then(|entry| entry.owner.clone())
    }

    /// Gives `owner` exclusive native ownership of the object.
    pub(crate) fn claim(&self, index: Index, owner: &str) -> Result<()> {
        let mut heap = self.heap.borrow_mut();
        let entry = heap.get_mut(index).ok_or(ControllerError::Collected)?;
        if let Some(existing) = &entry.owner {
            return Err(ControllerError::AlreadyAttached {
                class: entry.class.name().to_string(),
                owner: existing.clone(),
            });
        }
        entry.owner = Some(owner.to_string());
        Ok(())
    }

    /// Drops native ownership. An object nothing else refers to goes with its owner.
    pub(crate) fn release_owner(&self, index: Index) {
        let mut heap = self.heap.borrow_mut();
        let Some(entry) = heap.get_mut(index) else { return };
        entry.owner = None;
        if entry.script_refs == 0 {
            heap.remove(index);
        }
    }

    pub(crate) fn with_entry<R>(
        &self,
        index: Index,
        f: impl FnOnce(&Rc<ControllerClass>, &Dynamic) -> R,
    ) -> Result<R> {
        let heap = self.heap.borrow();
        let entry = heap.get(index).ok_or(ControllerError::Collected)?;
        Ok(f(&entry.class, &entry.value))
    }

    pub(crate) fn with_value_mut<R>(&self, index: Index, f: impl FnOnce(&mut Dynamic) -> R) -> Result<R> {
        let mut heap = self.heap.borrow_mut();
        let entry = heap.get_mut(index).ok_or(ControllerError::Collected)?;
        Ok(f(&mut entry.value))
    }

    /// Moves the object out of the heap for the duration of a handler call so the heap is not
    /// borrowed while script code runs. Must be paired with [`Self::restore_value`].
    pub(crate) fn take_value(&self, index: Index) -> Result<(Rc<ControllerClass>, Dynamic)> {
        let mut heap = self.heap.borrow_mut();
        let entry = heap.get_mut(index).ok_or(ControllerError::Collected)?;
        Ok((entry.class.clone(), mem::replace(&mut entry.value, Dynamic::UNIT)))
    }

    pub(crate) fn restore_value(&self, index: Index, value: Dynamic) {
        if let Some(entry) = self.heap.borrow_mut().get_mut(index) {
            entry.value = value;
        }
    }
}

fn register_api(engine: &mut Engine, logs: &Rc<RefCell<Vec<String>>>) {
    let sink = logs.clone();
    engine.register_fn("log", move |message: Dynamic| push_log(&sink, message.to_string()));
    let sink = logs.clone();
    engine.on_print(move |text| push_log(&sink, text.to_string()));
}

fn push_log(sink: &RefCell<Vec<String>>, line: String) {
    info!(target: "script", "{line}");
    sink.borrow_mut().push(line);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_and_print_are_captured() {
        let runtime = ScriptRuntime::new();
        runtime.engine().run(r#"log("one"); print("two"); log(3);"#).expect("script should run");
        assert_eq!(runtime.take_logs(), vec!["one".to_string(), "two".to_string(), "3".to_string()]);
        assert!(runtime.take_logs().is_empty(), "logs should drain");
    }

    #[test]
    fn compile_errors_name_the_class() {
        let runtime = ScriptRuntime::new();
        let err = runtime.compile_class("Broken", "fn init( {").unwrap_err();
        assert!(matches!(&err, ControllerError::Compile { class, .. } if class == "Broken"), "got {err:?}");
    }

    #[test]
    fn unreachable_objects_wait_for_collection() {
        let runtime = ScriptRuntime::new();
        let class = runtime.compile_class("Empty", "").expect("compile");
        let index = runtime.alloc(class, Dynamic::UNIT);
        runtime.release_ref(index);
        assert_eq!(runtime.live_objects(), 1, "release alone must not free");
        assert_eq!(runtime.collect_garbage(), 1);
        assert!(!runtime.contains(index));
    }

    #[test]
    fn owned_objects_survive_collection() {
        let runtime = ScriptRuntime::new();
        let class = runtime.compile_class("Empty", "").expect("compile");
        let index = runtime.alloc(class, Dynamic::UNIT);
        runtime.claim(index, "controller").expect("claim");
        runtime.release_ref(index);
        assert_eq!(runtime.collect_garbage(), 0);
        assert!(runtime.contains(index));
        assert!(runtime.claim(index, "other").is_err(), "ownership is exclusive");
        runtime.release_owner(index);
        assert!(!runtime.contains(index), "owner release frees an otherwise unreferenced object");
    }
}

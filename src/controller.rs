use log::debug;
use rhai::{Dynamic, Map};

use crate::adapter::{adapt, AdaptedHandle, ScriptObject};
use crate::dispatch::{dispatch_event, dispatch_lifecycle, ControllerState, Dispatch, Lifecycle};
use crate::error::Result;
use crate::events::Event;

/// Class name reported by controllers without a scripted object.
pub const DEFAULT_CLASS: &str = "Controller";

/// The native object a scene stores for a controller.
///
/// A scripted controller owns its object exclusively: the object stays alive for as long as the
/// proxy does, whatever the script side still refers to, and goes away with it.
pub struct ControllerProxy {
    name: String,
    class_name: String,
    listening: bool,
    state: ControllerState,
    handle: Option<AdaptedHandle>,
}

impl ControllerProxy {
    /// A controller of the default class; `init`, `reinit` and events do nothing.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_name: DEFAULT_CLASS.to_string(),
            listening: true,
            state: ControllerState::Attached,
            handle: None,
        }
    }

    pub fn adopt(object: ScriptObject) -> Result<Self> {
        let name = object.name()?;
        let class_name = object.class().name().to_string();
        let handle = adapt(object, &name)?;
        Ok(Self { name, class_name, listening: true, state: ControllerState::Attached, handle: Some(handle) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_scripted(&self) -> bool {
        self.handle.is_some()
    }

    /// Scripted controllers read their `listening` attribute on every call, so handlers can
    /// switch it at runtime.
    pub fn is_listening(&self) -> bool {
        match &self.handle {
            Some(handle) => match handle.attr("listening") {
                Ok(Some(value)) => value.as_bool().unwrap_or(true),
                _ => true,
            },
            None => self.listening,
        }
    }

    pub fn set_listening(&mut self, listening: bool) -> Result<()> {
        match &self.handle {
            Some(handle) => handle.set_attr("listening", listening.into()),
            None => {
                self.listening = listening;
                Ok(())
            }
        }
    }

    /// # Panics
    ///
    /// Panics if the controller was destroyed.
    pub fn init(&mut self) -> Result<()> {
        self.ensure_alive("init");
        if let Some(handle) = &self.handle {
            dispatch_lifecycle(handle, Lifecycle::Init)?;
        }
        self.state = ControllerState::Initialized;
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the controller was destroyed.
    pub fn reinit(&mut self) -> Result<()> {
        self.ensure_alive("reinit");
        if let Some(handle) = &self.handle {
            dispatch_lifecycle(handle, Lifecycle::Reinit)?;
        }
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the controller was destroyed.
    pub fn receive_event(&mut self, event: &Event) -> Result<Dispatch> {
        self.ensure_alive("receive_event");
        if !self.is_listening() {
            return Ok(Dispatch::Ignored);
        }
        let Some(handle) = &self.handle else { return Ok(Dispatch::Ignored) };
        let resume = self.state;
        self.state = ControllerState::Stepping;
        let outcome = dispatch_event(handle, event);
        self.state = resume;
        outcome
    }

    /// Releases the scripted object. Any later `init`, `reinit` or event delivery panics.
    pub fn destroy(&mut self) {
        if self.state == ControllerState::Destroyed {
            return;
        }
        debug!("destroying controller '{}'", self.name);
        self.handle = None;
        self.state = ControllerState::Destroyed;
    }

    pub fn attr(&self, name: &str) -> Option<Dynamic> {
        match &self.handle {
            Some(handle) => handle.attr(name).ok().flatten(),
            None => match name {
                "name" => Some(self.name.clone().into()),
                "listening" => Some(self.listening.into()),
                _ => None,
            },
        }
    }

    pub fn has_attr(&self, name: &str) -> bool {
        match &self.handle {
            Some(handle) => handle.has_attr(name).unwrap_or(false),
            None => matches!(name, "name" | "listening"),
        }
    }

    /// Sets an instance attribute. Has no effect on a default-class controller.
    pub fn set_attr(&self, name: &str, value: impl Into<Dynamic>) -> Result<()> {
        match &self.handle {
            Some(handle) => handle.set_attr(name, value.into()),
            None => Ok(()),
        }
    }

    pub fn attributes(&self) -> Map {
        match &self.handle {
            Some(handle) => handle.attributes().unwrap_or_default(),
            None => {
                let mut map = Map::new();
                map.insert("name".into(), self.name.clone().into());
                map.insert("listening".into(), self.listening.into());
                map
            }
        }
    }

    /// A script-side reference to the owned object, if the controller is scripted.
    pub fn script_object(&self) -> Option<ScriptObject> {
        self.handle.as_ref().and_then(AdaptedHandle::script_object)
    }

    fn ensure_alive(&self, operation: &str) {
        if self.state == ControllerState::Destroyed {
            panic!("{operation} called on destroyed controller '{}'", self.name);
        }
    }
}

impl std::fmt::Debug for ControllerProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerProxy")
            .field("name", &self.name)
            .field("class", &self.class_name)
            .field("state", &self.state)
            .finish()
    }
}

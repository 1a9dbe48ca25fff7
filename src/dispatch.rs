use log::trace;
use rhai::Dynamic;

use crate::adapter::AdaptedHandle;
use crate::events::{Event, FALLBACK_HANDLER};
use crate::error::Result;

/// Lifecycle of a single controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// A scripted object no proxy owns yet.
    Unattached,
    Attached,
    Initialized,
    /// An event is being delivered.
    Stepping,
    Destroyed,
}

impl ControllerState {
    pub fn label(self) -> &'static str {
        match self {
            ControllerState::Unattached => "unattached",
            ControllerState::Attached => "attached",
            ControllerState::Initialized => "initialized",
            ControllerState::Stepping => "stepping",
            ControllerState::Destroyed => "destroyed",
        }
    }
}

/// Outcome of delivering one event to one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler ran and returned `true`; propagation stops here.
    Handled,
    Delivered,
    /// Neither the event's handler nor the fallback was callable.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Init,
    Reinit,
}

impl Lifecycle {
    pub fn handler_name(self) -> &'static str {
        match self {
            Lifecycle::Init => "init",
            Lifecycle::Reinit => "reinit",
        }
    }
}

/// Delivers `event`: its own handler if callable, otherwise `onEvent`, otherwise nothing.
///
/// Handlers are resolved on every call since attributes may be rebound between steps.
pub fn dispatch_event(handle: &AdaptedHandle, event: &Event) -> Result<Dispatch> {
    let primary = event.kind().handler_name();
    let handler = match handle.resolve(primary)? {
        Some(handler) => handler,
        None => match handle.resolve(FALLBACK_HANDLER)? {
            Some(handler) => {
                trace!("'{}' has no callable {primary}, falling back to {FALLBACK_HANDLER}", handle.class().name());
                handler
            }
            None => return Ok(Dispatch::Ignored),
        },
    };
    let returned = handle.invoke(&handler, vec![event.to_dynamic()])?;
    Ok(if returned.as_bool() == Ok(true) { Dispatch::Handled } else { Dispatch::Delivered })
}

/// Runs the `init`/`reinit` handler if the object has a callable one. Returns whether it ran.
pub fn dispatch_lifecycle(handle: &AdaptedHandle, stage: Lifecycle) -> Result<bool> {
    match handle.resolve(stage.handler_name())? {
        Some(handler) => {
            let _ = handle.invoke(&handler, Vec::<Dynamic>::new())?;
            Ok(true)
        }
        None => Ok(false),
    }
}

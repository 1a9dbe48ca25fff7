//! Drives a scene: one-time setup and discrete steps.

use log::trace;
use rhai::FLOAT;

use crate::dispatch::Dispatch;
use crate::error::{ControllerError, Result};
use crate::events::Event;
use crate::scene::Node;

/// Initializes every controller under `root`, then announces `SimulationInitDone`.
pub fn init(root: &mut Node) -> Result<()> {
    root.init()?;
    root.propagate_event(&Event::init_done())?;
    Ok(())
}

/// Runs one step: `AnimateBegin`, advance time by `dt`, `AnimateEnd`.
///
/// A failing handler ends the step at once and its error is returned unchanged.
pub fn animate(root: &mut Node, dt: FLOAT) -> Result<()> {
    if !root.is_initialized() {
        return Err(ControllerError::NotInitialized { node: root.name().to_string() });
    }
    let loop_name = root.animation_loop().map(|component| component.type_name().to_string());
    trace!(
        "step {} of '{}' with {} (dt={dt})",
        root.steps(),
        root.name(),
        loop_name.as_deref().unwrap_or("DefaultAnimationLoop")
    );
    root.propagate_event(&Event::animate_begin(dt, root.time()))?;
    root.advance(dt);
    root.propagate_event(&Event::animate_end(dt, root.time()))?;
    Ok(())
}

pub fn send_event(root: &mut Node, event: &Event) -> Result<Dispatch> {
    root.propagate_event(event)
}

//! Native controller proxies for scripted simulation controllers.
//!
//! A scene node stores [`controller::ControllerProxy`] values. Each proxy owns one scripted
//! object written in rhai and forwards the kernel's lifecycle calls and simulation events to it.

pub mod adapter;
pub mod args;
pub mod class;
pub mod cli;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod harness;
pub mod runtime;
pub mod scene;
pub mod simulation;

pub use adapter::{instantiate, ScriptObject, WeakObject};
pub use args::ConstructionArgs;
pub use controller::ControllerProxy;
pub use error::ControllerError;
pub use events::{Event, EventKind};
pub use runtime::{RuntimeHandle, ScriptRuntime};
pub use scene::{Node, ObjectId};

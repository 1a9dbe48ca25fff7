use rhai::{Dynamic, ImmutableString, Map, FLOAT};
use std::fmt;

/// Handler every event falls back to when its own handler is missing or not callable.
pub const FALLBACK_HANDLER: &str = "onEvent";

/// The events the simulation kernel can raise, in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Generic,
    AnimateBegin,
    AnimateEnd,
    SimulationInitDone,
    KeyPressed,
    KeyReleased,
    Script,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Generic,
        EventKind::AnimateBegin,
        EventKind::AnimateEnd,
        EventKind::SimulationInitDone,
        EventKind::KeyPressed,
        EventKind::KeyReleased,
        EventKind::Script,
    ];

    /// Name used by fixtures and the command line.
    pub fn canonical_name(self) -> &'static str {
        match self {
            EventKind::Generic => "event",
            EventKind::AnimateBegin => "begin-step",
            EventKind::AnimateEnd => "end-step",
            EventKind::SimulationInitDone => "init-done",
            EventKind::KeyPressed => "key-pressed",
            EventKind::KeyReleased => "key-released",
            EventKind::Script => "script",
        }
    }

    /// Kernel-side class name, exposed to handlers as `event.type`.
    pub fn class_name(self) -> &'static str {
        match self {
            EventKind::Generic => "Event",
            EventKind::AnimateBegin => "AnimateBeginEvent",
            EventKind::AnimateEnd => "AnimateEndEvent",
            EventKind::SimulationInitDone => "SimulationInitDoneEvent",
            EventKind::KeyPressed => "KeypressedEvent",
            EventKind::KeyReleased => "KeyreleasedEvent",
            EventKind::Script => "ScriptEvent",
        }
    }

    pub fn handler_name(self) -> &'static str {
        match self {
            EventKind::Generic => FALLBACK_HANDLER,
            EventKind::AnimateBegin => "onAnimateBeginEvent",
            EventKind::AnimateEnd => "onAnimateEndEvent",
            EventKind::SimulationInitDone => "onSimulationInitDoneEvent",
            EventKind::KeyPressed => "onKeypressedEvent",
            EventKind::KeyReleased => "onKeyreleasedEvent",
            EventKind::Script => "onScriptEvent",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.canonical_name() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// A raised event together with the payload handed to scripted handlers.
#[derive(Debug, Clone)]
pub struct Event {
    kind: EventKind,
    payload: Map,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self { kind, payload: Map::new() }
    }

    pub fn animate_begin(dt: FLOAT, time: FLOAT) -> Self {
        Self::new(EventKind::AnimateBegin).with("dt", dt).with("time", time)
    }

    pub fn animate_end(dt: FLOAT, time: FLOAT) -> Self {
        Self::new(EventKind::AnimateEnd).with("dt", dt).with("time", time)
    }

    pub fn init_done() -> Self {
        Self::new(EventKind::SimulationInitDone)
    }

    pub fn key_pressed(key: char) -> Self {
        Self::new(EventKind::KeyPressed).with("key", key)
    }

    pub fn key_released(key: char) -> Self {
        Self::new(EventKind::KeyReleased).with("key", key)
    }

    /// A user-named event; the name travels in the payload, the handler stays `onScriptEvent`.
    pub fn script(name: impl Into<ImmutableString>, data: Dynamic) -> Self {
        Self::new(EventKind::Script).with("eventName", name.into()).with("data", data)
    }

    pub fn generic(data: Dynamic) -> Self {
        Self::new(EventKind::Generic).with("data", data)
    }

    pub fn with(mut self, key: &str, value: impl Into<Dynamic>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &Map {
        &self.payload
    }

    /// Builds the map a handler receives. Each delivery gets a fresh copy.
    pub fn to_dynamic(&self) -> Dynamic {
        let mut map = self.payload.clone();
        map.insert("type".into(), self.kind.class_name().into());
        map.insert("name".into(), self.kind.canonical_name().into());
        map.insert("isHandled".into(), false.into());
        Dynamic::from_map(map)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.class_name())?;
        for (key, value) in &self.payload {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

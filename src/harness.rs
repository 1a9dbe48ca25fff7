use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;
use std::rc::Rc;

use anyhow::{anyhow, bail, Context, Result};
use log::warn;
use rhai::{Dynamic, FnPtr};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::instantiate;
use crate::args::ConstructionArgs;
use crate::class::ControllerClass;
use crate::config::BridgeConfig;
use crate::controller::ControllerProxy;
use crate::error::ControllerError;
use crate::events::{Event, EventKind};
use crate::runtime::{RuntimeHandle, ScriptRuntime};
use crate::scene::Node;
use crate::simulation;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessFixture {
    #[serde(default)]
    pub steps: Option<usize>,
    #[serde(default)]
    pub dt: Option<f64>,
    #[serde(default)]
    pub collect_garbage_each_step: Option<bool>,
    pub scene: FixtureNode,
    #[serde(default)]
    pub events: Vec<FixtureEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureNode {
    pub name: String,
    #[serde(default)]
    pub objects: Vec<FixtureObject>,
    #[serde(default)]
    pub children: Vec<FixtureNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixtureObject {
    Component {
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        name: String,
    },
    Controller {
        /// Script defining the class; without one the controller uses the default class.
        #[serde(default)]
        script: Option<String>,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default)]
        kwargs: serde_json::Map<String, Value>,
    },
}

/// An event sent to the whole scene right before the step it is scheduled for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureEvent {
    pub step: usize,
    pub event: String,
    #[serde(default)]
    pub key: Option<char>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessOutput {
    pub steps: usize,
    pub dt: f64,
    pub init_logs: Vec<String>,
    pub results: Vec<StepResult>,
    pub controllers: Vec<ControllerSummary>,
    pub garbage: GarbageSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub step: usize,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerSummary {
    pub path: String,
    pub name: String,
    pub class: String,
    pub state: String,
    /// Instance attributes holding data. Function pointers are left out.
    pub attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GarbageSummary {
    pub collected: usize,
    pub live_objects: usize,
}

pub fn run_fixture(fixture: &HarnessFixture) -> Result<HarnessOutput> {
    run_fixture_with_config(fixture, &BridgeConfig::default())
}

pub fn run_fixture_with_config(fixture: &HarnessFixture, config: &BridgeConfig) -> Result<HarnessOutput> {
    let steps = fixture.steps.unwrap_or(config.simulation.steps);
    let dt = fixture.dt.unwrap_or(config.simulation.dt);
    let collect_each_step = fixture.collect_garbage_each_step.unwrap_or(config.simulation.collect_garbage_each_step);

    for late in fixture.events.iter().filter(|scheduled| scheduled.step >= steps) {
        warn!("{} event scheduled for step {} never fires, the fixture runs {steps} step(s)", late.event, late.step);
    }

    let runtime = ScriptRuntime::with_config(&config.engine);
    let mut classes = HashMap::new();
    let mut root = build_node(&runtime, &mut classes, &fixture.scene)?;

    simulation::init(&mut root).map_err(bridge_error).context("initializing scene")?;
    let init_logs = runtime.take_logs();

    let mut collected = 0;
    let mut results = Vec::with_capacity(steps);
    for step in 0..steps {
        for scheduled in fixture.events.iter().filter(|scheduled| scheduled.step == step) {
            let event = scheduled.to_event()?;
            simulation::send_event(&mut root, &event)
                .map_err(bridge_error)
                .with_context(|| format!("sending {} before step {step}", scheduled.event))?;
        }
        simulation::animate(&mut root, dt).map_err(bridge_error).with_context(|| format!("running step {step}"))?;
        if collect_each_step {
            collected += runtime.collect_garbage();
        }
        results.push(StepResult { step, logs: runtime.take_logs() });
    }

    let controllers = root
        .controller_paths()
        .into_iter()
        .map(|(path, controller)| summarize_controller(path, controller))
        .collect::<Result<Vec<_>>>()?;
    let garbage = GarbageSummary { collected, live_objects: runtime.live_objects() };

    Ok(HarnessOutput { steps, dt, init_logs, results, controllers, garbage })
}

pub fn load_fixture<P: AsRef<Path>>(path: P) -> Result<HarnessFixture> {
    let file = File::open(path.as_ref()).with_context(|| format!("opening fixture '{}'", path.as_ref().display()))?;
    Ok(serde_json::from_reader(file).with_context(|| "parsing fixture JSON")?)
}

impl FixtureEvent {
    pub fn to_event(&self) -> Result<Event> {
        let kind = EventKind::from_name(&self.event)
            .ok_or_else(|| bridge_error(ControllerError::UnknownEvent(self.event.clone())))?;
        let data = to_dynamic(&self.data)?;
        Ok(match kind {
            EventKind::KeyPressed | EventKind::KeyReleased => {
                let Some(key) = self.key else { bail!("{} event at step {} needs a key", self.event, self.step) };
                if kind == EventKind::KeyPressed {
                    Event::key_pressed(key)
                } else {
                    Event::key_released(key)
                }
            }
            EventKind::Script => Event::script(self.name.clone().unwrap_or_default(), data),
            EventKind::Generic => Event::generic(data),
            other => Event::new(other),
        })
    }
}

fn build_node(
    runtime: &RuntimeHandle,
    classes: &mut HashMap<String, Rc<ControllerClass>>,
    fixture: &FixtureNode,
) -> Result<Node> {
    let mut node = Node::new(fixture.name.clone());
    for object in &fixture.objects {
        match object {
            FixtureObject::Component { type_name, name } => {
                node.create_object(type_name, name.clone()).map_err(bridge_error)?;
            }
            FixtureObject::Controller { script: None, args, kwargs } => {
                let args = ConstructionArgs::from_json(args, kwargs).map_err(bridge_error)?;
                let base = crate::args::BaseInit::from_args(crate::controller::DEFAULT_CLASS, &args)
                    .map_err(bridge_error)?;
                let mut controller = ControllerProxy::new(base.name);
                controller.set_listening(base.listening).map_err(bridge_error)?;
                node.add_object(controller);
            }
            FixtureObject::Controller { script: Some(script), args, kwargs } => {
                let class = match classes.get(script) {
                    Some(class) => class.clone(),
                    None => {
                        let class = runtime
                            .load_class(script)
                            .map_err(bridge_error)
                            .with_context(|| format!("loading controller script '{script}'"))?;
                        classes.insert(script.clone(), class.clone());
                        class
                    }
                };
                let args = ConstructionArgs::from_json(args, kwargs).map_err(bridge_error)?;
                let object = instantiate(runtime, &class, args)
                    .map_err(bridge_error)
                    .with_context(|| format!("constructing '{}'", class.name()))?;
                node.add_controller(object).map_err(bridge_error)?;
            }
        }
    }
    for child in &fixture.children {
        node.add_child(build_node(runtime, classes, child)?);
    }
    Ok(node)
}

fn summarize_controller(path: String, controller: &ControllerProxy) -> Result<ControllerSummary> {
    let mut attributes = BTreeMap::new();
    for (key, value) in controller.attributes() {
        if value.is::<FnPtr>() {
            continue;
        }
        attributes.insert(key.to_string(), from_dynamic(&value).with_context(|| format!("attribute '{key}' of {path}"))?);
    }
    Ok(ControllerSummary {
        path,
        name: controller.name().to_string(),
        class: controller.class_name().to_string(),
        state: controller.state().label().to_string(),
        attributes,
    })
}

fn to_dynamic(value: &Value) -> Result<Dynamic> {
    rhai::serde::to_dynamic(value).map_err(|err| anyhow!("{err}"))
}

fn from_dynamic(value: &Dynamic) -> Result<Value> {
    rhai::serde::from_dynamic(value).map_err(|err| anyhow!("{err}"))
}

/// Script errors hold `Rc`s and cannot cross into `anyhow` as-is.
fn bridge_error(err: ControllerError) -> anyhow::Error {
    anyhow!("{err}")
}

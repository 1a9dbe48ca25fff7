use std::ops::ControlFlow;

use log::{debug, warn};
use rhai::FLOAT;

use crate::adapter::ScriptObject;
use crate::controller::ControllerProxy;
use crate::dispatch::Dispatch;
use crate::error::{ControllerError, Result};
use crate::events::Event;

/// Stable accessor for an object added to a node. Slots are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentCategory {
    AnimationLoop,
    State,
    Plugin,
}

const COMPONENT_TYPES: &[(&str, ComponentCategory)] = &[
    ("DefaultAnimationLoop", ComponentCategory::AnimationLoop),
    ("FreeMotionAnimationLoop", ComponentCategory::AnimationLoop),
    ("MechanicalObject", ComponentCategory::State),
    ("RequiredPlugin", ComponentCategory::Plugin),
];

/// A native component created by type name. Components take no part in event dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    type_name: String,
    name: String,
    category: ComponentCategory,
}

impl Component {
    pub fn create(type_name: &str, name: impl Into<String>) -> Result<Self> {
        let (type_name, category) = COMPONENT_TYPES
            .iter()
            .find(|(known, _)| *known == type_name)
            .copied()
            .ok_or_else(|| ControllerError::UnknownComponent(type_name.to_string()))?;
        Ok(Self { type_name: type_name.to_string(), name: name.into(), category })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> ComponentCategory {
        self.category
    }
}

#[derive(Debug)]
pub enum SceneObject {
    Controller(ControllerProxy),
    Component(Component),
}

impl SceneObject {
    pub fn name(&self) -> &str {
        match self {
            SceneObject::Controller(controller) => controller.name(),
            SceneObject::Component(component) => component.name(),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            SceneObject::Controller(controller) => controller.class_name(),
            SceneObject::Component(component) => component.type_name(),
        }
    }

    pub fn as_controller(&self) -> Option<&ControllerProxy> {
        match self {
            SceneObject::Controller(controller) => Some(controller),
            SceneObject::Component(_) => None,
        }
    }

    pub fn as_controller_mut(&mut self) -> Option<&mut ControllerProxy> {
        match self {
            SceneObject::Controller(controller) => Some(controller),
            SceneObject::Component(_) => None,
        }
    }
}

impl From<ControllerProxy> for SceneObject {
    fn from(controller: ControllerProxy) -> Self {
        SceneObject::Controller(controller)
    }
}

impl From<Component> for SceneObject {
    fn from(component: Component) -> Self {
        SceneObject::Component(component)
    }
}

/// A scene-graph node. Dropping a node destroys its controllers and their scripted objects.
#[derive(Debug)]
pub struct Node {
    name: String,
    objects: Vec<Option<SceneObject>>,
    children: Vec<Node>,
    initialized: bool,
    time: FLOAT,
    steps: u64,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), objects: Vec::new(), children: Vec::new(), initialized: false, time: 0.0, steps: 0 }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_child(&mut self, child: Node) -> &mut Node {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn create_child(&mut self, name: impl Into<String>) -> &mut Node {
        self.add_child(Node::new(name))
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|child| child.name == name)
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn add_object(&mut self, object: impl Into<SceneObject>) -> ObjectId {
        let object = object.into();
        if !object.name().is_empty() && self.objects().any(|existing| existing.name() == object.name()) {
            warn!("node '{}' already has an object named '{}'", self.name, object.name());
        }
        debug!("node '{}' added {} '{}'", self.name, object.type_name(), object.name());
        self.objects.push(Some(object));
        ObjectId(self.objects.len() - 1)
    }

    /// Wraps `object` in a proxy that takes ownership of it.
    pub fn add_controller(&mut self, object: ScriptObject) -> Result<ObjectId> {
        let controller = ControllerProxy::adopt(object)?;
        Ok(self.add_object(controller))
    }

    pub fn create_object(&mut self, type_name: &str, name: impl Into<String>) -> Result<ObjectId> {
        let component = Component::create(type_name, name)?;
        Ok(self.add_object(component))
    }

    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(id.0).and_then(Option::as_ref)
    }

    pub fn objects(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter().flatten()
    }

    pub fn controller(&self, id: ObjectId) -> Option<&ControllerProxy> {
        self.object(id).and_then(SceneObject::as_controller)
    }

    pub fn controller_mut(&mut self, id: ObjectId) -> Option<&mut ControllerProxy> {
        self.objects.get_mut(id.0).and_then(Option::as_mut).and_then(SceneObject::as_controller_mut)
    }

    /// First controller called `name` on this node.
    pub fn controller_named(&self, name: &str) -> Option<&ControllerProxy> {
        self.controllers().find(|controller| controller.name() == name)
    }

    pub fn controller_named_mut(&mut self, name: &str) -> Option<&mut ControllerProxy> {
        self.objects
            .iter_mut()
            .flatten()
            .filter_map(SceneObject::as_controller_mut)
            .find(|controller| controller.name() == name)
    }

    pub fn controllers(&self) -> impl Iterator<Item = &ControllerProxy> {
        self.objects().filter_map(SceneObject::as_controller)
    }

    pub fn animation_loop(&self) -> Option<&Component> {
        self.objects().find_map(|object| match object {
            SceneObject::Component(component) if component.category() == ComponentCategory::AnimationLoop => {
                Some(component)
            }
            _ => None,
        })
    }

    /// Detaches an object. A removed controller is destroyed along with its scripted object.
    pub fn remove_object(&mut self, id: ObjectId) -> Option<SceneObject> {
        let mut object = self.objects.get_mut(id.0)?.take()?;
        if let SceneObject::Controller(controller) = &mut object {
            controller.destroy();
        }
        Some(object)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn time(&self) -> FLOAT {
        self.time
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) fn advance(&mut self, dt: FLOAT) {
        self.time += dt;
        self.steps += 1;
    }

    /// Calls `init` once on every controller, depth-first, a node's objects before its children.
    pub fn init(&mut self) -> Result<()> {
        let _ = self.visit_controllers_mut(&mut |controller| controller.init().map(|_| ControlFlow::Continue(())))?;
        self.mark_initialized();
        Ok(())
    }

    pub fn reinit(&mut self) -> Result<()> {
        let _ = self.visit_controllers_mut(&mut |controller| controller.reinit().map(|_| ControlFlow::Continue(())))?;
        Ok(())
    }

    /// Delivers `event` to every controller until one handles it.
    pub fn propagate_event(&mut self, event: &Event) -> Result<Dispatch> {
        let mut outcome = Dispatch::Ignored;
        let _ = self.visit_controllers_mut(&mut |controller| {
            Ok(match controller.receive_event(event)? {
                Dispatch::Handled => {
                    debug!("{} handled by '{}'", event.kind(), controller.name());
                    outcome = Dispatch::Handled;
                    ControlFlow::Break(())
                }
                Dispatch::Delivered => {
                    outcome = Dispatch::Delivered;
                    ControlFlow::Continue(())
                }
                Dispatch::Ignored => ControlFlow::Continue(()),
            })
        })?;
        Ok(outcome)
    }

    /// Visits controllers depth-first. Stops on the first error or `Break`.
    pub fn visit_controllers_mut(
        &mut self,
        visit: &mut dyn FnMut(&mut ControllerProxy) -> Result<ControlFlow<()>>,
    ) -> Result<ControlFlow<()>> {
        for controller in self.objects.iter_mut().flatten().filter_map(SceneObject::as_controller_mut) {
            if visit(controller)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        for child in &mut self.children {
            if child.visit_controllers_mut(visit)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Every controller below this node with its slash-separated path.
    pub fn controller_paths(&self) -> Vec<(String, &ControllerProxy)> {
        let mut out = Vec::new();
        self.collect_controller_paths(&self.name, &mut out);
        out
    }

    fn collect_controller_paths<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a ControllerProxy)>) {
        for controller in self.controllers() {
            out.push((format!("{prefix}/{}", controller.name()), controller));
        }
        for child in &self.children {
            child.collect_controller_paths(&format!("{prefix}/{}", child.name), out);
        }
    }

    fn mark_initialized(&mut self) {
        self.initialized = true;
        for child in &mut self.children {
            child.mark_initialized();
        }
    }
}

use rhai::{Array, Dynamic, Map};
use serde_json::Value;

use crate::error::{ControllerError, Result};

/// Positional and named arguments captured at construction and forwarded unchanged to the
/// base initializer and then to the class's `construct`.
#[derive(Debug, Clone, Default)]
pub struct ConstructionArgs {
    pub positional: Vec<Dynamic>,
    pub named: Map,
}

impl ConstructionArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for the common `name = ...` keyword.
    pub fn named_as(name: &str) -> Self {
        Self::new().named("name", name)
    }

    pub fn positional(mut self, value: impl Into<Dynamic>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn named(mut self, key: &str, value: impl Into<Dynamic>) -> Self {
        self.named.insert(key.into(), value.into());
        self
    }

    pub fn from_json(args: &[Value], kwargs: &serde_json::Map<String, Value>) -> Result<Self> {
        let mut out = Self::new();
        for value in args {
            out.positional.push(rhai::serde::to_dynamic(value)?);
        }
        for (key, value) in kwargs {
            out.named.insert(key.as_str().into(), rhai::serde::to_dynamic(value)?);
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    pub(crate) fn args_array(&self) -> Array {
        self.positional.clone()
    }

    pub(crate) fn kwargs_map(&self) -> Map {
        self.named.clone()
    }
}

/// Native base state derived from the construction arguments before any class code runs.
#[derive(Debug, Clone)]
pub struct BaseInit {
    pub name: String,
    pub listening: bool,
    /// Keyword arguments other than `name` and `listening`, stored as data attributes.
    pub data: Map,
    /// Positional arguments after the one consumed as the name.
    pub extra: Vec<Dynamic>,
}

impl BaseInit {
    pub fn from_args(class: &str, args: &ConstructionArgs) -> Result<Self> {
        let fail = |reason: String| ControllerError::BaseInit { class: class.to_string(), reason };

        let mut positional = args.positional.iter();
        let name = match args.named.get("name") {
            Some(value) => value
                .clone()
                .into_string()
                .map_err(|found| fail(format!("'name' must be a string, found {found}")))?,
            None => match args.positional.first() {
                Some(first) if first.is_string() => {
                    positional.next();
                    first.to_string()
                }
                _ => String::new(),
            },
        };

        let listening = match args.named.get("listening") {
            Some(value) => {
                value.as_bool().map_err(|found| fail(format!("'listening' must be a bool, found {found}")))?
            }
            None => true,
        };

        let data = args
            .named
            .iter()
            .filter(|(key, _)| key.as_str() != "name" && key.as_str() != "listening")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self { name, listening, data, extra: positional.cloned().collect() })
    }

    /// The object map the class constructor starts from.
    pub(crate) fn into_object(self) -> Map {
        let mut object = self.data;
        object.insert("name".into(), self.name.into());
        object.insert("listening".into(), self.listening.into());
        object
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_keyword_wins_over_positional() {
        let args = ConstructionArgs::new().positional("first").named("name", "controller");
        let base = BaseInit::from_args("MyController", &args).expect("base init");
        assert_eq!(base.name, "controller");
        assert_eq!(base.extra.len(), 1, "unconsumed positional should be kept");
    }

    #[test]
    fn first_positional_string_names_the_object() {
        let args = ConstructionArgs::new()
            .positional("controller")
            .positional("pval1")
            .positional("pval2")
            .positional("pval3");
        let base = BaseInit::from_args("MyController", &args).expect("base init");
        assert_eq!(base.name, "controller");
        assert_eq!(base.extra.len(), 3);
        assert!(base.listening);
    }

    #[test]
    fn extra_keywords_become_data() {
        let args = ConstructionArgs::named_as("controller").named("kval1", "value1").named("kval2", 2 as rhai::INT);
        let base = BaseInit::from_args("MyController", &args).expect("base init");
        assert_eq!(base.data.len(), 2);
        let object = base.into_object();
        assert_eq!(object.get("name").map(|v| v.to_string()), Some("controller".to_string()));
        assert_eq!(object.get("kval2").and_then(|v| v.as_int().ok()), Some(2));
    }

    #[test]
    fn rejects_non_string_name() {
        let args = ConstructionArgs::new().named("name", 5 as rhai::INT);
        let err = BaseInit::from_args("MyController", &args).unwrap_err();
        assert!(matches!(err, ControllerError::BaseInit { .. }), "unexpected error {err:?}");
    }

    #[test]
    fn rejects_non_bool_listening() {
        let args = ConstructionArgs::new().named("listening", "yes");
        assert!(BaseInit::from_args("MyController", &args).is_err());
    }

    #[test]
    fn empty_args_leave_empty_identity() {
        let base = BaseInit::from_args("MyController", &ConstructionArgs::new()).expect("base init");
        assert!(base.name.is_empty());
        assert!(base.extra.is_empty());
    }
}

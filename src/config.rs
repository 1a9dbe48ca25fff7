use anyhow::{Context, Result};
use rhai::Engine;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Limits applied to the embedded rhai engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Maximum operations per script call; `0` means unlimited.
    #[serde(default)]
    pub max_operations: u64,
    #[serde(default = "EngineConfig::default_max_call_levels")]
    pub max_call_levels: usize,
    #[serde(default = "EngineConfig::default_max_expr_depth")]
    pub max_expr_depth: usize,
    #[serde(default = "EngineConfig::default_max_function_expr_depth")]
    pub max_function_expr_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "SimulationConfig::default_dt")]
    pub dt: f64,
    #[serde(default = "SimulationConfig::default_steps")]
    pub steps: usize,
    #[serde(default)]
    pub collect_garbage_each_step: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeConfigOverrides {
    pub steps: Option<usize>,
    pub dt: Option<f64>,
    pub collect_garbage_each_step: Option<bool>,
}

impl EngineConfig {
    const fn default_max_call_levels() -> usize {
        64
    }

    const fn default_max_expr_depth() -> usize {
        64
    }

    const fn default_max_function_expr_depth() -> usize {
        32
    }

    pub fn apply(&self, engine: &mut Engine) {
        engine.set_max_operations(self.max_operations);
        engine.set_max_call_levels(self.max_call_levels);
        engine.set_max_expr_depths(self.max_expr_depth, self.max_function_expr_depth);
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_operations: 0,
            max_call_levels: Self::default_max_call_levels(),
            max_expr_depth: Self::default_max_expr_depth(),
            max_function_expr_depth: Self::default_max_function_expr_depth(),
        }
    }
}

impl SimulationConfig {
    const fn default_dt() -> f64 {
        0.01
    }

    const fn default_steps() -> usize {
        10
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { dt: Self::default_dt(), steps: Self::default_steps(), collect_garbage_each_step: false }
    }
}

impl BridgeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &BridgeConfigOverrides) {
        if let Some(steps) = overrides.steps {
            self.simulation.steps = steps;
        }
        if let Some(dt) = overrides.dt {
            self.simulation.dt = dt;
        }
        if let Some(collect) = overrides.collect_garbage_each_step {
            self.simulation.collect_garbage_each_step = collect;
        }
    }
}

impl BridgeConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.steps.is_none() && self.dt.is_none() && self.collect_garbage_each_step.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.steps.is_some() {
            fields.push("steps");
        }
        if self.dt.is_some() {
            fields.push("dt");
        }
        if self.collect_garbage_each_step.is_some() {
            fields.push("gc");
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_use_defaults() {
        let cfg: BridgeConfig = serde_json::from_str(r#"{ "engine": { "max_operations": 5000 } }"#).expect("parse");
        assert_eq!(cfg.engine.max_operations, 5000);
        assert_eq!(cfg.engine.max_call_levels, 64);
        assert_eq!(cfg.simulation.steps, 10);
        assert!(!cfg.simulation.collect_garbage_each_step);
    }

    #[test]
    fn overrides_replace_simulation_fields() {
        let mut cfg = BridgeConfig::default();
        let overrides = BridgeConfigOverrides { steps: Some(3), dt: None, collect_garbage_each_step: Some(true) };
        cfg.apply_overrides(&overrides);
        assert_eq!(cfg.simulation.steps, 3);
        assert_eq!(cfg.simulation.dt, 0.01);
        assert!(cfg.simulation.collect_garbage_each_step);
        assert_eq!(overrides.applied_fields(), vec!["steps", "gc"]);
    }

    #[test]
    fn load_or_default_tolerates_missing_file() {
        let cfg = BridgeConfig::load_or_default("does/not/exist.json");
        assert_eq!(cfg.simulation.steps, 10);
    }
}

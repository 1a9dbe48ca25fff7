use crate::config::BridgeConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

/// Command line of the `controller_harness` binary.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HarnessOptions {
    pub fixture: Option<PathBuf>,
    pub write_output: Option<PathBuf>,
    pub check_golden: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub help: bool,
    steps: Option<usize>,
    dt: Option<f64>,
    gc: Option<bool>,
}

impl HarnessOptions {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = HarnessOptions::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            if matches!(flag, "--help" | "-h") {
                options.help = true;
                continue;
            }
            if !flag.starts_with('-') {
                bail!("Unexpected argument '{flag}'. Use --help to list the supported flags.");
            }
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match flag {
                "--fixture" | "-f" => options.fixture = Some(PathBuf::from(value)),
                "--write-output" | "-o" => options.write_output = Some(PathBuf::from(value)),
                "--golden" | "-g" => options.check_golden = Some(PathBuf::from(value)),
                "--config" | "-c" => options.config = Some(PathBuf::from(value)),
                "--steps" => {
                    options.steps =
                        Some(value.parse::<usize>().with_context(|| format!("Invalid steps '{value}'"))?);
                }
                "--dt" => {
                    let dt = value.parse::<f64>().with_context(|| format!("Invalid dt '{value}'"))?;
                    if !(dt > 0.0) {
                        bail!("Invalid dt '{value}'. The time step must be positive.");
                    }
                    options.dt = Some(dt);
                }
                "--gc" => options.gc = Some(parse_bool_flag("gc", &value)?),
                _ => bail!("Unknown flag '{flag}'. Use --help to list the supported flags."),
            }
        }
        Ok(options)
    }

    pub fn config_overrides(&self) -> BridgeConfigOverrides {
        BridgeConfigOverrides { steps: self.steps, dt: self.dt, collect_garbage_each_step: self.gc }
    }

    pub fn print_help() {
        println!("Usage: controller_harness --fixture <path> [--golden <path>] [--write-output <path>]");
        println!("  -f, --fixture        Path to a harness fixture JSON file");
        println!("  -g, --golden         Optional golden output file to compare against");
        println!("  -o, --write-output   Optional path to write the actual output JSON");
        println!("  -c, --config         Optional bridge config JSON (engine limits, simulation defaults)");
        println!("      --steps <n>      Override the number of simulation steps");
        println!("      --dt <seconds>   Override the time step");
        println!("      --gc <on|off>    Collect garbage after every step");
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Invalid {flag} value '{other}'. Use on/off or true/false."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_paths_and_overrides() {
        let args = ["harness", "--fixture", "scene.json", "--steps", "5", "--gc", "on", "-o", "out.json"];
        let options = HarnessOptions::parse(args).expect("parse options");
        assert_eq!(options.fixture, Some(PathBuf::from("scene.json")));
        assert_eq!(options.write_output, Some(PathBuf::from("out.json")));
        let overrides = options.config_overrides();
        assert_eq!(overrides.steps, Some(5));
        assert_eq!(overrides.dt, None);
        assert_eq!(overrides.collect_garbage_each_step, Some(true));
    }

    #[test]
    fn latest_flag_wins() {
        let args = ["harness", "--steps", "3", "--steps", "7", "--dt", "0.5"];
        let options = HarnessOptions::parse(args).expect("parse options");
        assert_eq!(options.config_overrides().steps, Some(7));
        assert_eq!(options.config_overrides().dt, Some(0.5));
    }

    #[test]
    fn missing_value_errors() {
        let err = HarnessOptions::parse(["harness", "--fixture"]).unwrap_err();
        assert!(err.to_string().contains("Expected a value"), "error should mention missing value");
    }

    #[test]
    fn rejects_unknown_flags_and_bad_dt() {
        let err = HarnessOptions::parse(["harness", "--foo", "bar"]).unwrap_err();
        assert!(err.to_string().contains("Unknown flag"), "unknown flags should error");
        assert!(HarnessOptions::parse(["harness", "--dt", "-1"]).is_err());
    }

    #[test]
    fn help_needs_no_value() {
        let options = HarnessOptions::parse(["harness", "--help"]).expect("parse options");
        assert!(options.help);
    }
}

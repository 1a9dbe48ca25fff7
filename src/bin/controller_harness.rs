use std::fs::{self, File};

use anyhow::{anyhow, bail, Context, Result};
use scene_bridge::cli::HarnessOptions;
use scene_bridge::config::BridgeConfig;
use scene_bridge::harness::{load_fixture, run_fixture_with_config, HarnessOutput};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(err) = run_cli() {
        eprintln!("[controller-harness] error: {err:?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let opts = HarnessOptions::parse_from_env()?;
    if opts.help {
        HarnessOptions::print_help();
        return Ok(());
    }
    let Some(fixture_path) = &opts.fixture else { return Err(anyhow!("--fixture <path> is required")) };

    let mut config = match &opts.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    let overrides = opts.config_overrides();
    if !overrides.is_empty() {
        log::info!("command line overrides: {}", overrides.applied_fields().join(", "));
    }
    config.apply_overrides(&overrides);

    let mut fixture = load_fixture(fixture_path)?;
    // Command line flags beat the fixture's own settings.
    fixture.steps = overrides.steps.or(fixture.steps);
    fixture.dt = overrides.dt.or(fixture.dt);
    fixture.collect_garbage_each_step = overrides.collect_garbage_each_step.or(fixture.collect_garbage_each_step);
    let output = run_fixture_with_config(&fixture, &config)?;

    if let Some(path) = &opts.write_output {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating output directory '{}'", parent.display()))?;
            }
        }
        let file = File::create(path)
            .with_context(|| format!("writing harness output to '{}'", path.display()))?;
        serde_json::to_writer_pretty(file, &output).with_context(|| "serializing harness output")?;
        println!("[controller-harness] wrote {}", path.display());
    }

    if let Some(path) = &opts.check_golden {
        let file = File::open(path)
            .with_context(|| format!("opening golden file '{}'", path.display()))?;
        let expected: HarnessOutput =
            serde_json::from_reader(file).with_context(|| "parsing golden JSON")?;
        if expected != output {
            bail!(
                "golden mismatch for {} (use --write-output to refresh):\nexpected: {}\nactual:   {}",
                fixture_path.display(),
                serde_json::to_string(&expected).unwrap_or_default(),
                serde_json::to_string(&output).unwrap_or_default(),
            );
        }
        println!("[controller-harness] matched golden {}", path.display());
    } else if opts.write_output.is_none() {
        serde_json::to_writer_pretty(std::io::stdout(), &output)?;
        println!();
    }

    Ok(())
}

//! Run command - full pipeline

use anyhow::Result;
use console::style;
use qe_clean::config::Config;
use qe_clean::pipeline::{Pipeline, RunInputs};
use qe_clean::tools::{LmSettings, Toolchain};

pub fn run(config: &Config, inputs: RunInputs, command_only: bool) -> Result<()> {
    let pipeline = Pipeline::new(Toolchain::from_config(config), LmSettings::from_config(config))
        .command_only(command_only)
        .with_program(program_name());

    let stats = pipeline.run(&inputs)?;
    if command_only {
        return Ok(());
    }

    eprintln!("\n{} {}", style("Done:").green().bold(), stats.summary());
    if let Some(scored) = &stats.scored {
        eprintln!(
            "Select with: {} select N < {}",
            env!("CARGO_PKG_NAME"),
            scored.display()
        );
    }
    Ok(())
}

/// How this binary was invoked, for printed `align`/`cut` commands
fn program_name() -> String {
    std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string())
}

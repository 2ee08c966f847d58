//! Doctor command - check the external toolchain

use anyhow::{bail, Result};
use console::style;
use qe_clean::config::Config;
use qe_clean::tools::{LmSettings, Toolchain};

pub fn run(config: &Config) -> Result<()> {
    println!("{}\n", style("qe-clean doctor").bold());

    let tools = Toolchain::from_config(config);
    let mut missing = 0;
    for (role, path) in tools.binaries() {
        if path.is_file() {
            println!("{} {:<18} {}", style("✓").green(), role, path.display());
        } else {
            missing += 1;
            println!("{} {:<18} {} (not found)", style("✗").red(), role, path.display());
        }
    }

    let lm = LmSettings::from_config(config);
    println!("\nLM order {}, builder memory {}", lm.order, lm.memory);

    if missing > 0 {
        println!(
            "\nSet --cdec, QE_CLEAN_CDEC, or the [tools] section of {} to locate them.",
            Config::FILENAME
        );
        bail!("{} of 4 binaries missing", missing);
    }
    println!("\n{}", style("All binaries found.").green());
    Ok(())
}

//! Dashlight Control - terminal front end for the diagnostic engine.

use anyhow::{bail, Context, Result};
use clap::Parser;
use dashlight_common::{Consultant, DashlightConfig};
use dashlightctl::cli::{Cli, Commands};
use dashlightctl::render::Painter;
use dashlightctl::{commands, logging};
use std::io::{self, IsTerminal};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let (config, source) = DashlightConfig::load(cli.config.as_deref()).context("loading config")?;
    let stdout = io::stdout();

    match cli.command {
        Commands::Config => commands::show_config(&config, source.as_deref(), stdout.lock()),
        Commands::Version => commands::version(stdout.lock()),
        Commands::ValidateKb { path, scenarios } => {
            let path = path.or_else(|| config.engine.kb_path.clone());
            let scenarios = scenarios.or_else(|| config.engine.scenarios_path.clone());
            if !commands::validate_kb(path.as_deref(), scenarios.as_deref(), stdout.lock())? {
                bail!("knowledge base has errors");
            }
            Ok(())
        }
        Commands::Lights => {
            let knowledge = config.engine.load_knowledge().context("loading knowledge base")?;
            commands::list_lights(&knowledge, stdout.lock())
        }
        Commands::Scenarios => {
            let knowledge = config.engine.load_knowledge().context("loading knowledge base")?;
            commands::list_scenarios(&knowledge, stdout.lock())
        }
        Commands::Turn => {
            let consultant = Consultant::from_config(&config).context("setting up engine")?;
            commands::run_turn(&consultant, io::stdin().lock(), stdout.lock()).await
        }
        Commands::Chat { light, scenario, plain } => {
            let consultant = Consultant::from_config(&config).context("setting up engine")?;
            let color = !plain && std::env::var_os("NO_COLOR").is_none() && stdout.is_terminal();
            commands::chat(
                &consultant,
                light.as_deref(),
                scenario.as_deref(),
                io::stdin().lock(),
                stdout.lock(),
                Painter { color },
            )
            .await
        }
    }
}

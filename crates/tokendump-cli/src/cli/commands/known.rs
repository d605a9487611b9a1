use anyhow::Context;
use tokendump_core::KnownDepots;

use super::super::args::{KnownArgs, KnownSub};
use super::load_config;
use crate::exit_codes::SUCCESS;

pub async fn run(args: KnownArgs) -> anyhow::Result<i32> {
    let config = load_config(&args.config).await?;
    let path = &config.known_depots_path;

    match args.cmd {
        KnownSub::List => {
            let mut known = KnownDepots::new();
            known.load(path).await?;
            for depot_id in known.previously_sent() {
                println!("{}", depot_id);
            }
        }
        KnownSub::Clear => {
            if path.exists() {
                tokio::fs::remove_file(path)
                    .await
                    .with_context(|| format!("failed to remove {}", path.display()))?;
                println!("Removed {}", path.display());
            } else {
                println!("Nothing to clear");
            }
        }
        KnownSub::Path => println!("{}", path.display()),
    }

    Ok(SUCCESS)
}

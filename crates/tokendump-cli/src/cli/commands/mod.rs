mod dispatch;
pub mod known;
pub mod run;

pub use dispatch::dispatch;

use std::path::Path;

use anyhow::Context;
use tokendump_core::DumperConfig;

use super::args::ConfigArgs;

const DEFAULT_CONFIG_FILE: &str = "tokendump.yaml";

/// Resolve config: explicit file, then ./tokendump.yaml, then env only.
pub(crate) async fn load_config(args: &ConfigArgs) -> anyhow::Result<DumperConfig> {
    let path = match &args.config {
        Some(path) => Some(path.as_path()),
        None => Some(Path::new(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
    };

    match path {
        Some(path) => DumperConfig::load(path)
            .await
            .with_context(|| format!("failed to load config {}", path.display())),
        None => {
            let config = DumperConfig::from_env();
            config.validate()?;
            Ok(config)
        }
    }
}

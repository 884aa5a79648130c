use anyhow::Context;
use custody_config::CustodyConfig;

use crate::cli::GlobalFlags;

/// Load `.env`, then layer the configuration sources.
///
/// An explicit `--config` file sits above the project and user files;
/// `CUSTODY_*` environment variables still win over all of them.
pub fn load_config(flags: &GlobalFlags) -> anyhow::Result<CustodyConfig> {
    load_dotenv()?;

    match flags.config.as_deref() {
        Some(path) => {
            if !path.is_file() {
                anyhow::bail!("config file '{}' does not exist", path.display());
            }
            CustodyConfig::load_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => CustodyConfig::load().context("failed to load configuration"),
    }
}

fn load_dotenv() -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    let env_path = cwd.join(".env");
    if env_path.exists() {
        dotenvy::from_path(&env_path)
            .with_context(|| format!("failed to load dotenv file at {}", env_path.display()))?;
    }
    Ok(())
}

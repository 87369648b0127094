use crate::{accounts, jobs};
use anyhow::Context;
use std::{io::Read, path::Path};

#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub database: treasury_db::Config,
    #[serde(default)]
    pub accounts: accounts::Config,
    #[serde(default)]
    pub jobs: jobs::Config,
    #[serde(default)]
    pub tracing: TracingConfig,
}

#[derive(Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TracingConfig {
    #[serde(default)]
    pub console: bool,
}

pub fn load(path: &Path) -> anyhow::Result<Config> {
    let mut configuration = String::with_capacity(4096);
    std::fs::File::open(path)
        .with_context(|| format!("unable to open configuration file {}", path.display()))?
        .read_to_string(&mut configuration)
        .with_context(|| format!("unable to read configuration file {}", path.display()))?;
    let mut config = toml::from_str::<Config>(&configuration)
        .with_context(|| format!("unable to parse configuration file {}", path.display()))?;
    config.database.apply_env();
    Ok(config)
}

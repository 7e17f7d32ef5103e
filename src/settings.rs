// src/settings.rs

use std::{
    collections::HashMap,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, File};
use serde::Deserialize;

use crate::{
    database::DatabaseSettings,
    permission::{Actors, Permissions},
};

const DEFAULT_ADDR: &str = "127.0.0.1:8001";
const DEFAULT_REGISTRY: &str = "dashboards.toml";
const DEFAULT_MAX_RETURNED_ROWS: i64 = 1000;

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: PathBuf,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Web {
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub(crate) address: SocketAddr,
    /// Directory served under `/-/static/`.
    pub(crate) static_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Settings {
    pub(crate) web: Web,
    /// Path to the dashboards file.
    pub(crate) registry: PathBuf,
    pub(crate) max_returned_rows: usize,
    #[serde(default)]
    pub(crate) databases: HashMap<String, DatabaseSettings>,
    #[serde(default)]
    pub(crate) permissions: Permissions,
    #[serde(default)]
    pub(crate) actors: Actors,
}

impl Settings {
    /// Load settings from the given TOML file, with sane defaults.
    ///
    /// Relative paths inside the file are resolved against the file's
    /// directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::<DefaultState>::default()
            .set_default("web.address", DEFAULT_ADDR)?
            .set_default("registry", DEFAULT_REGISTRY)?
            .set_default("max_returned_rows", DEFAULT_MAX_RETURNED_ROWS)?;

        let cfg = builder.add_source(File::from(path)).build()?;

        let mut settings: Settings = cfg.try_deserialize()?;
        if let Some(base) = path.parent() {
            settings.resolve_paths(base);
        }
        Ok(settings)
    }

    fn resolve_paths(&mut self, base: &Path) {
        self.registry = base.join(&self.registry);
        if let Some(dir) = self.web.static_dir.take() {
            self.web.static_dir = Some(base.join(dir));
        }
        for db in self.databases.values_mut() {
            db.path = base.join(&db.path);
        }
    }
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

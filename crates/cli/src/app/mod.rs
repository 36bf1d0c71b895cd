use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use providers::puml_server::{PumlServerClient, ServerConfig};
use puml_core::history::HistoryStore;
use puml_core::settings::SettingsStore;
use puml_core::storage::FileStore;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::info;

pub mod ai;
pub mod history;
pub mod render;
pub mod settings;

pub type Storage = Arc<FileStore>;

/// Services shared by every command, built once at startup.
pub struct App {
    pub history: HistoryStore<Storage>,
    pub settings: SettingsStore<Storage>,
    pub json: bool,
    pub width: usize,
}

impl App {
    pub async fn open(data_dir: Option<PathBuf>, json: bool) -> Result<Self> {
        let root = match data_dir {
            Some(d) => d,
            None => FileStore::default_root().context("no home directory to keep history in")?,
        };
        let storage: Storage = Arc::new(FileStore::new(root));
        info!(target: "cli", "storage at {}", storage.root().display());
        let settings = SettingsStore::open(storage.clone()).await;
        let history = HistoryStore::open(storage).await;
        Ok(Self {
            history,
            settings,
            json,
            width: crate::strings::terminal_width(),
        })
    }

    pub fn client(&self) -> Result<PumlServerClient> {
        let cfg = ServerConfig::from_env_and_file(&self.settings.current())?;
        info!(target: "cli", "render service {}", cfg.base_url);
        PumlServerClient::new(cfg).context("build HTTP client")
    }

    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// Read diagram source from a file, or stdin for `-`/no path.
pub async fn read_source(input: Option<&Path>) -> Result<String> {
    match input {
        Some(p) if p != Path::new("-") => tokio::fs::read_to_string(p)
            .await
            .with_context(|| format!("read source file: {}", p.display())),
        _ => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("read source from stdin")?;
            Ok(buf)
        }
    }
}

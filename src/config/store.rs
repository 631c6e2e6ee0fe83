use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::AgentConfig;
use crate::error::Result;

/// Configuration store backed by an optional TOML file
///
/// Uses `ArcSwap` for lock-free reads. Updates only touch the in-memory
/// copy; the file is never written.
#[derive(Clone)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    /// Lock-free cache using ArcSwap for zero-cost reads
    cache: Arc<ArcSwap<AgentConfig>>,
}

impl ConfigStore {
    /// Load configuration from `path`
    ///
    /// A missing file yields the defaults. An unreadable, malformed or
    /// invalid file is an error.
    ///
    /// ```
    /// use dbmeter_agent::config::ConfigStore;
    ///
    /// # tokio_test::block_on(async {
    /// let store = ConfigStore::load("missing-agent.toml".as_ref()).await.unwrap();
    /// assert_eq!(store.get().signaling.url(), "ws://localhost:8000/webrtc-signaling");
    /// # });
    /// ```
    pub async fn load(path: &Path) -> Result<Self> {
        let config = if tokio::fs::try_exists(path).await? {
            let text = tokio::fs::read_to_string(path).await?;
            let config: AgentConfig = toml::from_str(&text)?;
            info!("Loaded configuration from {}", path.display());
            config
        } else {
            info!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
            AgentConfig::default()
        };

        config.validate()?;
        Ok(Self::build(Some(path.to_path_buf()), config))
    }

    /// Store holding `config`, with no backing file
    pub fn in_memory(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(None, config))
    }

    fn build(path: Option<PathBuf>, config: AgentConfig) -> Self {
        Self {
            path,
            cache: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Get current configuration (lock-free, zero-copy)
    pub fn get(&self) -> Arc<AgentConfig> {
        self.cache.load_full()
    }

    /// Update configuration with a closure
    ///
    /// The result is validated before it replaces the cached copy; on error
    /// the previous configuration stays in place.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AgentConfig),
    {
        let current = self.cache.load();
        let mut config = (**current).clone();
        f(&mut config);
        config.validate()?;

        self.cache.store(Arc::new(config));
        debug!("Configuration updated");
        Ok(())
    }

    /// File the configuration was loaded from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

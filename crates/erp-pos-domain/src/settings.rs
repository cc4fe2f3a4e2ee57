use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Settings;

/// Holds the live register configuration (tax rate, accounts, ...) so a
/// settings update takes effect on the next sale without restarting the
/// process.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn current(&self) -> Settings;
    async fn update(&self, settings: Settings);
}

pub struct InMemorySettingsStore {
    state: RwLock<Settings>,
}

impl InMemorySettingsStore {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            state: RwLock::new(settings),
        }
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn current(&self) -> Settings {
        self.state.read().await.clone()
    }

    async fn update(&self, settings: Settings) {
        *self.state.write().await = settings;
    }
}

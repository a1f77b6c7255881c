use serde::Deserialize;

use crate::risk::RiskLimits;

/// Engine settings: risk limits and the snapshot interval in events.
/// Every field has a default so a settings file may override any subset.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub risk: RiskLimits,
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: u64,
}

fn default_snapshot_interval() -> u64 {
    1_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            risk: RiskLimits::default(),
            snapshot_interval: default_snapshot_interval(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let builder = config::Config::builder().add_source(config::File::with_name(path));
        Ok(builder.build()?.try_deserialize()?)
    }
}

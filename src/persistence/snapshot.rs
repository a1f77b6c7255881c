use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::{Order, OrderId, TradeId};

/// Captured engine state at a sequence point: id counters plus the set of
/// active (NEW/PARTIAL) orders. Together with the event tail it is
/// sufficient to reconstruct full state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub sequence: u64,
    pub timestamp_ns: u64,
    pub next_order_id: OrderId,
    pub next_trade_id: TradeId,
    pub orders: Vec<Order>,
}

/// Writes `snapshot_<sequence>.json` files into a directory and loads the
/// one with the largest sequence back. Provides the interval primitive;
/// the policy of when to call `save` belongs to the caller.
#[derive(Debug)]
pub struct SnapshotManager {
    dir: Option<PathBuf>,
    interval: u64,
    last_snapshot_seq: u64,
}

impl SnapshotManager {
    pub fn open(dir: &Path, interval: u64) -> anyhow::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            interval,
            last_snapshot_seq: 0,
        })
    }

    /// A manager with no directory: never snapshots, loads nothing.
    pub fn disabled() -> Self {
        Self {
            dir: None,
            interval: u64::MAX,
            last_snapshot_seq: 0,
        }
    }

    pub fn should_snapshot(&self, current_sequence: u64) -> bool {
        self.dir.is_some()
            && current_sequence.saturating_sub(self.last_snapshot_seq) >= self.interval
    }

    pub fn save(&mut self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let path = dir.join(format!("snapshot_{}.json", snapshot.sequence));
        fs::write(&path, serde_json::to_string_pretty(snapshot)?)?;
        self.last_snapshot_seq = snapshot.sequence;
        Ok(())
    }

    /// Scan the directory for `snapshot_<N>.json` and parse the one with the
    /// largest N. Files with other names are ignored. A successful load
    /// records the snapshot point so `should_snapshot` measures from it.
    pub fn load_latest(&mut self) -> anyhow::Result<Option<Snapshot>> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        if !dir.exists() {
            return Ok(None);
        }
        let mut latest: Option<(u64, PathBuf)> = None;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(sequence) = parse_snapshot_sequence(&name) else {
                continue;
            };
            if latest.as_ref().map_or(true, |(best, _)| sequence > *best) {
                latest = Some((sequence, entry.path()));
            }
        }
        let Some((sequence, path)) = latest else {
            return Ok(None);
        };
        let snapshot: Snapshot = serde_json::from_str(&fs::read_to_string(path)?)?;
        self.last_snapshot_seq = sequence;
        Ok(Some(snapshot))
    }
}

fn parse_snapshot_sequence(name: &str) -> Option<u64> {
    name.strip_prefix("snapshot_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

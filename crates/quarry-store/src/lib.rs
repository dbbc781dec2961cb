pub mod config;
pub mod files;
pub mod snapshot;

pub use config::StoreConfig;
pub use files::{HarvestFiles, StoredHarvest};
pub use snapshot::{JsonSnapshotStore, write_atomic};

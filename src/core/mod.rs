pub mod diff;
pub mod engine;
pub mod inventory;
pub mod resolver;
pub mod transfer;
pub mod version;

pub use diff::{
    is_eligible, list_local_superseded, list_orphans, list_redundant_archives,
    list_unextracted_archives, list_upgrades, MapAction, ELIGIBLE_PREFIXES,
};
pub use engine::{Operation, RemovalKind, SyncConfig, SyncEngine, SyncFrontend, SyncReport};
pub use inventory::{from_local, from_remote, scan_local, split_extension, MapExt, MapRecord};
pub use resolver::newest_per_name;
pub use transfer::{fetch_and_install, ProgressSink, TransferError};
pub use version::parse_version;

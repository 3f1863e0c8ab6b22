use serde::{Deserialize, Serialize};

/// What happens to a database's queued transactions when its handle is
/// closed or the database is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    /// Queued transactions survive a close and drain on the next successful
    /// open of the same name. Work submitted against a name that never
    /// reopens waits indefinitely.
    #[default]
    RetainAcrossReopen,
    /// Closing or deleting a database aborts every queued transaction with a
    /// connection failure and drops the queue.
    PurgeOnClose,
}

/// Conductor-wide settings.
#[derive(Debug, Clone, Default)]
pub struct ConductorConfig {
    pub queue_policy: QueuePolicy,
}

/// Storage area hint forwarded to the bridge when opening a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageLocation {
    /// Backed-up-excluded default area.
    #[default]
    Default,
    /// User-visible documents area.
    Documents,
    /// Application library area.
    Library,
}

impl StorageLocation {
    /// Subdirectory name the bridge should resolve this location to.
    pub fn subdirectory(self) -> &'static str {
        match self {
            StorageLocation::Default => "nosync",
            StorageLocation::Documents => "docs",
            StorageLocation::Library => "libs",
        }
    }
}

/// Open arguments for one database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    #[serde(default)]
    pub location: StorageLocation,
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: StorageLocation::default(),
        }
    }

    pub fn with_location(name: impl Into<String>, location: StorageLocation) -> Self {
        Self {
            name: name.into(),
            location,
        }
    }
}

//! Shared doubles for the daemon test suites.

mod host;
mod reporter;
mod shutdown;

use camino::Utf8PathBuf;
use tempfile::TempDir;

pub use host::FakeHost;
pub use reporter::{LifecycleEvent, RecordingLifecycleReporter};
pub use shutdown::{ManualShutdown, ShutdownTrigger, manual_shutdown};

/// Temporary directory with a UTF-8 path, removed on drop.
pub struct Scratch {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Scratch {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temporary directory");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        Self { _dir: dir, root }
    }

    pub fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    pub fn root(&self) -> &Utf8PathBuf {
        &self.root
    }

    /// Writes an inventory listing `ids` and returns its path.
    pub fn write_inventory(&self, ids: &[&str]) -> Utf8PathBuf {
        let records: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| serde_json::json!({ "name": id }))
            .collect();
        let path = self.path("dummyResources.json");
        std::fs::write(&path, serde_json::to_vec(&records).expect("serialise inventory"))
            .expect("write inventory");
        path
    }
}

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_ROOT_PATH;
use crate::constants::PATH_SEPARATOR;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Root of the per-interface subtrees in the coordination tree
    #[serde(default = "default_root_path")]
    pub root_path: String,

    /// Buffer of raw change events per watched path
    #[serde(default = "default_watch_buffer_size")]
    pub watch_buffer_size: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            watch_buffer_size: default_watch_buffer_size(),
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.root_path.starts_with(PATH_SEPARATOR) {
            return Err(Error::InvalidConfig(format!(
                "discovery.root_path must be absolute, got {:?}",
                self.root_path
            )));
        }
        if self.root_path.len() > 1 && self.root_path.ends_with(PATH_SEPARATOR) {
            return Err(Error::InvalidConfig(format!(
                "discovery.root_path must not end with '/', got {:?}",
                self.root_path
            )));
        }
        if self.watch_buffer_size == 0 {
            return Err(Error::InvalidConfig(
                "discovery.watch_buffer_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_root_path() -> String {
    DEFAULT_ROOT_PATH.to_string()
}
fn default_watch_buffer_size() -> usize {
    128
}

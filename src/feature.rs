use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub const KV_STORE: &str = "KV_STORE";

// Clones share one registry; unknown flags read as disabled.
#[derive(Clone, Default, Debug)]
pub struct FeatureFlags {
    flags: Arc<RwLock<HashMap<String, bool>>>,
}

impl FeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_enabled<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let flags = Self::new();
        for name in names {
            flags.set(name, true);
        }
        flags
    }

    pub fn set(&self, name: impl Into<String>, enabled: bool) {
        match self.flags.write() {
            Ok(mut flags) => {
                flags.insert(name.into(), enabled);
            }
            Err(e) => log::error!("feature flag registry unavailable: {}", e),
        }
    }

    pub fn enable(&self, name: impl Into<String>) {
        self.set(name, true)
    }

    pub fn disable(&self, name: impl Into<String>) {
        self.set(name, false)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags
            .read()
            .map(|flags| flags.get(name).copied().unwrap_or(false))
            .unwrap_or(false)
    }
}

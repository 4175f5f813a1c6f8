//! Static trader directory for tests.

use std::collections::HashMap;

use async_trait::async_trait;

use tdk_audit::TraderDirectory;

/// Fixed id → display-name mapping.
#[derive(Default)]
pub struct StaticTraderDirectory {
    names: HashMap<String, String>,
}

impl StaticTraderDirectory {
    /// Empty directory: nothing resolves.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            names: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl TraderDirectory for StaticTraderDirectory {
    async fn resolve_display_name(&self, trader_id: &str) -> Option<String> {
        self.names.get(trader_id).cloned()
    }
}

use std::collections::HashMap;

use futures::future::BoxFuture;

use flowrun_core::error::Result;
use flowrun_core::traits::CredentialStore;

/// Credential store built from the `[credentials]` config table.
///
/// Provider names are matched case-insensitively. Empty values and
/// `${VAR}` references whose variable was not set count as absent.
#[derive(Debug, Default)]
pub struct ConfigCredentialStore {
    secrets: HashMap<String, String>,
}

impl ConfigCredentialStore {
    pub fn from_config(table: &HashMap<String, String>) -> Self {
        let secrets = table
            .iter()
            .filter(|(_, v)| is_usable(v))
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            .collect();
        Self { secrets }
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

fn is_usable(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.starts_with("${")
}

impl CredentialStore for ConfigCredentialStore {
    fn get(&self, provider: &str) -> BoxFuture<'_, Result<Option<String>>> {
        let secret = self.secrets.get(&provider.trim().to_lowercase()).cloned();
        Box::pin(async move { Ok(secret) })
    }
}

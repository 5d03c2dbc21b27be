// External collaborator: the non-volatile key-value store (§1, OUT OF
// SCOPE). Only one key is ever used by this crate (`session_id` under the
// `proxy_client` namespace, §6), so the trait surface stays narrow.

use crate::error::CoreResult;
use std::collections::HashMap;
use std::sync::Mutex;

pub trait KvStore: Send + Sync {
    fn get(&self, namespace: &str, key: &str) -> CoreResult<Option<String>>;
    fn set(&self, namespace: &str, key: &str, value: &str) -> CoreResult<()>;
}

/// Process-lifetime fallback used when no durable store is wired up (or
/// when the durable store failed, per §4.8's "falls through to an
/// ephemeral generated ID").
#[derive(Default)]
pub struct InMemoryKvStore {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for InMemoryKvStore {
    fn get(&self, namespace: &str, key: &str) -> CoreResult<Option<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(&(namespace.to_string(), key.to_string())).cloned())
    }

    fn set(&self, namespace: &str, key: &str, value: &str) -> CoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert((namespace.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_value() {
        let kv = InMemoryKvStore::new();
        assert_eq!(kv.get("proxy_client", "session_id").unwrap(), None);
        kv.set("proxy_client", "session_id", "esp32-deadbeef").unwrap();
        assert_eq!(
            kv.get("proxy_client", "session_id").unwrap(),
            Some("esp32-deadbeef".to_string())
        );
    }

    #[test]
    fn namespaces_are_isolated() {
        let kv = InMemoryKvStore::new();
        kv.set("ns_a", "key", "a").unwrap();
        kv.set("ns_b", "key", "b").unwrap();
        assert_eq!(kv.get("ns_a", "key").unwrap(), Some("a".to_string()));
        assert_eq!(kv.get("ns_b", "key").unwrap(), Some("b".to_string()));
    }
}

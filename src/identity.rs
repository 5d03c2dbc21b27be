// C8 — Persistent Identity: a stable session identifier that survives
// reboots, correlating reconnects on the proxy side (§4.8, §6).

use crate::kv::KvStore;

const NAMESPACE: &str = "proxy_client";
const KEY: &str = "session_id";
const MAX_LEN: usize = 31;

/// Load the persisted session id, or generate and persist a new one. If
/// the KV store errors, falls through to an ephemeral id scoped to this
/// call (not persisted) — its lifetime then equals the process lifetime.
pub fn load_or_create(kv: &dyn KvStore) -> String {
    match kv.get(NAMESPACE, KEY) {
        Ok(Some(existing)) if !existing.is_empty() => existing,
        Ok(_) => {
            let generated = generate();
            if let Err(e) = kv.set(NAMESPACE, KEY, &generated) {
                log::warn!("identity: failed to persist session id: {e}");
            }
            generated
        }
        Err(e) => {
            log::warn!("identity: kv read failed ({e}), using ephemeral session id");
            generate()
        }
    }
}

fn generate() -> String {
    let random: u32 = rand::random();
    let id = format!("esp32-{:08x}", random);
    debug_assert!(id.len() <= MAX_LEN);
    id
}

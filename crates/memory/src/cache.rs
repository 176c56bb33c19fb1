//! Per-conversation entity cache: the freshest extracted entities for a
//! conversation, kept in-process and bounded.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use serde_json::{Map, Value};

pub struct EntityCache {
    entries: Mutex<LruCache<String, Map<String, Value>>>,
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EntityCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("non-zero capacity");
        Self { entries: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn set_entities(&self, conversation_id: &str, entities: Map<String, Value>) {
        self.entries
            .lock()
            .expect("entity cache lock poisoned")
            .put(conversation_id.to_string(), entities);
    }

    pub fn get_entities(&self, conversation_id: &str) -> Map<String, Value> {
        self.entries
            .lock()
            .expect("entity cache lock poisoned")
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn merge_entity(&self, conversation_id: &str, key: &str, value: Value) {
        let mut entries = self.entries.lock().expect("entity cache lock poisoned");
        match entries.get_mut(conversation_id) {
            Some(existing) => {
                existing.insert(key.to_string(), value);
            }
            None => {
                let mut map = Map::new();
                map.insert(key.to_string(), value);
                entries.put(conversation_id.to_string(), map);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_conversation_yields_empty_map() {
        let cache = EntityCache::default();
        assert!(cache.get_entities("conv-1").is_empty());
    }

    #[test]
    fn merge_accumulates_entities() {
        let cache = EntityCache::default();
        cache.merge_entity("conv-1", "user_name", json!("Marco"));
        cache.merge_entity("conv-1", "user_city", json!("Canggu"));
        let entities = cache.get_entities("conv-1");
        assert_eq!(entities["user_name"], "Marco");
        assert_eq!(entities["user_city"], "Canggu");
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = EntityCache::new(2);
        cache.merge_entity("a", "k", json!(1));
        cache.merge_entity("b", "k", json!(2));
        cache.merge_entity("c", "k", json!(3));
        assert!(cache.get_entities("a").is_empty());
        assert_eq!(cache.get_entities("c")["k"], 3);
    }
}

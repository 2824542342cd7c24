use sentineliq_common::BoundedSet;

/// Bounded set of article URLs known to exist, consulted before the database.
pub type ExistenceCache = BoundedSet<String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_known_urls_until_evicted() {
        let mut cache = ExistenceCache::new(4);
        cache.extend((0..4).map(|n| format!("https://a.example.com/{n}")));
        assert!(cache.contains(&"https://a.example.com/0".to_string()));

        cache.insert("https://a.example.com/4".to_string());
        assert!(!cache.contains(&"https://a.example.com/0".to_string()));
        assert!(cache.contains(&"https://a.example.com/4".to_string()));
    }
}

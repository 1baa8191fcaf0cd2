use std::sync::Arc;

use location_cache::{
    CoordinateSegmentation, LocationCache, LruCache, PopularityCache, distance_weighted,
};
use protocol_craq::ServerId;

use crate::config::{CacheConfig, CachePolicy};
use crate::error::OsegError;

/// Build the cache selected by `config`.
///
/// `cseg` supplies server regions to the distance policy and is unused by
/// the others.
pub fn build_cache(
    config: &CacheConfig,
    local: ServerId,
    cseg: Arc<dyn CoordinateSegmentation>,
) -> Result<Arc<dyn LocationCache>, OsegError> {
    config.validate()?;
    let cache: Arc<dyn LocationCache> = match config.policy {
        CachePolicy::Lru => Arc::new(
            LruCache::builder()
                .max_size(config.max_size)
                .clean_group_size(config.clean_group_size)
                .entry_lifetime(config.entry_lifetime())
                .build()?,
        ),
        CachePolicy::Popularity => {
            let mut builder = PopularityCache::builder()
                .max_size(config.max_size)
                .ewma_weight(config.ewma_weight)
                .sample_size(config.sample_size)
                .tie_break(config.tie_break.into());
            if let Some(seed) = config.seed {
                builder = builder.seed(seed);
            }
            Arc::new(builder.build()?)
        }
        CachePolicy::Distance => Arc::new(distance_weighted(
            cseg,
            local,
            config.interest_radius,
            config.max_size,
        )?),
    };
    tracing::debug!(
        policy = cache.name(),
        max_size = cache.max_size(),
        "location cache built"
    );
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use location_cache::BoundingBox;
    use protocol_craq::{CraqEntry, ObjectId};

    struct Empty;

    impl CoordinateSegmentation for Empty {
        fn server_region(&self, _server: ServerId) -> Vec<BoundingBox> {
            Vec::new()
        }
    }

    #[test]
    fn test_policies() {
        for (policy, name) in [
            (CachePolicy::Lru, "lru"),
            (CachePolicy::Popularity, "popularity"),
            (CachePolicy::Distance, "distance"),
        ] {
            let config = CacheConfig {
                policy,
                max_size: 16,
                ..Default::default()
            };
            let cache = build_cache(&config, 1, Arc::new(Empty)).unwrap();
            assert_eq!(cache.name(), name);
            assert_eq!(cache.max_size(), 16);
        }
    }

    #[test]
    fn test_lru_round_trip() {
        let cache = build_cache(&CacheConfig::default(), 1, Arc::new(Empty)).unwrap();
        let id = ObjectId::from_u128(5);
        cache.insert(id, CraqEntry::new(2, 1.0));
        assert_eq!(cache.lookup(&id), Some(CraqEntry::new(2, 1.0)));
    }

    #[test]
    fn test_invalid() {
        let config = CacheConfig {
            max_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            build_cache(&config, 1, Arc::new(Empty)),
            Err(OsegError::Config(_))
        ));
    }
}

use std::{sync::Arc, time::Duration};

use crate::{
    config::Config,
    database::{KvStore, RedisStore, init_redis},
};

pub struct State {
    pub config: Config,
    pub store: Arc<dyn KvStore>,
}

impl State {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let manager = init_redis(&config.redis_url).await;
        let store = Arc::new(RedisStore::new(
            manager,
            Duration::from_millis(config.store_timeout_ms),
        ));

        Arc::new(Self { config, store })
    }

    /// Wire in a different backend, used by tests with `MemoryStore`.
    pub fn with_store(config: Config, store: Arc<dyn KvStore>) -> Arc<Self> {
        Arc::new(Self { config, store })
    }
}

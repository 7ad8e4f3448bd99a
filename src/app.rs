use std::{sync::Arc, time::Instant};

use crate::{
    channels::DedicatedChannels, characters::Characters, config::Config, permissions::Access,
    platform::Platform, roleplays::Roleplays, store::Store,
};

/// Everything a command or sweep needs, wired together once at start-up.
#[derive(Clone)]
pub struct App {
    pub store: Store,
    pub platform: Arc<dyn Platform>,
    pub channels: DedicatedChannels,
    pub roleplays: Roleplays,
    pub characters: Characters,
    pub access: Access,
    pub config: Arc<Config>,
    pub started: Instant,
}

impl App {
    pub fn new(store: Store, platform: Arc<dyn Platform>, config: Config) -> Self {
        let channels = DedicatedChannels::new(store.clone(), platform.clone());
        App {
            roleplays: Roleplays::new(store.clone(), platform.clone(), channels.clone()),
            characters: Characters::new(store.clone(), platform.clone()),
            access: Access::new(store.clone(), platform.clone()),
            channels,
            store,
            platform,
            config: Arc::new(config),
            started: Instant::now(),
        }
    }
}

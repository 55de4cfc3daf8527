//! State shared by the registry handlers, the placement engine and the
//! store façade.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::ItemCache;
use crate::codec::LabelCodec;
use crate::config::Config;
use crate::host::Host;
use crate::registry::UnitRegistry;

pub(crate) struct StoreContext<H: Host> {
    pub(crate) config: Config,
    pub(crate) host: Arc<H>,
    pub(crate) codec: Box<dyn LabelCodec>,
    pub(crate) registry: UnitRegistry,
    pub(crate) cache: ItemCache,
    ready: AtomicBool,
}

impl<H: Host> StoreContext<H> {
    pub(crate) fn new(config: Config, host: Arc<H>, codec: Box<dyn LabelCodec>) -> Self {
        Self {
            config,
            host,
            codec,
            registry: UnitRegistry::new(),
            cache: ItemCache::new(),
            ready: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }
}

use log::info;

use crate::backend::{Backend, MemoryBackend, TiKvBackend};
use crate::error::CrawlError;
use crate::types::{BackendKind, CrawlConfigs, StoreConfig};

pub async fn connect(config: &StoreConfig) -> Result<Backend, CrawlError> {
    let configs = CrawlConfigs::new(config.read_only);

    match config.backend {
        BackendKind::TiKv => {
            info!("Connecting to TiKV at {}", config.pd_endpoints.join(","));
            let backend = TiKvBackend::connect(&config.pd_endpoints, configs).await?;
            Ok(Backend::TiKv(backend))
        }
        BackendKind::Memory => {
            info!("Using in-memory store");
            Ok(Backend::Memory(MemoryBackend::new(configs)))
        }
    }
}

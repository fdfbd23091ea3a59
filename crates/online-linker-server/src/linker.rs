//! Lifecycle facade tying configuration, sources, targets and managers.

use std::sync::Arc;

use online_linker_core::{Configuration, OnlineSupplier, ReplacementStrategy, SharedStore};
use online_linker_sources::{build_sources, SourceContext};
use tracing::{debug, info};

use crate::broadcasting::BroadcastingManager;
use crate::error::ManagerError;
use crate::online::OnlineManager;
use crate::target::build_targets;

/// A running online-linker instance.
///
/// Dropping it stops both managers.
#[derive(Debug)]
pub struct OnlineLinker {
    broadcasting: Option<BroadcastingManager>,
    online: Option<Arc<OnlineManager>>,
}

impl OnlineLinker {
    /// Build and start everything `config` enables.
    ///
    /// `supplier` reports the host's local count. `store` is required when an
    /// enabled section reads or writes the shared store. `hook` is invoked once
    /// with the online manager unless the replacement strategy is `none`; an
    /// error from it aborts the start.
    pub fn start<H>(
        config: &Configuration,
        supplier: OnlineSupplier,
        store: Option<SharedStore>,
        hook: H,
    ) -> Result<Self, ManagerError>
    where
        H: FnOnce(Arc<OnlineManager>, ReplacementStrategy) -> Result<(), ManagerError>,
    {
        config.validate()?;
        if config.needs_shared_store() && store.is_none() {
            return Err(ManagerError::MissingSharedStore);
        }

        let broadcasting = if config.broadcasting.enabled {
            let targets = build_targets(&config.broadcasting.targets, store.as_ref())?;
            Some(BroadcastingManager::start(
                &config.broadcasting,
                supplier.clone(),
                targets,
            )?)
        } else {
            debug!("Broadcasting disabled");
            None
        };

        let online = if config.status.enabled {
            let mut ctx = SourceContext::new(supplier);
            if let Some(store) = &store {
                ctx = ctx.with_store(store.clone());
            }
            let sources = build_sources(&config.status.sources, &ctx)?;
            let manager = OnlineManager::start(&config.status, sources)?;

            let strategy = config.status.replacement.strategy;
            if strategy != ReplacementStrategy::None {
                hook(manager.clone(), strategy)?;
                debug!("Status hook installed with strategy {}", strategy);
            }
            Some(manager)
        } else {
            debug!("Status aggregation disabled");
            None
        };

        info!(
            "Online linker started (broadcasting: {}, status: {})",
            broadcasting.is_some(),
            online.is_some()
        );
        Ok(Self {
            broadcasting,
            online,
        })
    }

    pub fn online_manager(&self) -> Option<&Arc<OnlineManager>> {
        self.online.as_ref()
    }

    pub fn broadcasting_manager(&self) -> Option<&BroadcastingManager> {
        self.broadcasting.as_ref()
    }

    /// Stop broadcasting, then the online manager. Idempotent.
    pub fn stop(&self) {
        if let Some(broadcasting) = &self.broadcasting {
            broadcasting.stop();
        }
        if let Some(online) = &self.online {
            online.stop();
        }
    }
}

impl Drop for OnlineLinker {
    fn drop(&mut self) {
        self.stop();
    }
}

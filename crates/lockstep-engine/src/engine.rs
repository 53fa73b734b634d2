//! Wiring of the registry, provisioner and lifecycle coordinator

use std::sync::Arc;

use lockstep_core::ModelTable;
use lockstep_services::{
    ClientToken, ClientTokenSource, CloudDeviceService, LinkFactory, LocalRepository, UserSyncService,
};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::lifecycle::LifecycleCoordinator;
use crate::provision::Provisioner;
use crate::resolver::IdentityResolver;
use crate::session::SessionRegistry;

/// External services the engine depends on
#[derive(Clone)]
pub struct Collaborators {
    pub cloud: Arc<dyn CloudDeviceService>,
    pub sync: Arc<dyn UserSyncService>,
    pub repository: Arc<dyn LocalRepository>,
    pub links: Arc<dyn LinkFactory>,
    pub tokens: Arc<dyn ClientTokenSource>,
}

pub struct Engine {
    registry: Arc<SessionRegistry>,
    provisioner: Provisioner,
    lifecycle: LifecycleCoordinator,
    tokens: Arc<dyn ClientTokenSource>,
}

impl Engine {
    pub fn new(models: ModelTable, services: Collaborators, config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let resolver = IdentityResolver::new(Arc::new(models), services.repository.clone());

        let registry = Arc::new(SessionRegistry::new(
            resolver,
            services.links.clone(),
            services.cloud.clone(),
            services.repository.clone(),
            config.clone(),
        ));
        let provisioner = Provisioner::new(
            services.cloud.clone(),
            services.repository.clone(),
            services.tokens.clone(),
            config.clone(),
        );
        let lifecycle = LifecycleCoordinator::new(
            registry.clone(),
            services.cloud,
            services.sync,
            services.repository,
            services.tokens.clone(),
            config,
        );

        Self {
            registry,
            provisioner,
            lifecycle,
            tokens: services.tokens,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    pub fn lifecycle(&self) -> &LifecycleCoordinator {
        &self.lifecycle
    }

    /// Fresh token for a caller-driven invocation such as `get_or_provision`
    pub async fn client_token(&self) -> Result<ClientToken, EngineError> {
        Ok(self.tokens.client_token().await?)
    }
}

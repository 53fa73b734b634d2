//! Subcommand handlers

use anyhow::{Context, Result};
use lockstep_core::{DeviceId, DeviceInfo};
use lockstep_engine::{Collaborators, Engine};
use lockstep_services::{
    ClientTokenSource, CloudDeviceService, HttpCloudClient, JsonFileRepository, LocalRepository, StaticTokenSource,
    UnavailableLinkFactory, UuidTokenSource,
};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

pub fn classify(config: &Config, model: &str) -> Result<()> {
    let capability = config.model_table().classify(model)?;
    println!("{}: {}", model, capability);
    Ok(())
}

/// Engine wired to the HTTP cloud and the JSON record store
pub struct App {
    engine: Engine,
    cloud: Arc<HttpCloudClient>,
    repository: Arc<JsonFileRepository>,
}

impl App {
    pub fn build(config: &Config, token: Option<&str>) -> Result<Self> {
        let cloud = Arc::new(HttpCloudClient::new(&config.cloud).context("Failed to create cloud client")?);
        let repository = Arc::new(
            JsonFileRepository::open(&config.store.path)
                .with_context(|| format!("Failed to open record store {}", config.store.path.display()))?,
        );
        let tokens: Arc<dyn ClientTokenSource> = match token {
            Some(token) => Arc::new(StaticTokenSource::new(token)),
            None => Arc::new(UuidTokenSource),
        };

        info!(
            cloud = cloud.base_url(),
            store = %config.store.path.display(),
            "Services ready"
        );

        let services = Collaborators {
            cloud: cloud.clone(),
            sync: cloud.clone(),
            repository: repository.clone(),
            links: Arc::new(UnavailableLinkFactory),
            tokens,
        };
        let engine = Engine::new(config.model_table(), services, config.engine_config());

        Ok(Self {
            engine,
            cloud,
            repository,
        })
    }

    pub async fn resolve(&self, code: Option<&str>, id: Option<&str>) -> Result<()> {
        let resolver = self.engine.registry().resolver();
        let info = match (code, id) {
            (Some(code), _) => resolver.resolve_from_code(code)?,
            (None, Some(id)) => resolver.resolve_from_identifier(&DeviceId::parse(id)).await?,
            (None, None) => anyhow::bail!("Either --code or --id is required"),
        };
        print_device(&info);
        Ok(())
    }

    pub async fn add(&self, code: &str) -> Result<()> {
        let token = self.engine.client_token().await?;
        let session = self
            .engine
            .registry()
            .get_or_provision(code, &token)
            .await
            .context("Failed to open session")?;

        print_device(session.info());
        println!("  Transport: {:?}", session.transport());
        if let Some(thing_name) = session.thing_name().await {
            println!("  Thing name: {}", thing_name);
        }
        Ok(())
    }

    pub async fn records(&self) -> Result<()> {
        let records = self.repository.list().await?;
        println!("{} stored records:", records.len());
        for record in records {
            println!(
                "  {} - {} ({})",
                record.identifier, record.device_name, record.model
            );
            if let Some(thing_name) = &record.thing_name {
                println!("    Thing name: {}", thing_name);
            }
            println!("    Saved: {}", record.saved_at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        Ok(())
    }

    pub async fn devices(&self) -> Result<()> {
        let token = self.engine.client_token().await?;
        let devices = self.cloud.list(&token).await.context("Failed to list cloud devices")?;
        println!("{} cloud devices:", devices.len());
        for device in devices {
            println!(
                "  {} - {} ({})",
                device.thing_name, device.device_name, device.model
            );
            if let Some(serial) = &device.serial_number {
                println!("    Serial: {}", serial);
            }
        }
        Ok(())
    }

    pub async fn delete(&self, identifier: &str) -> Result<()> {
        let id = DeviceId::parse(identifier);
        let session = self.engine.registry().get(&id).await?;
        self.engine
            .lifecycle()
            .delete(&session)
            .await
            .with_context(|| format!("Failed to delete {}", id))?;
        println!("Deleted {}", id);
        Ok(())
    }

    pub async fn factory_reset(&self, identifier: &str, admin_code: &str) -> Result<()> {
        let id = DeviceId::parse(identifier);
        let session = self.engine.registry().get(&id).await?;
        self.engine
            .lifecycle()
            .factory_reset(&session, admin_code)
            .await
            .with_context(|| format!("Failed to factory reset {}", id))?;
        println!("Factory reset {}", id);
        Ok(())
    }
}

fn print_device(info: &DeviceInfo) {
    println!("{} - {}", info.identifier(), info.device_name());
    println!("  Model: {} ({})", info.model(), info.capability());
    if let Some(serial) = info.serial_number() {
        println!("  Serial: {}", serial);
    }
}

//! Identity resolution: scanned code or stored identifier to [`DeviceInfo`]

use std::sync::Arc;

use lockstep_core::{code, DeviceId, DeviceInfo, ModelTable, ScannedCode};
use lockstep_services::LocalRepository;
use tracing::debug;

use crate::error::EngineError;

pub struct IdentityResolver {
    models: Arc<ModelTable>,
    repository: Arc<dyn LocalRepository>,
}

impl IdentityResolver {
    pub fn new(models: Arc<ModelTable>, repository: Arc<dyn LocalRepository>) -> Self {
        Self { models, repository }
    }

    pub fn models(&self) -> &ModelTable {
        &self.models
    }

    /// Decode a scanned code (pairing first, then onboarding)
    pub fn decode(&self, content: &str) -> Result<ScannedCode, EngineError> {
        Ok(code::decode(content)?)
    }

    /// Build the device description for a decoded code
    pub fn describe(&self, code: &ScannedCode) -> Result<DeviceInfo, EngineError> {
        let capability = self.models.classify(code.model())?;
        Ok(DeviceInfo::new(
            code.identifier().clone(),
            code.model(),
            code.serial_number().map(str::to_string),
            code.device_name(),
            capability,
        ))
    }

    pub fn resolve_from_code(&self, content: &str) -> Result<DeviceInfo, EngineError> {
        let code = self.decode(content)?;
        self.describe(&code)
    }

    /// Resolve a MAC address or thing-name through the stored connection record
    pub async fn resolve_from_identifier(&self, identifier: &DeviceId) -> Result<DeviceInfo, EngineError> {
        let record = self
            .repository
            .get(identifier)
            .await?
            .ok_or_else(|| EngineError::NotFound(identifier.to_string()))?;
        let capability = self.models.classify(&record.model)?;
        debug!(device = %record.identifier, model = %record.model, %capability, "Resolved stored device");

        Ok(DeviceInfo::new(
            record.identifier,
            record.model,
            record.serial_number,
            record.device_name,
            capability,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{onboarding_code, pairing_code, stored_record, FakeRepository};
    use lockstep_core::{code::decode_onboarding, code::decode_pairing, Capability};

    fn resolver(repo: Arc<FakeRepository>) -> IdentityResolver {
        IdentityResolver::new(Arc::new(ModelTable::builtin()), repo)
    }

    #[test]
    fn test_resolve_pairing_code() {
        let resolver = resolver(Arc::new(FakeRepository::default()));
        let info = resolver
            .resolve_from_code(&pairing_code("aabbccddeeff", "KD01", None))
            .unwrap();
        assert_eq!(info.identifier().as_str(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(info.capability(), Capability::ProximityOnly);
        assert_eq!(info.device_name(), "KD01-EEFF");
        assert!(info.serial_number().is_none());
    }

    #[test]
    fn test_resolve_onboarding_code() {
        let resolver = resolver(Arc::new(FakeRepository::default()));
        let info = resolver
            .resolve_from_code(&onboarding_code("aabbccddee01", "SN-1", "KDW00"))
            .unwrap();
        assert_eq!(info.capability(), Capability::NetworkCapable);
        assert_eq!(info.serial_number(), Some("SN-1"));
    }

    #[test]
    fn test_unknown_model_fails_resolution() {
        let resolver = resolver(Arc::new(FakeRepository::default()));
        let result = resolver.resolve_from_code(&pairing_code("aabbccddeeff", "ZZ9", None));
        assert!(matches!(result, Err(EngineError::UnknownModel(m)) if m == "ZZ9"));
    }

    #[test]
    fn test_garbage_is_invalid_code() {
        let resolver = resolver(Arc::new(FakeRepository::default()));
        assert!(matches!(resolver.resolve_from_code("%%%"), Err(EngineError::InvalidCode(_))));
    }

    #[test]
    fn test_decoders_are_mutually_exclusive() {
        let codes = [
            pairing_code("aabbccddeeff", "KD01", Some("Door")),
            onboarding_code("aabbccddeeff", "SN-1", "KDW00"),
        ];
        for content in &codes {
            let both = decode_pairing(content).is_ok() && decode_onboarding(content).is_ok();
            assert!(!both);
        }
    }

    #[tokio::test]
    async fn test_resolve_from_identifier() {
        let repo = Arc::new(FakeRepository::default());
        repo.insert(stored_record("aabbccddeeff", "KDW00", Some("thing-1")));
        let resolver = resolver(repo);

        let by_thing = resolver
            .resolve_from_identifier(&DeviceId::parse("thing-1"))
            .await
            .unwrap();
        assert_eq!(by_thing.identifier().as_str(), "AA:BB:CC:DD:EE:FF");
        assert!(by_thing.is_network_capable());

        let missing = resolver.resolve_from_identifier(&DeviceId::parse("thing-2")).await;
        assert!(matches!(missing, Err(EngineError::NotFound(_))));
    }
}

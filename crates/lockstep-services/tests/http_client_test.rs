// Integration tests for `HttpCloudClient` using wiremock.

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lockstep_core::attributes::Timezone;
use lockstep_core::{DeviceId, ProximityDeviceRecord, RegistryAttributes, SyncVersion, SyncWrite, UserSyncDocument};
use lockstep_services::{
    ClientToken, CloudConfig, CloudDeviceService, HttpCloudClient, ProvisioningTicket, ServiceError, UserSyncService,
};

async fn setup() -> (MockServer, HttpCloudClient) {
    let server = MockServer::start().await;
    let config = CloudConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    let client = HttpCloudClient::new(&config).unwrap();
    (server, client)
}

fn token() -> ClientToken {
    ClientToken::new("token-1")
}

#[tokio::test]
async fn test_create_returns_thing_name() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/device-provision/create"))
        .and(body_partial_json(json!({
            "applicationID": "Sunion_20220617",
            "serialNumber": "SN-42",
            "timezone": { "shortName": "Asia/Taipei", "offset": 28800 },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ThingName": "thing-42" })))
        .expect(1)
        .mount(&server)
        .await;

    let ticket = ProvisioningTicket {
        application_id: "Sunion_20220617".to_string(),
        model: "KDW00".to_string(),
        serial_number: "SN-42".to_string(),
        device_name: "Front door".to_string(),
        timezone: Timezone {
            short_name: "Asia/Taipei".to_string(),
            offset: 28800,
        },
        data_encryption_key: "Sunion_20220620".to_string(),
        client_token: "token-1".to_string(),
    };

    assert_eq!(client.create(&ticket).await.unwrap(), "thing-42");
}

#[tokio::test]
async fn test_list_devices() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/device-list"))
        .and(body_partial_json(json!({ "clientToken": "token-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Devices": [
                { "ThingName": "thing-1", "SerialNumber": "SN-1", "DeviceName": "Front", "Model": "KDW00" },
                { "ThingName": "thing-2" },
            ]
        })))
        .mount(&server)
        .await;

    let devices = client.list(&token()).await.unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].serial_number.as_deref(), Some("SN-1"));
    assert_eq!(devices[1].thing_name, "thing-2");
}

#[tokio::test]
async fn test_get_ticket() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/device-provision/ticket-get"))
        .and(body_partial_json(json!({ "Ticket": "ticket-7" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Ticket": "ticket-7",
            "ThingName": "thing-7",
            "SerialNumber": "SN-7",
            "Timezone": { "shortName": "UTC", "offset": 0 },
        })))
        .mount(&server)
        .await;

    let details = client.get_ticket("ticket-7", &token()).await.unwrap();
    assert_eq!(details.thing_name, "thing-7");
    assert_eq!(details.timezone.short_name, "UTC");
}

#[tokio::test]
async fn test_registry_round_trip() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/device-registry/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Payload": { "Attributes": { "autoLock": true, "autoLockDelay": 5, "deviceName": "Front" } }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/device-registry/update"))
        .and(body_partial_json(json!({
            "ThingName": "thing-1",
            "Attributes": { "autoLockDelay": 10 },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Payload": { "Attributes": { "autoLock": true, "autoLockDelay": 10, "deviceName": "Front" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let attrs = client.get_registry("thing-1", &token()).await.unwrap();
    assert!(attrs.auto_lock);
    assert_eq!(attrs.auto_lock_delay, 5);

    let edited = RegistryAttributes {
        auto_lock_delay: 10,
        ..attrs
    };
    let stored = client.update_registry("thing-1", &edited, &token()).await.unwrap();
    assert_eq!(stored.auto_lock_delay, 10);
}

#[tokio::test]
async fn test_admin_code_list() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/device/admin-code-get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "AccessCode": [{ "Name": "admin", "Code": "1234" }]
        })))
        .mount(&server)
        .await;

    let codes = client.get_admin_code("thing-1", &token()).await.unwrap();
    assert_eq!(codes[0].code, "1234");
}

#[tokio::test]
async fn test_delete_error_status() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/device/delete"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = client.delete("thing-1", &token()).await;
    assert!(matches!(result, Err(ServiceError::Status { status: 500, ref body }) if body == "boom"));
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/device-list"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    assert!(matches!(client.list(&token()).await, Err(ServiceError::Decode(_))));
}

fn sync_body(version: u64, macs: &[&str]) -> serde_json::Value {
    let devices: Vec<_> = macs.iter().map(|m| json!({ "MACAddress": m, "DisplayName": "lock" })).collect();
    json!({ "Payload": { "Dataset": { "BLEDevices": { "Devices": devices, "version": version } } } })
}

#[tokio::test]
async fn test_get_user_sync() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/user-sync/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sync_body(3, &["AA:BB:CC:DD:EE:01"])))
        .mount(&server)
        .await;

    let doc = client.get_user_sync(&token()).await.unwrap();
    assert_eq!(doc.version, SyncVersion(3));
    assert!(doc.contains(&DeviceId::parse("aabbccddee01")));
}

#[tokio::test]
async fn test_update_user_sync_committed() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/user-sync/update"))
        .and(body_partial_json(json!({
            "Payload": { "Dataset": { "BLEDevices": { "version": 3 } } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(sync_body(4, &[])))
        .expect(1)
        .mount(&server)
        .await;

    let doc = UserSyncDocument::new(vec![], SyncVersion(3));
    let result = client.update_user_sync(&token(), &doc).await.unwrap();
    assert_eq!(result, SyncWrite::Committed { version: SyncVersion(4) });
}

#[tokio::test]
async fn test_update_user_sync_conflict() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/user-sync/update"))
        .respond_with(ResponseTemplate::new(409).set_body_json(sync_body(5, &["AA:BB:CC:DD:EE:01"])))
        .mount(&server)
        .await;

    let doc = UserSyncDocument::new(
        vec![ProximityDeviceRecord::new(&DeviceId::parse("aabbccddee02"), "spare")],
        SyncVersion(3),
    );
    let result = client.update_user_sync(&token(), &doc).await.unwrap();
    assert_eq!(
        result,
        SyncWrite::Conflict {
            attempted: SyncVersion(3),
            current: Some(SyncVersion(5)),
        }
    );
}

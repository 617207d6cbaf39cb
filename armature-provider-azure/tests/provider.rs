//! Integration tests for the Azure provider over a mock ARM server

use std::sync::Arc;

use armature_core::resource::{Resource, ResourceId, Value};
use armature_locks::LockRegistry;
use armature_provider_azure::{AzureConfig, AzureProvider};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VNET_PATH: &str =
    "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Network/virtualNetworks/vnet1";

fn test_config(endpoint: &str) -> AzureConfig {
    let mut config = AzureConfig::new("sub-1", "rg-1").with_endpoint(endpoint);
    // Fast polling so tests finish quickly.
    config.polling.initial_interval_ms = 10;
    config.polling.max_interval_ms = 50;
    config
}

fn vnet_resource() -> Resource {
    Resource::new("virtual_network", "vnet1")
        .with_attribute("location", Value::String("westeurope".to_string()))
        .with_attribute(
            "address_space",
            Value::List(vec![Value::String("10.0.0.0/16".to_string())]),
        )
}

#[tokio::test]
async fn create_virtual_network_polls_async_operation_to_success() {
    let server = MockServer::start().await;
    let op_url = format!("{}/operations/op1", server.uri());

    Mock::given(method("PUT"))
        .and(path(VNET_PATH))
        .and(query_param("api-version", "2023-09-01"))
        .respond_with(
            ResponseTemplate::new(201).insert_header("Azure-AsyncOperation", op_url.as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    // First status check reports in-progress, the second success.
    Mock::given(method("GET"))
        .and(path("/operations/op1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "InProgress"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/op1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(VNET_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "vnet1",
            "location": "westeurope",
            "properties": {
                "provisioningState": "Succeeded",
                "addressSpace": {"addressPrefixes": ["10.0.0.0/16"]}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let locks = Arc::new(LockRegistry::new());
    let provider = AzureProvider::new(test_config(&server.uri()), Arc::clone(&locks));

    let state = provider.create_resource(vnet_resource()).await.unwrap();
    assert!(state.exists);
    assert_eq!(state.identifier.as_deref(), Some(VNET_PATH));
    assert_eq!(
        state.attributes.get("address_space"),
        Some(&Value::List(vec![Value::String("10.0.0.0/16".to_string())]))
    );
    assert_eq!(
        state.attributes.get("location"),
        Some(&Value::String("westeurope".to_string()))
    );

    // All locks released once the handler returns.
    assert!(locks.is_empty());
}

#[tokio::test]
async fn create_subnet_completes_synchronously_from_provisioning_state() {
    let server = MockServer::start().await;
    let subnet_path = format!("{VNET_PATH}/subnets/s1");
    let body = json!({
        "name": "s1",
        "properties": {
            "provisioningState": "Succeeded",
            "addressPrefix": "10.0.1.0/24"
        }
    });

    Mock::given(method("PUT"))
        .and(path(subnet_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(subnet_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AzureProvider::new(
        test_config(&server.uri()),
        Arc::new(LockRegistry::new()),
    );

    let resource = Resource::new("subnet", "s1")
        .with_attribute("virtual_network", Value::String("vnet1".to_string()))
        .with_attribute("address_prefix", Value::String("10.0.1.0/24".to_string()));

    let state = provider.create_resource(resource).await.unwrap();
    assert!(state.exists);
    assert_eq!(state.identifier.as_deref(), Some(subnet_path.as_str()));
    assert_eq!(
        state.attributes.get("address_prefix"),
        Some(&Value::String("10.0.1.0/24".to_string()))
    );
    assert_eq!(
        state.attributes.get("virtual_network"),
        Some(&Value::String("vnet1".to_string()))
    );
}

#[tokio::test]
async fn read_maps_404_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(VNET_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let provider = AzureProvider::new(
        test_config(&server.uri()),
        Arc::new(LockRegistry::new()),
    );

    let state = provider
        .read_resource("virtual_network", "vnet1", Some(VNET_PATH))
        .await
        .unwrap();
    assert!(!state.exists);
}

#[tokio::test]
async fn delete_polls_location_header_to_completion() {
    let server = MockServer::start().await;
    let op_url = format!("{}/operations/del1", server.uri());

    Mock::given(method("DELETE"))
        .and(path(VNET_PATH))
        .respond_with(ResponseTemplate::new(202).insert_header("Location", op_url.as_str()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/del1"))
        .respond_with(ResponseTemplate::new(202))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/del1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let locks = Arc::new(LockRegistry::new());
    let provider = AzureProvider::new(test_config(&server.uri()), Arc::clone(&locks));

    let id = ResourceId::new("virtual_network", "vnet1");
    provider.delete_resource(&id, VNET_PATH).await.unwrap();
    assert!(locks.is_empty());
}

#[tokio::test]
async fn delete_of_missing_resource_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(VNET_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let provider = AzureProvider::new(
        test_config(&server.uri()),
        Arc::new(LockRegistry::new()),
    );

    let id = ResourceId::new("virtual_network", "vnet1");
    provider.delete_resource(&id, VNET_PATH).await.unwrap();
}

#[tokio::test]
async fn rejected_request_surfaces_server_payload_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(VNET_PATH))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": {"code": "Conflict", "message": "address space overlaps vnet2"}
        })))
        .mount(&server)
        .await;

    let provider = AzureProvider::new(
        test_config(&server.uri()),
        Arc::new(LockRegistry::new()),
    );

    let err = provider.create_resource(vnet_resource()).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("409"), "unexpected error: {message}");
    assert!(
        message.contains("address space overlaps vnet2"),
        "unexpected error: {message}"
    );
}

#[tokio::test]
async fn failed_operation_surfaces_status_payload() {
    let server = MockServer::start().await;
    let op_url = format!("{}/operations/op1", server.uri());

    Mock::given(method("PUT"))
        .and(path(VNET_PATH))
        .respond_with(
            ResponseTemplate::new(201).insert_header("Azure-AsyncOperation", op_url.as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/op1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Failed",
            "error": {"code": "InUse", "message": "subnet s1 is in use"}
        })))
        .mount(&server)
        .await;

    let locks = Arc::new(LockRegistry::new());
    let provider = AzureProvider::new(test_config(&server.uri()), Arc::clone(&locks));

    let err = provider.create_resource(vnet_resource()).await.unwrap_err();
    assert!(
        err.to_string().contains("subnet s1 is in use"),
        "unexpected error: {err}"
    );
    // Locks released on the failure path too.
    assert!(locks.is_empty());
}

#[tokio::test]
async fn concurrent_subnet_mutations_against_one_vnet_complete() {
    let server = MockServer::start().await;

    for name in ["s1", "s2"] {
        let subnet_path = format!("{VNET_PATH}/subnets/{name}");
        let body = json!({
            "name": name,
            "properties": {"provisioningState": "Succeeded", "addressPrefix": "10.0.1.0/24"}
        });
        Mock::given(method("PUT"))
            .and(path(subnet_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(subnet_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
    }

    let locks = Arc::new(LockRegistry::new());
    let provider = Arc::new(AzureProvider::new(
        test_config(&server.uri()),
        Arc::clone(&locks),
    ));

    // Both subnets contend on the shared virtual network lock.
    let mut handles = Vec::new();
    for name in ["s1", "s2"] {
        let provider = Arc::clone(&provider);
        handles.push(tokio::spawn(async move {
            let resource = Resource::new("subnet", name)
                .with_attribute("virtual_network", Value::String("vnet1".to_string()))
                .with_attribute("address_prefix", Value::String("10.0.1.0/24".to_string()));
            provider.create_resource(resource).await
        }));
    }

    for handle in handles {
        let state = handle.await.unwrap().unwrap();
        assert!(state.exists);
    }
    assert!(locks.is_empty());
}

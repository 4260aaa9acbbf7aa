use actix_web::{App, http::StatusCode, test, web};
use openlogger_wifi::{
    api::Api,
    openlogger_client::{AdapterStatus, ConnectionState, SavedParameterSet},
    wifi::{DeviceContext, LEAVE_DEVICE_MANAGER_PROMPT},
};
use serde_json::{Value, json};

#[mockall_double::double]
use openlogger_wifi::openlogger_client::DeviceGateway;

fn status(state: ConnectionState, ip_address: &str) -> AdapterStatus {
    AdapterStatus {
        status_code: 0,
        adapter: "wlan0".to_string(),
        status: state,
        ip_address: ip_address.to_string(),
        ssid: None,
        security_type: None,
        reason: None,
    }
}

fn booted_gateway() -> DeviceGateway {
    let mut gateway = DeviceGateway::default();
    gateway
        .expect_list_adapters()
        .returning(|| Box::pin(async { Ok(vec!["wlan0".to_string()]) }));
    gateway
        .expect_adapter_status()
        .returning(|_| Box::pin(async { Ok(status(ConnectionState::Disconnected, "none")) }));
    gateway
        .expect_storage_locations()
        .returning(|| Box::pin(async { Ok(vec!["sd0".to_string()]) }));
    gateway.expect_list_saved_parameters().returning(|_| {
        Box::pin(async {
            Ok(vec![SavedParameterSet {
                ssid: "Lab-5G".to_string(),
                security_type: Some("wpa2".to_string()),
                auto_connect: true,
            }])
        })
    });
    gateway
}

async fn make_api(gateway: DeviceGateway, bridge: bool) -> Api<DeviceGateway> {
    Api::new(gateway, DeviceContext { bridge })
        .await
        .expect("failed to create api")
}

async fn call(api: Api<DeviceGateway>, req: test::TestRequest) -> (StatusCode, Value) {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(api))
            .configure(Api::<DeviceGateway>::configure),
    )
    .await;
    let resp = test::call_service(&app, req.to_request()).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn state_reports_bootstrapped_selection() {
    let api = make_api(booted_gateway(), true).await;

    let (status, body) = call(api, test::TestRequest::get().uri("/wifi")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["selectedAdapter"], "wlan0");
    assert_eq!(body["selectedStorageLocation"], "sd0");
    assert_eq!(body["statusMessage"], "Ready");
    assert_eq!(body["savedNetworks"][0]["ssid"], "Lab-5G");
    assert_eq!(body["savedNetworks"][0]["storageLocation"], "sd0");
}

#[tokio::test]
async fn add_network_without_identifier_is_bad_request() {
    let api = make_api(booted_gateway(), true).await;

    let (status, body) = call(
        api,
        test::TestRequest::post()
            .uri("/wifi/networks")
            .set_json(json!({
                "network": { "ssid": "", "bssid": "", "securityType": "wpa2" },
                "password": "secret"
            })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["outcome"]["kind"], "rejected");
    assert_eq!(body["outcome"]["detail"]["reason"], "missingIdentifier");
}

#[tokio::test]
async fn load_and_connect_requires_confirmation_outside_bridge_mode() {
    let api = make_api(booted_gateway(), false).await;

    let (status, body) = call(
        api.clone(),
        test::TestRequest::get().uri("/wifi/saved/0/precheck"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prompt"], LEAVE_DEVICE_MANAGER_PROMPT);

    let (status, _) = call(api, test::TestRequest::post().uri("/wifi/saved/0/connect")).await;
    assert_eq!(status, StatusCode::PRECONDITION_REQUIRED);
}

#[tokio::test]
async fn forget_unknown_saved_network_is_not_found() {
    let api = make_api(booted_gateway(), true).await;

    let (status, _) = call(api, test::TestRequest::post().uri("/wifi/saved/7/forget")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn forget_deletes_from_storage_location() {
    let mut gateway = booted_gateway();
    gateway
        .expect_delete_saved_parameters()
        .withf(|location, ssid| location == "sd0" && ssid == "Lab-5G")
        .times(1)
        .returning(|_, _| Box::pin(async { Ok(()) }));
    let api = make_api(gateway, true).await;

    let (status, body) = call(
        api.clone(),
        test::TestRequest::post().uri("/wifi/saved/0/forget"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"]["kind"], "completed");
    assert_eq!(
        api.wifi.snapshot().status_message,
        "Done deleting saved network."
    );
}

#[tokio::test]
async fn close_to_device_manager() {
    let api = make_api(booted_gateway(), false).await;

    let (status, body) = call(
        api,
        test::TestRequest::post()
            .uri("/wifi/close")
            .set_json(json!({ "toDeviceManager": true })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "toDeviceManager");
}

#[tokio::test]
async fn close_without_body_reports_adapter_status() {
    let api = make_api(booted_gateway(), false).await;

    let (status, body) = call(api, test::TestRequest::post().uri("/wifi/close")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "withStatus");
    assert_eq!(body["status"]["status"], "disconnected");
}

#[tokio::test]
async fn custom_network_opens_configure_view() {
    let api = make_api(booted_gateway(), true).await;

    let (status, body) = call(api, test::TestRequest::post().uri("/wifi/custom")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["view"], "configure");
    assert_eq!(body["customNetwork"], true);
    assert_eq!(body["selectedNetwork"]["securityType"], "wpa2");
}

#[tokio::test]
async fn version_is_plain_text() {
    let api = make_api(booted_gateway(), true).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(api))
            .configure(Api::<DeviceGateway>::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/version").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        test::read_body(resp).await,
        env!("CARGO_PKG_VERSION").as_bytes()
    );
}

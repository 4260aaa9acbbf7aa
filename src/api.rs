use crate::{
    http_client::ServiceResultResponse,
    openlogger_client::DeviceGateway,
    services::wifi::{DeviceContext, NetworkDescriptor, NetworkRequest, WifiSetupService},
};
use actix_web::{HttpResponse, Responder, web};
use anyhow::Result;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectAdapterPayload {
    adapter: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectStoragePayload {
    storage_location: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectQuery {
    #[serde(default)]
    confirmed: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosePayload {
    #[serde(default)]
    to_device_manager: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecheckResponse {
    prompt: Option<&'static str>,
}

pub struct Api<Gateway>
where
    Gateway: DeviceGateway,
{
    pub wifi: Arc<WifiSetupService<Gateway>>,
}

impl<Gateway> Clone for Api<Gateway>
where
    Gateway: DeviceGateway,
{
    fn clone(&self) -> Self {
        Api {
            wifi: self.wifi.clone(),
        }
    }
}

impl<Gateway> Api<Gateway>
where
    Gateway: DeviceGateway + 'static,
{
    pub async fn new(gateway: Gateway, context: DeviceContext) -> Result<Self> {
        Ok(Api {
            wifi: Arc::new(WifiSetupService::start(gateway, context).await),
        })
    }

    pub async fn version() -> impl Responder {
        HttpResponse::Ok().body(env!("CARGO_PKG_VERSION"))
    }

    pub async fn state(api: web::Data<Self>) -> impl Responder {
        debug!("state() called");
        HttpResponse::Ok().json(api.wifi.snapshot())
    }

    pub async fn select_adapter(
        body: web::Json<SelectAdapterPayload>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("select_adapter() called: {}", body.adapter);
        api.wifi.select_adapter(&body.adapter).into_response()
    }

    pub async fn select_storage_location(
        body: web::Json<SelectStoragePayload>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("select_storage_location() called: {}", body.storage_location);

        api.wifi
            .select_storage_location(&body.storage_location, api.wifi.session_token())
            .await
            .into_response()
    }

    pub async fn scan(api: web::Data<Self>) -> impl Responder {
        debug!("scan() called");

        api.wifi
            .refresh_available_networks(api.wifi.session_token())
            .await
            .into_response()
    }

    pub async fn refresh_saved_networks(api: web::Data<Self>) -> impl Responder {
        debug!("refresh_saved_networks() called");

        api.wifi
            .refresh_saved_networks(api.wifi.session_token())
            .await
            .into_response()
    }

    pub async fn select_network(
        body: web::Json<NetworkDescriptor>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("select_network() called: {:?}", body.display_name());

        api.wifi.select_network(body.into_inner());
        HttpResponse::Ok().json(api.wifi.snapshot())
    }

    pub async fn add_custom_network(api: web::Data<Self>) -> impl Responder {
        debug!("add_custom_network() called");

        api.wifi.add_custom_network();
        HttpResponse::Ok().json(api.wifi.snapshot())
    }

    pub async fn back_to_networks(api: web::Data<Self>) -> impl Responder {
        debug!("back_to_networks() called");

        api.wifi.back_to_networks();
        HttpResponse::Ok().json(api.wifi.snapshot())
    }

    pub async fn add_network(
        body: web::Json<NetworkRequest>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("add_network() called: {:?}", body.network.display_name());

        api.wifi
            .add_network(body.into_inner(), api.wifi.session_token())
            .await
            .into_response()
    }

    pub async fn update_saved_network(
        body: web::Json<NetworkRequest>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("update_saved_network() called");

        api.wifi
            .update_saved_network(body.into_inner(), api.wifi.session_token())
            .await
            .into_response()
    }

    pub async fn modify_saved_network(
        index: web::Path<usize>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("modify_saved_network() called: {index}");
        api.wifi.modify_saved_network(*index).into_response()
    }

    pub async fn forget_saved_network(
        index: web::Path<usize>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("forget_saved_network() called: {index}");

        api.wifi
            .forget_saved_network(*index, api.wifi.session_token())
            .await
            .into_response()
    }

    pub async fn load_and_connect_precheck(api: web::Data<Self>) -> impl Responder {
        debug!("load_and_connect_precheck() called");

        HttpResponse::Ok().json(PrecheckResponse {
            prompt: api.wifi.load_and_connect_precheck(),
        })
    }

    pub async fn load_and_connect(
        index: web::Path<usize>,
        query: web::Query<ConnectQuery>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!(
            "load_and_connect() called: {index} (confirmed: {})",
            query.confirmed
        );

        api.wifi
            .load_and_connect(*index, query.confirmed, api.wifi.session_token())
            .await
            .into_response()
    }

    pub async fn disconnect(api: web::Data<Self>) -> impl Responder {
        debug!("disconnect() called");

        api.wifi
            .manual_disconnect(api.wifi.session_token())
            .await
            .into_response()
    }

    pub async fn cancel(api: web::Data<Self>) -> impl Responder {
        debug!("cancel() called");

        api.wifi.cancel_workflows();
        HttpResponse::Ok().finish()
    }

    pub async fn close(
        body: Option<web::Json<ClosePayload>>,
        api: web::Data<Self>,
    ) -> impl Responder {
        let to_device_manager = body.is_some_and(|body| body.to_device_manager);
        debug!("close() called: {to_device_manager}");

        HttpResponse::Ok().json(api.wifi.close(to_device_manager).await)
    }

    /// Register the wifi routes
    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.route("/version", web::get().to(Self::version))
            .route("/wifi", web::get().to(Self::state))
            .route("/wifi/adapter", web::post().to(Self::select_adapter))
            .route("/wifi/storage", web::post().to(Self::select_storage_location))
            .route("/wifi/scan", web::post().to(Self::scan))
            .route("/wifi/select", web::post().to(Self::select_network))
            .route("/wifi/custom", web::post().to(Self::add_custom_network))
            .route("/wifi/back", web::post().to(Self::back_to_networks))
            .route("/wifi/networks", web::post().to(Self::add_network))
            .route(
                "/wifi/saved/refresh",
                web::post().to(Self::refresh_saved_networks),
            )
            .route(
                "/wifi/saved/update",
                web::post().to(Self::update_saved_network),
            )
            .route(
                "/wifi/saved/{index}/precheck",
                web::get().to(Self::load_and_connect_precheck),
            )
            .route(
                "/wifi/saved/{index}/connect",
                web::post().to(Self::load_and_connect),
            )
            .route(
                "/wifi/saved/{index}/forget",
                web::post().to(Self::forget_saved_network),
            )
            .route(
                "/wifi/saved/{index}/modify",
                web::post().to(Self::modify_saved_network),
            )
            .route("/wifi/disconnect", web::post().to(Self::disconnect))
            .route("/wifi/cancel", web::post().to(Self::cancel))
            .route("/wifi/close", web::post().to(Self::close));
    }
}

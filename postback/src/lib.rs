pub mod api;
pub mod config;
pub mod errors;
pub mod goal;
pub mod loader;
pub mod metrics_defs;
pub mod payload;
pub mod resolver;
pub mod schema;
pub mod service;
pub mod store;
pub mod translator;
pub mod writer;

#[cfg(test)]
mod testutils;

pub use errors::{PostbackError, PostbackServiceError};
pub use service::Postback;

use shared::admin_service::AdminService;
use shared::http::run_http_service;
use tokio::net::TcpListener;

pub async fn run(config: config::Config) -> Result<(), PostbackServiceError> {
    let store = store::get_store(config.store.r#type).await?;
    let postback = Postback::new(store);

    let ready_check = postback.clone();
    let admin_service: AdminService<_, PostbackServiceError> =
        AdminService::new(move || ready_check.is_ready());

    let api_task = serve_api(&config.listener, postback);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(api_task, admin_task)?;
    Ok(())
}

async fn serve_api(
    listener: &config::Listener,
    postback: Postback,
) -> Result<(), PostbackServiceError> {
    let app = api::router(postback);
    let tcp_listener = TcpListener::bind(format!("{}:{}", listener.host, listener.port)).await?;
    tracing::info!(host = %listener.host, port = listener.port, "postback api listening");

    axum::serve(tcp_listener, app).await?;
    Ok(())
}

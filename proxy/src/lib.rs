pub mod config;
pub mod errors;
mod forwarder;
pub mod headers;
pub mod metrics_defs;
pub mod plan;
mod proxy_service;
pub mod rewrite;
pub mod routes;
#[cfg(test)]
mod testutils;
pub mod upstreams;

pub use errors::ProxyError;
pub use forwarder::Forwarder;
pub use plan::{ForwardRequest, Gateway, Plan};
pub use proxy_service::{ProxyBody, ProxyService};

use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::time::Duration;
use upstreams::Upstreams;

/// Serves the gateway (and the admin listener, if configured) until a listener fails.
pub async fn run(config: config::Config) -> Result<(), ProxyError> {
    config.validate()?;

    let upstreams = Upstreams::try_new(&config.upstreams)?;
    tracing::info!(upstreams = ?upstreams, "Resolved upstreams");

    let forwarder = Forwarder::new(Duration::from_secs(config.upstream_timeout_secs));
    let service = ProxyService::new(Gateway::new(upstreams), forwarder);

    let proxy_task = run_http_service(&config.listener.host, config.listener.port, service);

    match &config.admin_listener {
        Some(admin) => {
            let admin_task = run_http_service(
                &admin.host,
                admin.port,
                AdminService::<_, ProxyError>::new(|| true),
            );
            tokio::try_join!(proxy_task, admin_task)?;
        }
        None => proxy_task.await?,
    }

    Ok(())
}

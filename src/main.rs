use marquee::api;
use marquee::logger::*;
use marquee::server::*;
use marquee::settings::*;
use std::fs;
use std::sync::Arc;
use tokio::signal;
use warp::Filter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap()?;

    let project_settings = parse_settings(cli.settings.as_deref())?;
    info!(?project_settings);
    logger.reload_from_config(&LogConfig::from(&project_settings.log))?;

    let address: std::net::SocketAddr = project_settings.http.address.parse()?;
    let server = Arc::new(Server::try_new(&project_settings).await?);

    let api_v1 = warp::path("api")
        .and(warp::path("v1"))
        .and(api::v1::routes(server.clone()))
        .recover(api::v1::recover_error);

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("could not listen for SIGINT: {}", e);
        }
    };

    match (&project_settings.http.cert_path, &project_settings.http.key_path) {
        (Some(cert_path), Some(key_path)) => {
            for path in [cert_path, key_path] {
                if !fs::metadata(path)?.is_file() {
                    return Err(anyhow::anyhow!("TLS file is not a regular file: {:?}", path));
                }
            }
            let (bound, serving) = warp::serve(api_v1)
                .tls()
                .cert_path(cert_path)
                .key_path(key_path)
                .bind_with_graceful_shutdown(address, shutdown);
            info!(%bound, "listening with TLS");
            serving.await;
        }
        (None, None) => {
            let (bound, serving) =
                warp::serve(api_v1).try_bind_with_graceful_shutdown(address, shutdown)?;
            info!(%bound, "listening");
            serving.await;
        }
        _ => {
            return Err(anyhow::anyhow!(
                "http.cert_path and http.key_path must be set together"
            ));
        }
    }

    let shutdown_timeout = std::time::Duration::from_secs(30);
    match tokio::time::timeout(shutdown_timeout, server.shutdown()).await {
        Ok(_) => info!("server shutdown successfully"),
        Err(_) => error!("server shutdown timed out"),
    }

    Ok(())
}

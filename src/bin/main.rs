use clap::Parser;
use dimquery::{http, CliArgs, ElasticsearchBackend, QueryTranslator, Settings};
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli_args = CliArgs::parse();
    let settings = Settings::from_cli(&cli_args)?;

    let backend = ElasticsearchBackend::from_settings(&settings.elasticsearch)?;
    let translator = QueryTranslator::new(Arc::new(backend), settings.elasticsearch.index.clone())?
        .with_options(settings.query.search_options())
        .with_timeout(Duration::from_secs(settings.elasticsearch.timeout_secs));

    let app = http::router(Arc::new(translator));

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        addr = %addr,
        elasticsearch = %settings.elasticsearch.url,
        index = %settings.elasticsearch.index,
        "Starting by-dimension query server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}

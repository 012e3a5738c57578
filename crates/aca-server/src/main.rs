//! Attribute Certificate Authority Server Binary
//!
//! Runs the ACA HTTP server for attribute refresh and attribute certificate
//! issuance.

use std::error::Error;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use aca_server::{
    create_router, AcaConfig, AppState, AttributeStore, CertificateAuthorityCore, IssuancePipeline, MemoryStore,
    RefreshPipeline,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AcaConfig::from_env()?;

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let authority = Arc::new(config.build_authority()?);
    let store = open_store(&config).await?;
    let refresh = RefreshPipeline::new(config.attribute_source(), store);

    let pipeline = IssuancePipeline::new(authority.clone(), refresh)
        .with_policy(config.match_policy)
        .with_validity(config.cert_validity);

    info!(
        kid = %authority.kid(),
        port = config.port,
        match_policy = ?config.match_policy,
        attributes = ?config.attributes_path,
        "Starting Attribute Certificate Authority"
    );

    let app = create_router(Arc::new(AppState::new(pipeline)));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(addr = %addr, "ACA listening");

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "postgres")]
async fn open_store(config: &AcaConfig) -> Result<Arc<dyn AttributeStore>, Box<dyn Error>> {
    match &config.database_url {
        Some(url) => Ok(Arc::new(aca_server::storage::PostgresStore::new(url).await?)),
        None => {
            warn!("ACA_DATABASE_URL not set, attributes are kept in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn open_store(config: &AcaConfig) -> Result<Arc<dyn AttributeStore>, Box<dyn Error>> {
    if config.database_url.is_some() {
        return Err("ACA_DATABASE_URL requires the postgres feature".into());
    }
    warn!("Built without the postgres feature, attributes are kept in memory");
    Ok(Arc::new(MemoryStore::new()))
}

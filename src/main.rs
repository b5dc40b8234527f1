use crop_diagnosis_service::{AppConfig, create_app};
use tokio::net::TcpListener;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let port = config.port;
    let app = create_app(config);
    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    let addr = listener.local_addr()?;

    info!("Crop Diagnosis Service starting on {}", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Diagnosis endpoint: POST http://{}/api/crop-analyze", addr);
    info!(
        "Report endpoint: POST http://{}/api/download-crop-report",
        addr
    );

    axum::serve(listener, app).await?;

    Ok(())
}

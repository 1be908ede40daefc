use retina_oct_grpc::config::ServerConfig;
use retina_oct_grpc::pipeline::InferencePipeline;
use retina_oct_grpc::service::{RetinaOctService, retina_oct_service};
use tonic::transport::Server;
use tracing::Level;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = ServerConfig::from_env()?;

    // The server is never started without a model.
    let pipeline = match InferencePipeline::load(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!(
                model_dir = %config.model_dir.display(),
                error = %e,
                "error loading model, refusing to start"
            );
            return Err(e.into());
        }
    };
    tracing::info!(version = pipeline.model_version(), "model ready");

    let detector_service = RetinaOctService::new(pipeline);

    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(retina_oct_service::FILE_DESCRIPTOR_SET)
        .build_v1()?;

    tracing::info!(addr = %config.listen_addr, "RetinaOctClassifier listening");

    Server::builder()
        .add_service(detector_service.into_server(config.max_image_bytes))
        .add_service(reflection_service)
        .serve_with_shutdown(config.listen_addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

use std::sync::Arc;

use log::{error, info};

use cvpress::raster::SkiaRasterizer;
use cvpress::server::{router, AppState};
use cvpress::{Pipeline, ServerConfig};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;

    let rasterizer = SkiaRasterizer::new(config.font_dir.as_deref());
    info!(
        "raster text {}",
        if rasterizer.has_text() { "enabled" } else { "disabled" }
    );
    match &config.render.asset_dir {
        Some(dir) => info!("local images served from {}", dir.display()),
        None => info!("local image paths disabled"),
    }

    let state = AppState {
        pipeline: Pipeline::new(Arc::new(rasterizer)),
        render: config.render.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!("PDF engine listening on http://{}", config.addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

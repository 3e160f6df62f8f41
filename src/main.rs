use anyhow::Result;
use dotenvy::dotenv;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info, warn};

use bus_tracking::config::{database::DatabaseConfig, EnvironmentConfig, StorageBackend, TrackingConfig};
use bus_tracking::database::DatabaseConnection;
use bus_tracking::repositories::InMemoryReferenceData;
use bus_tracking::{create_app_router, AppState, Backends, TrackingEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    let config = EnvironmentConfig::from_env()?;
    let tracking = TrackingConfig::from_env()?;

    // Configurar logging
    tracing_subscriber::fmt().with_max_level(config.tracing_level()).init();

    info!("🚌 Bus Tracking - Seguimiento en tiempo real");
    info!("============================================");

    let backends = match config.storage_backend {
        StorageBackend::Postgres => {
            let db_connection = match DatabaseConnection::new(&DatabaseConfig::from_env()?).await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("❌ Error conectando a la base de datos: {}", e);
                    return Err(anyhow::anyhow!("Error de base de datos: {}", e));
                }
            };
            db_connection.run_migrations().await?;
            Backends::postgres(db_connection.pool().clone())
        }
        StorageBackend::Memory => {
            if config.is_production() {
                warn!("⚠️ Almacenamiento en memoria en producción: los datos se pierden al reiniciar");
            }
            info!("🧪 Almacenamiento en memoria con datos de demostración");
            Backends::in_memory(InMemoryReferenceData::demo().await)
        }
    };

    let engine = TrackingEngine::new(backends, tracking)?;
    let app = create_app_router(AppState::new(config.clone(), engine));

    let addr: SocketAddr = config.server_url().parse()?;

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   GET  /health - Health check");
    info!("   GET  /metrics - Métricas Prometheus");
    info!("🧑‍✈️ Endpoints de conductor (Bearer JWT):");
    info!("   POST /api/trips - Iniciar viaje");
    info!("   GET  /api/trips/active - Viaje activo (reanudar)");
    info!("   POST /api/trips/:id/end - Finalizar viaje");
    info!("   POST /api/trips/:id/cancel - Cancelar viaje");
    info!("   POST /api/trips/:id/locations - Enviar posición");
    info!("🧍 Endpoints de pasajero:");
    info!("   GET  /api/trips/:id/locations/latest - Última posición");
    info!("   GET  /api/trips/:id/locations - Historial de posiciones");
    info!("   GET  /api/routes - Rutas activas");
    info!("   GET  /api/routes/:id/stops - Paradas de la ruta");
    info!("   GET  /api/routes/:id/active-buses - Buses activos");
    info!("   GET  /api/routes/:id/live - Stream SSE de la ruta");
    info!("   GET  /api/live - Stream SSE de todas las rutas");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Error del servidor: {}", e);
        return Err(e.into());
    }

    info!("👋 Servidor terminado");
    Ok(())
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ No se pudo instalar el handler de Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("❌ No se pudo instalar el handler de SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}

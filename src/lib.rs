pub mod api;
pub mod core;
pub mod storage;
pub mod utils;

use actix_cors::Cors;
use actix_web::{dev::ServerHandle, web, App, HttpServer};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    api::{handlers, UploadArea},
    core::{
        document::LocalDocumentStorage,
        ocr::{build_extractor, OcrExtractor},
        services::{ExpirySweeper, HealthService, VerificationService},
    },
    storage::EncryptedStore,
    utils::{
        config::Config,
        error::{NodeError, Result},
        metrics::Metrics,
    },
};

pub struct Application {
    config: Arc<Config>,
    store: Arc<EncryptedStore>,
    extractor: Arc<dyn OcrExtractor>,
    verification_service: Arc<VerificationService>,
    sweeper: Arc<ExpirySweeper>,
    health_service: Arc<HealthService>,
    uploads: UploadArea,
    shutdown_tx: watch::Sender<bool>,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    server_handle: Mutex<Option<ServerHandle>>,
}

impl Application {
    pub async fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let upload_root = Path::new(&config.node.data_dir).join("uploads");
        std::fs::create_dir_all(&upload_root)
            .map_err(|e| NodeError::Init(format!("Failed to create upload directory: {}", e)))?;

        info!("Initializing storage...");
        let store = Arc::new(EncryptedStore::open(&config.storage)?);

        info!("Initializing OCR provider {:?}...", config.ocr.provider);
        let extractor = build_extractor(&config.ocr);

        info!("Initializing services...");
        let metrics = Arc::new(Metrics::new());
        let verification_service = Arc::new(VerificationService::new(
            &config,
            store.clone(),
            extractor.clone(),
            Arc::new(LocalDocumentStorage),
            metrics.clone(),
        ));
        let sweeper = Arc::new(ExpirySweeper::new(
            store.clone(),
            config.decision.reverification_warning_days,
            metrics.clone(),
        ));
        let health_service = Arc::new(HealthService::new(
            store.clone(),
            extractor.clone(),
            metrics,
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            extractor,
            verification_service,
            sweeper,
            health_service,
            uploads: UploadArea::new(upload_root),
            shutdown_tx,
            sweeper_handle: Mutex::new(None),
            server_handle: Mutex::new(None),
        })
    }

    pub async fn start(&self) -> Result<()> {
        let recovered = self.verification_service.recover_interrupted().await?;
        if recovered > 0 {
            warn!("Recovered {} requests interrupted by a previous shutdown", recovered);
        }

        if self.config.sweeper.enabled {
            info!(
                "Starting expiry sweeper (every {:?})...",
                self.config.get_sweep_interval()
            );
            let handle = self
                .sweeper
                .clone()
                .spawn(self.config.get_sweep_interval(), self.shutdown_tx.subscribe());
            *self.sweeper_handle.lock().await = Some(handle);
        }

        info!("Starting API server...");
        self.start_api_server().await?;

        info!("Application successfully started");
        Ok(())
    }

    async fn start_api_server(&self) -> Result<()> {
        let verification_service = self.verification_service.clone();
        let sweeper = self.sweeper.clone();
        let health_service = self.health_service.clone();
        let uploads = self.uploads.clone();

        let server = HttpServer::new(move || {
            App::new()
                .wrap(Cors::default().allow_any_origin().allow_any_method().allow_any_header())
                .app_data(web::Data::new(verification_service.clone()))
                .app_data(web::Data::new(sweeper.clone()))
                .app_data(web::Data::new(health_service.clone()))
                .app_data(web::Data::new(uploads.clone()))
                .route("/health", web::get().to(handlers::health::health))
                .service(handlers::verification::scope())
        })
        .bind((self.config.node.host.as_str(), self.config.node.port))
        .map_err(|e| NodeError::Init(format!("Failed to bind API server: {}", e)))?
        .run();

        *self.server_handle.lock().await = Some(server.handle());
        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("API server stopped with error: {}", e);
            }
        });

        info!(
            "API server listening on {}:{}",
            self.config.node.host, self.config.node.port
        );
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down application...");

        if let Some(server) = self.server_handle.lock().await.take() {
            info!("Stopping API server...");
            server.stop(true).await;
        }

        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.sweeper_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Expiry sweeper task failed: {}", e);
            }
        }

        info!("Releasing OCR provider...");
        self.extractor.release().await;

        info!("Flushing storage...");
        self.store.flush()?;

        info!("Application shutdown complete");
        Ok(())
    }
}

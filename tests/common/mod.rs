// tests/common/mod.rs
#![allow(dead_code)]

use credential_engine::{
    core::{
        document::{DocumentHandle, LocalDocumentStorage},
        identity::Claims,
        ocr::{DigiLockerExtractor, ManagedExtractor, OcrExtractor, PlainTextBackend},
        services::{ExpirySweeper, RequestStatus, VerificationService},
        verification::SubjectId,
    },
    storage::EncryptedStore,
    utils::{config::Config, metrics::Metrics},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const ASHA_CERTIFICATE: &str = "INDIAN INSTITUTE OF TECHNOLOGY DELHI\n\
    Degree Certificate\n\
    Name: Asha Rao\n\
    Institution: IIT Delhi\n\
    Program: B.Tech CSE\n\
    Batch: 2018 - 2022\n";

pub const ASHA_BOMBAY_CERTIFICATE: &str = "Degree Certificate\n\
    Name: Asha Rao\n\
    Institution: IIT Bombay\n\
    Program: B.Tech CSE\n\
    Batch: 2018 - 2022\n";

pub const UNRELATED_CERTIFICATE: &str = "Degree Certificate\n\
    Name: Vikram Sethi\n\
    Institution: Anna University\n\
    Program: Master of Arts\n\
    Batch: 2001 - 2003\n";

pub struct TestContext {
    _dir: TempDir,
    pub uploads: PathBuf,
    pub config: Config,
    pub store: Arc<EncryptedStore>,
    pub service: Arc<VerificationService>,
    pub sweeper: Arc<ExpirySweeper>,
    pub metrics: Arc<Metrics>,
}

impl TestContext {
    /// Context backed by the plain-text provider.
    pub fn new() -> Self {
        Self::with_extractor(
            Config::default(),
            Arc::new(ManagedExtractor::new(
                PlainTextBackend,
                1,
                Duration::from_secs(5),
            )),
        )
    }

    /// Context whose OCR capability is always unavailable.
    pub fn unavailable_ocr() -> Self {
        Self::with_extractor(Config::default(), Arc::new(DigiLockerExtractor))
    }

    pub fn with_extractor(mut config: Config, extractor: Arc<dyn OcrExtractor>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        config.storage.path = dir.path().join("db").to_string_lossy().into_owned();
        config.storage.encryption_key = "integration-secret".into();

        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).expect("upload dir");

        let store = Arc::new(EncryptedStore::open(&config.storage).expect("open store"));
        let metrics = Arc::new(Metrics::new());
        let service = Arc::new(VerificationService::new(
            &config,
            store.clone(),
            extractor,
            Arc::new(LocalDocumentStorage),
            metrics.clone(),
        ));
        let sweeper = Arc::new(ExpirySweeper::new(
            store.clone(),
            config.decision.reverification_warning_days,
            metrics.clone(),
        ));

        Self {
            _dir: dir,
            uploads,
            config,
            store,
            service,
            sweeper,
            metrics,
        }
    }

    /// Writes a text document into the upload area, as the upload layer would.
    pub fn upload(&self, name: &str, text: &str) -> DocumentHandle {
        let path = self.uploads.join(name);
        std::fs::write(&path, text).expect("write document");
        DocumentHandle::new(path, "text/plain", text.len() as u64)
    }

    pub async fn wait_terminal(&self, subject: &SubjectId) -> RequestStatus {
        for _ in 0..500 {
            let status = self.service.get_status(subject).expect("status");
            if status.status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("request for {} did not finish", subject);
    }
}

pub fn asha_claims() -> Claims {
    Claims {
        full_name: "Asha Rao".into(),
        institution: "IIT Delhi".into(),
        program: "B.Tech CSE".into(),
        start_year: 2018,
        end_year: 2022,
    }
}

//! Test harness for isolated orchestrator runs.
//!
//! Each harness owns a temporary directory holding the SQLite database, so
//! a harness can be "restarted" onto the same durable state.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use chemfuse::align::EntityAligner;
use chemfuse::broadcast::JobSnapshot;
use chemfuse::collaborators::{
    CollaboratorError, Collaborators, DocumentParser, FixtureBundle, FixtureCollaborators,
    ParsedDocument,
};
use chemfuse::config::Config;
use chemfuse::store::IntegrationStore;
use chemfuse::worker::{JobKey, JobOrchestrator};

use super::builders::ConfigBuilder;

const WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Isolated orchestrator over fixture collaborators and an on-disk database.
pub struct TestHarness {
    temp_dir: TempDir,
    config: Config,
    pub fixtures: Arc<FixtureCollaborators>,
    pub orchestrator: JobOrchestrator,
}

impl TestHarness {
    /// Create a harness with default settings (review disabled).
    pub fn new() -> Self {
        Self::with_config(ConfigBuilder::new())
    }

    pub fn with_config(builder: ConfigBuilder) -> Self {
        Self::with_collaborators(builder, |c| c)
    }

    /// Create a harness whose collaborators are the fixtures, adjusted by `f`.
    pub fn with_collaborators(
        builder: ConfigBuilder,
        f: impl FnOnce(Collaborators) -> Collaborators,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("data").join("chemfuse.db");
        let config = builder
            .database_path(db_path.to_str().expect("Temp path is not UTF-8"))
            .build();
        let fixtures = Arc::new(FixtureCollaborators::new());
        let orchestrator =
            JobOrchestrator::from_config(&config, f(Collaborators::from_fixtures(fixtures.clone())))
                .expect("Failed to build orchestrator");

        Self {
            temp_dir,
            config,
            fixtures,
            orchestrator,
        }
    }

    /// Simulate a process restart: a fresh orchestrator and job store over
    /// the same database.
    pub fn restart(self) -> Self {
        let Self {
            temp_dir,
            config,
            fixtures,
            orchestrator,
        } = self;
        drop(orchestrator);
        let orchestrator =
            JobOrchestrator::from_config(&config, Collaborators::from_fixtures(fixtures.clone()))
                .expect("Failed to rebuild orchestrator");
        Self {
            temp_dir,
            config,
            fixtures,
            orchestrator,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.temp_dir.path().join("data").join("chemfuse.db")
    }

    /// Register a bundle under a source ref.
    pub fn add_bundle(&self, source_ref: &str, bundle: FixtureBundle) {
        self.fixtures.insert(source_ref, bundle);
    }

    pub fn store(&self) -> &IntegrationStore {
        self.orchestrator.store()
    }

    pub fn aligner(&self) -> &Arc<EntityAligner> {
        self.orchestrator.pipeline().aligner()
    }

    pub fn submit(&self, document_id: &str, source_ref: &str) -> JobKey {
        self.orchestrator
            .submit(document_id, source_ref)
            .expect("Failed to submit document")
    }

    pub fn wait(&self, key: &JobKey) -> JobSnapshot {
        self.orchestrator
            .wait(key, WAIT_TIMEOUT, self.orchestrator.expired_poll_tolerance())
            .expect("Job did not finish")
    }

    /// Submit a document and block until its job is terminal.
    pub fn submit_and_wait(&self, document_id: &str, source_ref: &str) -> JobSnapshot {
        let key = self.submit(document_id, source_ref);
        self.wait(&key)
    }
}

/// Parser that signals when it is entered and blocks until released.
pub struct GatedParser {
    inner: Arc<dyn DocumentParser>,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl GatedParser {
    /// Returns the parser, a receiver signalled on entry and a sender that
    /// releases one parse call.
    pub fn new(inner: Arc<dyn DocumentParser>) -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let parser = Arc::new(Self {
            inner,
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        (parser, entered_rx, release_tx)
    }
}

impl DocumentParser for GatedParser {
    fn parse(&self, source_ref: &str) -> Result<ParsedDocument, CollaboratorError> {
        let _ = self.entered.lock().unwrap().send(());
        self.release
            .lock()
            .unwrap()
            .recv_timeout(WAIT_TIMEOUT)
            .map_err(|_| CollaboratorError::Timeout {
                operation: "parse".to_string(),
                seconds: WAIT_TIMEOUT.as_secs(),
            })?;
        self.inner.parse(source_ref)
    }
}

use std::sync::Arc;

use ava_core::{AdmissionController, Orchestrator, Resolver};

#[derive(Clone)]
pub(crate) struct AppState {
    admission: Arc<AdmissionController>,
    orchestrator: Arc<Orchestrator>,
    resolver: Arc<Resolver>,
}

impl AppState {
    pub fn new(
        admission: Arc<AdmissionController>,
        orchestrator: Arc<Orchestrator>,
        resolver: Arc<Resolver>,
    ) -> Self {
        Self {
            admission,
            orchestrator,
            resolver,
        }
    }

    pub fn admission(&self) -> Arc<AdmissionController> {
        self.admission.clone()
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.orchestrator.clone()
    }

    pub fn resolver(&self) -> Arc<Resolver> {
        self.resolver.clone()
    }
}

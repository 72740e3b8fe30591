use std::sync::Arc;

use compliance_watch_core::{
    AuditHandle, Config, RunDispatcher, RunStore, SanitizedConfig, SourceStore, TicketStore,
};

/// Shared application state
pub struct AppState {
    config: Config,
    audit: AuditHandle,
    sources: Arc<dyn SourceStore>,
    runs: Arc<dyn RunStore>,
    tickets: Arc<dyn TicketStore>,
    dispatcher: RunDispatcher,
}

impl AppState {
    pub fn new(
        config: Config,
        audit: AuditHandle,
        sources: Arc<dyn SourceStore>,
        runs: Arc<dyn RunStore>,
        tickets: Arc<dyn TicketStore>,
        dispatcher: RunDispatcher,
    ) -> Self {
        Self {
            config,
            audit,
            sources,
            runs,
            tickets,
            dispatcher,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn audit(&self) -> &AuditHandle {
        &self.audit
    }

    pub fn sources(&self) -> &dyn SourceStore {
        self.sources.as_ref()
    }

    pub fn runs(&self) -> &dyn RunStore {
        self.runs.as_ref()
    }

    pub fn tickets(&self) -> &dyn TicketStore {
        self.tickets.as_ref()
    }

    pub fn dispatcher(&self) -> &RunDispatcher {
        &self.dispatcher
    }
}

//! Human intervention requests
//!
//! A request is raised when a run reaches a human node. Requests are listed
//! for responders in priority order, answered at most once, and expire when
//! nobody answers in time. Answering does not by itself restart the run; call
//! [`InterventionManager::resume_workflow_execution`] (or
//! `WorkflowService::respond_and_resume`) for that.

use crate::controller::ExecutionController;
use crate::error::EngineResult;
use crate::events::{EventLogger, ExecutionEvent};
use crate::models::{self, InterventionDetail, InterventionRequest, NewInterventionRequest};
use crate::store::CheckpointStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Creates, lists and resolves intervention requests
#[derive(Clone)]
pub struct InterventionManager {
    store: Arc<dyn CheckpointStore>,
    events: EventLogger,
}

impl std::fmt::Debug for InterventionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterventionManager").finish_non_exhaustive()
    }
}

impl InterventionManager {
    pub fn new(store: Arc<dyn CheckpointStore>, events: EventLogger) -> Self {
        Self { store, events }
    }

    /// Open a request for a node execution and move the node to
    /// `WAITING_FOR_HUMAN`
    ///
    /// Fails with `NotFound` when the node execution does not exist.
    pub async fn create_intervention_request(
        &self,
        request: NewInterventionRequest,
    ) -> EngineResult<InterventionRequest> {
        let created = self.store.create_intervention(request).await?;
        info!(
            request_id = %created.id,
            node_execution_id = %created.node_execution_id,
            priority = created.priority,
            expires_at = %created.expires_at,
            "Intervention request created"
        );
        self.events.log(ExecutionEvent::intervention_requested(
            &created.id,
            &created.node_execution_id,
            created.priority,
        ));
        Ok(created)
    }

    /// Open, unexpired requests: highest priority first, then oldest first
    pub async fn get_pending_interventions(&self) -> EngineResult<Vec<InterventionDetail>> {
        self.store.pending_interventions().await
    }

    /// A request with its run and node; a past-due `PENDING` request is
    /// reported as `EXPIRED`
    pub async fn get_intervention_request(&self, request_id: &str) -> EngineResult<Option<InterventionDetail>> {
        let detail = self.store.get_intervention(request_id).await?;
        Ok(detail.map(|mut detail| {
            detail.request.status = detail.request.status_at(models::now());
            detail
        }))
    }

    /// Record a response; false when the request is missing, answered or
    /// expired
    pub async fn submit_response(
        &self,
        request_id: &str,
        user_id: &str,
        response_data: Value,
        notes: Option<String>,
    ) -> EngineResult<bool> {
        match self
            .store
            .submit_response(request_id, user_id, response_data, notes)
            .await?
        {
            Some(response) => {
                info!(request_id = %request_id, user_id = %user_id, response_id = %response.id, "Intervention answered");
                self.events.log(ExecutionEvent::intervention_answered(request_id, user_id));
                Ok(true)
            }
            None => {
                debug!(request_id = %request_id, "No open request to answer");
                Ok(false)
            }
        }
    }

    /// Resume the run that owns a request
    pub async fn resume_workflow_execution(
        &self,
        request_id: &str,
        controller: &ExecutionController,
    ) -> EngineResult<bool> {
        let Some(detail) = self.store.get_intervention(request_id).await? else {
            debug!(request_id = %request_id, "Unknown intervention request");
            return Ok(false);
        };
        controller
            .resume(
                &detail.workflow_execution_id,
                &detail.request.node_execution_id,
                Some(request_id),
            )
            .await
    }

    /// Flip past-due open requests to `EXPIRED`
    pub async fn expire_overdue(&self) -> EngineResult<u64> {
        let expired = self.store.expire_overdue().await?;
        if expired > 0 {
            info!(count = expired, "Expired overdue intervention requests");
        }
        Ok(expired)
    }
}

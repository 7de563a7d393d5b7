//! Escalation thread operations.

use tracing::{info, warn};

use super::Coordinator;
use crate::audit::{ActivityEvent, ActivityKind};
use crate::error::CoordinationResult;
use crate::escalation::{EscalationRequest, EscalationResponse, EscalationThread, ThreadStatus};

impl Coordinator {
    /// Route `request` and persist a new open thread.
    pub fn open_escalation(&self, request: EscalationRequest) -> CoordinationResult<EscalationThread> {
        let route = self.router.route(&request);
        if let Some(reason) = route.fallback_reason() {
            warn!(kind = %request.kind, from = %request.from, reason, "Escalation routed by fallback");
        }
        let eligible = self.team.roles_for_escalation(&request.kind);
        let thread = EscalationThread::new(request, route, eligible);
        self.insert(&thread.id, &thread)?;

        info!(
            thread = %thread.id,
            kind = %thread.request.kind,
            assigned_to = %thread.assigned_to,
            "Escalation opened"
        );
        self.activity(
            ActivityEvent::new(
                ActivityKind::EscalationOpened,
                &thread.id,
                format!(
                    "{} → {}: {}",
                    thread.request.kind, thread.assigned_to, thread.request.message
                ),
            )
            .by(thread.request.from.clone()),
        );
        Ok(thread)
    }

    pub fn get_thread(&self, thread_id: &str) -> CoordinationResult<EscalationThread> {
        self.get(thread_id)
    }

    /// Append a response; the thread may resolve, reroute or go to the user.
    pub fn respond(
        &self,
        thread_id: &str,
        response: EscalationResponse,
    ) -> CoordinationResult<EscalationThread> {
        let threshold = self.router.user_threshold();
        let from = response.from.clone();
        let (thread, status) = self.update(thread_id, |thread: &mut EscalationThread| {
            thread.add_response(response, threshold)
        })?;

        match status {
            ThreadStatus::EscalatedToUser => warn!(
                thread = thread_id,
                attempts = thread.unresolved_attempts(),
                "Escalation handed to user"
            ),
            _ => info!(thread = thread_id, status = %status, assigned_to = %thread.assigned_to, "Escalation response"),
        }
        self.activity(
            ActivityEvent::new(
                ActivityKind::EscalationResponded,
                thread_id,
                format!("{} (now {})", status, thread.assigned_to),
            )
            .by(from),
        );
        Ok(thread)
    }

    pub fn should_escalate_to_user(&self, thread_id: &str) -> CoordinationResult<bool> {
        let thread = self.get_thread(thread_id)?;
        Ok(self.router.should_escalate_to_user(&thread))
    }

    /// User-facing text projection of a thread.
    pub fn format_for_user(&self, thread_id: &str) -> CoordinationResult<String> {
        let thread = self.get_thread(thread_id)?;
        Ok(self.router.format_for_user(&thread))
    }
}

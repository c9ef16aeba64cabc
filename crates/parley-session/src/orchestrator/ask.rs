//! `ask()` and the single request/response exchange it is built on.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_common::RequestId;

use crate::connection::ConnectError;
use crate::correlator::{self, FragmentSink, ResponseFailure};
use crate::credential::Credential;
use crate::followup::FollowUp;
use crate::history::HistoryWindowBuilder;

use super::types::{AskOutcome, AskReport, AskRequest, BusyGuard, SessionError, SessionPhase};
use super::SessionOrchestrator;

impl SessionOrchestrator {
    /// Send one question and wait for its streamed answer.
    ///
    /// Fragments reach `on_fragment` as they arrive. Returns
    /// `Err(SessionError::Busy)` while another ask is in flight.
    pub async fn ask(
        &self,
        request: AskRequest,
        cancel: &CancellationToken,
        on_fragment: FragmentSink,
    ) -> Result<AskReport, SessionError> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let credential = self.credentials.access_token().await?;
        let request_id = RequestId::new();

        self.set_phase(SessionPhase::BuildingContext);
        let context = HistoryWindowBuilder::new(self.settings.budget).build(
            &request.history,
            &request.question,
            &request.preamble,
        );
        info!(
            request_id = %request_id,
            turns = request.history.len(),
            bytes = context.len(),
            "Asking"
        );

        let outcome = self
            .exchange(
                &credential,
                &request_id,
                &context,
                cancel,
                on_fragment,
                self.settings.request_timeout,
            )
            .await;

        if let AskOutcome::Answer(answer) = &outcome {
            let mut last = self.last();
            last.prompt = Some(request.question);
            last.response = Some(answer.clone());
        }

        self.set_phase(SessionPhase::Resolved);
        info!(request_id = %request_id, outcome = outcome.kind(), "Ask resolved");
        Ok(AskReport {
            request_id,
            outcome,
        })
    }

    /// Run the configured probes against the last answered ask.
    ///
    /// Called after the answer has been shown; takes the same busy guard as
    /// `ask()`. Probe failures yield no follow-up and never an error.
    pub async fn follow_ups(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<FollowUp>, SessionError> {
        if self.settings.probes.is_empty() {
            return Ok(Vec::new());
        }
        let _guard = BusyGuard::acquire(&self.busy)?;
        let (Some(prompt), Some(answer)) = (self.last_prompt(), self.last_response()) else {
            return Ok(Vec::new());
        };
        let credential = self.credentials.access_token().await?;

        let follow_ups = self.run_probes(&credential, &prompt, &answer, cancel).await;
        self.set_phase(SessionPhase::Resolved);
        Ok(follow_ups)
    }

    /// Connect, emit, and wait for the terminal payload, the deadline, or
    /// cancellation. The response listener is always removed on return.
    async fn exchange(
        &self,
        credential: &Credential,
        id: &RequestId,
        question: &str,
        cancel: &CancellationToken,
        on_fragment: FragmentSink,
        timeout: Duration,
    ) -> AskOutcome {
        self.set_phase(SessionPhase::AwaitingConnection);
        let ready = match self
            .connection
            .ensure_ready(credential, self.settings.connect_timeout, cancel)
            .await
        {
            Ok(ready) => ready,
            Err(ConnectError::Cancelled) => return AskOutcome::Cancelled,
            Err(e) => {
                warn!(request_id = %id, error = %e, "Channel unavailable");
                return AskOutcome::ConnectionFailed;
            }
        };

        self.set_phase(SessionPhase::AwaitingResponse);
        let mut subscription = match correlator::send(&ready.channel, id, question, on_fragment) {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(request_id = %id, error = %e, "Request not sent");
                self.connection.disconnect();
                return AskOutcome::ConnectionFailed;
            }
        };

        let deadline = Instant::now() + timeout;
        loop {
            if subscription.is_terminal() {
                break;
            }
            if cancel.is_cancelled() {
                subscription.unsubscribe();
                // No cancel message exists; a late answer must not reach the next ask.
                self.connection.disconnect();
                info!(request_id = %id, "Ask cancelled, channel torn down");
                return AskOutcome::Cancelled;
            }
            if !self.connection.is_current(ready.generation) {
                subscription.unsubscribe();
                warn!(request_id = %id, "Channel lost while awaiting response");
                return AskOutcome::ConnectionFailed;
            }
            if Instant::now() >= deadline {
                subscription.unsubscribe();
                self.connection.disconnect();
                warn!(request_id = %id, ?timeout, "No terminal response before deadline");
                return AskOutcome::TimedOut;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = cancel.cancelled() => {}
            }
        }

        subscription.unsubscribe();
        let pending = subscription.snapshot();
        match pending.failure() {
            None => AskOutcome::Answer(pending.accumulated().to_string()),
            Some(ResponseFailure::Server(detail)) => AskOutcome::ServerError(detail.clone()),
            Some(ResponseFailure::Parse(detail)) => AskOutcome::ParseError(detail.clone()),
        }
    }

    /// Ask each configured probe in turn. Failures and non-yes answers
    /// yield nothing.
    async fn run_probes(
        &self,
        credential: &Credential,
        prompt: &str,
        answer: &str,
        cancel: &CancellationToken,
    ) -> Vec<FollowUp> {
        let mut follow_ups = Vec::new();
        let builder = HistoryWindowBuilder::new(self.settings.budget);
        let silent: FragmentSink = Arc::new(|_| {});

        for probe in &self.settings.probes {
            if cancel.is_cancelled() {
                debug!("Skipping remaining probes after cancellation");
                break;
            }

            let id = RequestId::new();
            let question = builder.build(&[], &probe.question(prompt, answer), "");
            let outcome = self
                .exchange(
                    credential,
                    &id,
                    &question,
                    cancel,
                    Arc::clone(&silent),
                    self.settings.probe_timeout,
                )
                .await;

            match outcome {
                AskOutcome::Answer(text) => match probe.interpret(&text) {
                    Some(follow_up) => {
                        debug!(request_id = %id, ?follow_up, "Probe matched");
                        follow_ups.push(follow_up);
                    }
                    None => debug!(request_id = %id, ?probe, "Probe declined"),
                },
                other => debug!(request_id = %id, ?probe, outcome = other.kind(), "Probe failed"),
            }
        }
        follow_ups
    }
}

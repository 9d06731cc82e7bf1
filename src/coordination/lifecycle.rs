use statig::prelude::*;

/// Events driving one request through its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestEvent {
    BeginScheduling,
    VerdictsCollected { verdicts: usize, failures: usize },
    AutoResolved,
    Escalate { conflicts: usize },
    Committed { new_version: u64 },
    Fail { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestPhase {
    #[default]
    Received,
    Scheduling,
    Resolving,
    Committing,
    Completed,
    Escalated,
    Failed,
}

impl RequestPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestPhase::Completed | RequestPhase::Escalated | RequestPhase::Failed
        )
    }
}

/// Per-request state machine:
/// Received -> Scheduling -> Resolving -> Committing -> terminal.
/// Terminal states ignore all further events, so exactly one terminal
/// phase is ever reached per request.
#[derive(Default)]
pub struct RequestLifecycle {
    pub request_id: String,
    phase: RequestPhase,
}

impl RequestLifecycle {
    pub fn new(request_id: String) -> Self {
        Self {
            request_id,
            phase: RequestPhase::Received,
        }
    }

    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

#[state_machine(initial = "State::received()")]
impl RequestLifecycle {
    #[state]
    fn received(&mut self, event: &RequestEvent) -> Outcome<State> {
        match event {
            RequestEvent::BeginScheduling => {
                self.phase = RequestPhase::Scheduling;
                tracing::info!(request_id = %self.request_id, "Request scheduling started");
                Transition(State::scheduling())
            }
            RequestEvent::Fail { reason } => self.fail(reason),
            _ => Handled,
        }
    }

    #[state]
    fn scheduling(&mut self, event: &RequestEvent) -> Outcome<State> {
        match event {
            RequestEvent::VerdictsCollected { verdicts, failures } => {
                self.phase = RequestPhase::Resolving;
                tracing::info!(
                    request_id = %self.request_id,
                    verdicts = verdicts,
                    failures = failures,
                    "Verdicts collected, resolving"
                );
                Transition(State::resolving())
            }
            RequestEvent::Fail { reason } => self.fail(reason),
            _ => Handled,
        }
    }

    #[state]
    fn resolving(&mut self, event: &RequestEvent) -> Outcome<State> {
        match event {
            RequestEvent::AutoResolved => {
                self.phase = RequestPhase::Committing;
                tracing::info!(request_id = %self.request_id, "Verdict set auto-resolved");
                Transition(State::committing())
            }
            RequestEvent::Escalate { conflicts } => {
                self.phase = RequestPhase::Escalated;
                tracing::info!(
                    request_id = %self.request_id,
                    conflicts = conflicts,
                    "Request escalated"
                );
                Transition(State::escalated())
            }
            RequestEvent::Fail { reason } => self.fail(reason),
            _ => Handled,
        }
    }

    #[state]
    fn committing(&mut self, event: &RequestEvent) -> Outcome<State> {
        match event {
            RequestEvent::Committed { new_version } => {
                self.phase = RequestPhase::Completed;
                tracing::info!(
                    request_id = %self.request_id,
                    new_version = new_version,
                    "Request completed"
                );
                Transition(State::completed())
            }
            RequestEvent::Fail { reason } => self.fail(reason),
            _ => Handled,
        }
    }

    #[state]
    fn completed(&mut self, event: &RequestEvent) -> Outcome<State> {
        match event {
            _ => Handled,
        }
    }

    #[state]
    fn escalated(&mut self, event: &RequestEvent) -> Outcome<State> {
        match event {
            _ => Handled,
        }
    }

    #[state]
    fn failed(&mut self, event: &RequestEvent) -> Outcome<State> {
        match event {
            _ => Handled,
        }
    }
}

impl RequestLifecycle {
    fn fail(&mut self, reason: &str) -> Outcome<State> {
        self.phase = RequestPhase::Failed;
        tracing::warn!(request_id = %self.request_id, reason = %reason, "Request failed");
        Transition(State::failed())
    }
}

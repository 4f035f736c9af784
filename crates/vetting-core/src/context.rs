//! State owned by a single pipeline run.

use uuid::Uuid;

use crate::action::ActionLog;
use crate::domain::SpeakerProfile;

/// Run-scoped context handed mutably to each stage in turn.
///
/// A fresh context is created per run and never shared, so concurrent runs
/// cannot observe each other's actions or intermediate results.
#[derive(Debug)]
pub struct RunContext {
    run_id: Uuid,
    profile: SpeakerProfile,
    actions: ActionLog,
}

impl RunContext {
    pub fn new(profile: SpeakerProfile) -> Self {
        let run_id = Uuid::new_v4();
        Self {
            run_id,
            profile,
            actions: ActionLog::new(run_id),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The immutable pipeline input.
    pub fn profile(&self) -> &SpeakerProfile {
        &self.profile
    }

    pub fn actions(&self) -> &ActionLog {
        &self.actions
    }

    pub fn actions_mut(&mut self) -> &mut ActionLog {
        &mut self.actions
    }

    pub fn into_actions(self) -> ActionLog {
        self.actions
    }
}

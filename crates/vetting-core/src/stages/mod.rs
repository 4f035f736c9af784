//! The three built-in stages.
//!
//! | Stage        | Accepts          | Produces          | Tools                                   |
//! |--------------|------------------|-------------------|-----------------------------------------|
//! | `Researcher` | `Profile`        | `Brief`           | `web_search`                            |
//! | `Evaluator`  | `Brief`          | `ScoreCard`       | none                                    |
//! | `Messenger`  | `ScoreCard`      | `DeliveryAttempt` | `find_user_by_name`, `send_message`     |

mod evaluator;
mod messenger;
mod researcher;

pub use evaluator::Evaluator;
pub use messenger::{render_report, Messenger};
pub use researcher::Researcher;

use crate::agent::AgentTask;
use crate::config::{interpolate, TaskConfig};
use crate::domain::PipelineError;
use crate::stage::{PayloadKind, StageKind, StagePayload};

fn unexpected_payload(stage: StageKind, expected: PayloadKind, got: &StagePayload) -> PipelineError {
    PipelineError::InvalidPipeline(format!(
        "stage {stage} expects {expected:?} input, got {:?}",
        got.kind()
    ))
}

fn render_task(task: &TaskConfig, vars: &[(&str, String)]) -> AgentTask {
    AgentTask::new(
        interpolate(&task.description, vars),
        interpolate(&task.expected_output, vars),
    )
}

use serde::Serialize;

use crate::{event::AttackResult, session::AttackSession};

/// The summary of a finished attack, as handed to report renderers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttackReport {
    pub session_id: String,
    /// `dictionary` or `bruteforce`.
    pub attack_type: String,
    /// The lowercase algorithm name, such as `sha256`.
    pub algorithm: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub attempts: u64,
    /// In seconds.
    pub duration: f64,
}

impl AttackReport {
    pub fn new(session: &AttackSession, result: &AttackResult) -> Self {
        Self {
            session_id: session.id().to_owned(),
            attack_type: session.mode().to_string(),
            algorithm: session.algorithm().name().to_ascii_lowercase(),
            success: result.found,
            password: result.password.clone(),
            attempts: result.attempts_total,
            duration: result.duration.as_secs_f64(),
        }
    }

    /// Renders the report as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

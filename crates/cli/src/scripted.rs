//! A scripted oracle for offline runs.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use ironloop_core::error::OracleError;
use ironloop_core::Oracle;

/// Replays a fixed list of canned responses, one per consultation.
///
/// Lets a run be driven end to end without any model behind it, which is
/// what the `run --script` command and the integration tests use.
pub struct ScriptedOracle {
    responses: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }

    /// Parse a JSON array of response strings.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let responses: Vec<String> = serde_json::from_str(content)?;
        Ok(Self::new(responses))
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(
        &self,
        _goal: &str,
        _history_summary: &str,
        _catalog: &BTreeMap<String, String>,
    ) -> Result<String, OracleError> {
        let mut responses = self.responses.lock().map_err(|_| {
            OracleError::Unavailable("scripted oracle lock poisoned".to_string())
        })?;
        if responses.is_empty() {
            return Err(OracleError::Unavailable("script exhausted".to_string()));
        }
        Ok(responses.remove(0))
    }
}

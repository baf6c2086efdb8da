use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Line-tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackConfig {
    /// Quiescence window between the last edit and the write-back of a
    /// breakpoint's re-anchored line, in milliseconds. Rapid typing restarts
    /// the window, so the breakpoint model sees at most one update per pause.
    pub relocation_delay_ms: u64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            relocation_delay_ms: 200,
        }
    }
}

impl TrackConfig {
    pub fn relocation_delay(&self) -> Duration {
        Duration::from_millis(self.relocation_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_keys() {
        let config: TrackConfig = serde_json::from_str(r#"{"relocationDelayMs": 50}"#).unwrap();
        assert_eq!(config.relocation_delay(), Duration::from_millis(50));
    }
}

//! Configuration for the control surface's HTTP listener and admission
//! control.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Admission control: `Submit` is rejected with 503 once `QUEUED`
    /// depth reaches this mark.
    #[serde(default = "default_high_watermark_queue")]
    pub high_watermark_queue: usize,
}

fn default_listen_address() -> String {
    "[::]:8081".to_string()
}

const fn default_high_watermark_queue() -> usize {
    10_000
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            high_watermark_queue: default_high_watermark_queue(),
        }
    }
}

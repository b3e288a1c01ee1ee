//! `wait` step executor (spec §4.5): suspends until `duration` elapses
//! or `until` is reached.

use chrono::{DateTime, Utc};
use serde_json::Value;

pub async fn wait_for(duration_ms: Option<u64>, until: Option<DateTime<Utc>>) -> Value {
    if let Some(ms) = duration_ms {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    } else if let Some(target) = until {
        let now = Utc::now();
        if target > now {
            let remaining = (target - now).to_std().unwrap_or(std::time::Duration::ZERO);
            tokio::time::sleep(remaining).await;
        }
    }
    Value::Null
}

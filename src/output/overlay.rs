use chrono::{DateTime, Utc};
use std::time::Duration;

/// Status line drawn over preview frames
///
/// Token expiry is only shown when less than an hour remains.
pub fn render_overlay(
    fps: f64,
    elapsed: Duration,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> String {
    let mut text = format!("FPS: {:.1} Elapsed: {:.1}", fps, elapsed.as_secs_f64());

    if let Some(exp) = expires_at {
        let left = exp.signed_duration_since(now).num_milliseconds() as f64 / 1000.0;
        if left < 3600.0 {
            text.push_str(&format!(" Expiration: {:.1}", left));
        }
    }

    text
}

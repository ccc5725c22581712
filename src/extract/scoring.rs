//! Project relevance scoring.
//!
//! ```text
//! f = 1 - exp(-mentions / mention_scale)
//! r = 2 ^ (-days_since_last / half_life_days)
//! d = min(1, avg_detail_chars / detail_saturation_chars)
//! score = clamp((wf*f + wr*r + wd*d) / (wf + wr + wd), 0, 1)
//! ```
//!
//! Each term is non-decreasing in its input, so the score never drops when a
//! project gains mentions, recency or detail.

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;

/// Raw inputs to [`relevance_score`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceInputs {
    /// User messages that mention the project.
    pub mentions: u32,
    /// Days between the project's last mention and the newest message in
    /// the export. Negative values are treated as zero.
    pub days_since_last: f64,
    /// Average characters per project message.
    pub avg_detail_chars: f64,
}

impl RelevanceInputs {
    /// Builds inputs from timestamps and totals.
    pub fn from_activity(
        mentions: u32,
        last_discussed: DateTime<Utc>,
        reference: DateTime<Utc>,
        detail_chars: u64,
    ) -> Self {
        let seconds = (reference - last_discussed).num_seconds().max(0) as f64;
        let avg = if mentions == 0 {
            0.0
        } else {
            detail_chars as f64 / f64::from(mentions)
        };
        Self {
            mentions,
            days_since_last: seconds / 86_400.0,
            avg_detail_chars: avg,
        }
    }
}

/// Computes a relevance score in `[0, 1]`.
pub fn relevance_score(inputs: &RelevanceInputs, config: &ScoringConfig) -> f64 {
    let frequency = 1.0 - (-f64::from(inputs.mentions) / config.mention_scale).exp();
    let days = inputs.days_since_last.max(0.0);
    let recency = (-days / config.recency_half_life_days).exp2();
    let detail = (inputs.avg_detail_chars.max(0.0) / config.detail_saturation_chars).min(1.0);

    let weighted = config.frequency_weight * frequency
        + config.recency_weight * recency
        + config.detail_weight * detail;
    let total = config.weight_sum();
    if total <= 0.0 || !weighted.is_finite() {
        return 0.0;
    }
    (weighted / total).clamp(0.0, 1.0)
}

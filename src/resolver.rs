//! Primary zone selection among overlapping inside zones.
//!
//! Order: risk rank descending, then radius ascending (points and polygons
//! rank as infinitely large), then zone id ascending. The result is a zone id;
//! zones themselves are never annotated.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::zone::{Zone, ZoneId};

/// How a free-form risk label becomes a sortable rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskRankPolicy {
    /// Named levels map to ordinals: Low 0, Medium 1, High 2, Very High 3.
    ///
    /// A numeric label in `[0, 1]` is read as a risk score and bucketed onto the
    /// same scale. Numbers outside that range, including integer ordinals such
    /// as `"2"` or `"3"`, are not accepted and rank as unrated. Missing or
    /// unrecognized labels rank below Low.
    #[default]
    Ordinal,

    /// The label parsed as a float; anything non-numeric ranks 0.
    NumericLiteral,
}

/// Rank given to a missing or unrecognized label under [`RiskRankPolicy::Ordinal`].
pub const UNRATED_RANK: f64 = -1.0;

fn level_regex() -> &'static Regex {
    static LEVEL: OnceLock<Regex> = OnceLock::new();
    LEVEL.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:risk\s*(?:level)?\s*[:=-]?\s*)?(very\s*high|critical|extreme|severe|high|medium|moderate|low|minimal)\s*$")
            .unwrap_or_else(|e| unreachable!("static regex failed to compile: {e}"))
    })
}

/// Maps a 0..=1 risk score onto the ordinal scale.
#[must_use]
pub fn score_to_rank(score: f64) -> f64 {
    if score >= 0.75 {
        3.0
    } else if score >= 0.5 {
        2.0
    } else if score >= 0.25 {
        1.0
    } else {
        0.0
    }
}

/// Display name of an ordinal rank, as used for generated zone labels.
#[must_use]
pub fn rank_label(rank: f64) -> &'static str {
    if rank >= 3.0 {
        "Very High"
    } else if rank >= 2.0 {
        "High"
    } else if rank >= 1.0 {
        "Medium"
    } else if rank >= 0.0 {
        "Low"
    } else {
        "Unrated"
    }
}

impl RiskRankPolicy {
    /// Rank of a label; higher is riskier.
    #[must_use]
    pub fn rank(self, label: Option<&str>) -> f64 {
        match self {
            Self::NumericLiteral => label
                .and_then(|l| l.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .unwrap_or(0.0),
            Self::Ordinal => {
                let Some(label) = label else {
                    return UNRATED_RANK;
                };
                if let Ok(score) = label.trim().parse::<f64>() {
                    return if (0.0..=1.0).contains(&score) {
                        score_to_rank(score)
                    } else {
                        UNRATED_RANK
                    };
                }
                let Some(caps) = level_regex().captures(label) else {
                    return UNRATED_RANK;
                };
                let level: String = caps[1]
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect::<String>()
                    .to_ascii_lowercase();
                match level.as_str() {
                    "veryhigh" | "critical" | "extreme" | "severe" => 3.0,
                    "high" => 2.0,
                    "medium" | "moderate" => 1.0,
                    _ => 0.0,
                }
            }
        }
    }
}

/// Deterministic primary zone resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimaryZoneResolver {
    policy: RiskRankPolicy,
}

impl PrimaryZoneResolver {
    /// Creates a resolver with the given risk policy.
    #[must_use]
    pub const fn new(policy: RiskRankPolicy) -> Self {
        Self { policy }
    }

    /// The risk policy in use.
    #[must_use]
    pub const fn policy(&self) -> RiskRankPolicy {
        self.policy
    }

    /// Total priority order: `Less` means `a` is preferred over `b`.
    #[must_use]
    pub fn compare(&self, a: &Zone, b: &Zone) -> Ordering {
        let ra = self.policy.rank(a.risk_label.as_deref());
        let rb = self.policy.rank(b.risk_label.as_deref());
        let radius_a = a.radius_km().unwrap_or(f64::INFINITY);
        let radius_b = b.radius_km().unwrap_or(f64::INFINITY);

        rb.total_cmp(&ra)
            .then_with(|| radius_a.total_cmp(&radius_b))
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Picks the primary among zones committed as inside.
    pub fn resolve<'a, I>(&self, inside: I) -> Option<ZoneId>
    where
        I: IntoIterator<Item = &'a Zone>,
    {
        inside
            .into_iter()
            .min_by(|a, b| self.compare(a, b))
            .map(|z| z.id.clone())
    }
}

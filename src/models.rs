//! Domain types shared by the explorer, schedule and contribution flows.

use serde::{Deserialize, Serialize};

/// Approval state of a project's enrollment in a funding round.
///
/// Transitions are decided by grant administrators through external tooling;
/// this service only ever reads the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    /// Parse the status column. The schema constrains the column to the
    /// three known values, so anything else is treated as still pending.
    pub fn from_db(s: &str) -> Self {
        match s {
            "APPROVED" => Self::Approved,
            "REJECTED" => Self::Rejected,
            _ => Self::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

/// One entry of a project's industry-tag list.
///
/// The `industry` column stores the whole list as JSON text; this is the
/// element shape it decodes to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndustryTag {
    pub label: String,
    pub value: String,
    #[serde(rename = "colorScheme", default)]
    pub color_scheme: Option<String>,
}

/// Where a round sits on the schedule relative to a reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Upcoming,
    Live,
    Ended,
}

impl RoundPhase {
    /// Derive the phase from unix-second bounds. A round is live from its
    /// start time (inclusive) until its end time (exclusive).
    pub fn at(now: i64, start_time: i64, end_time: i64) -> Self {
        if now < start_time {
            Self::Upcoming
        } else if now < end_time {
            Self::Live
        } else {
            Self::Ended
        }
    }
}

/// A funding round row as stored in / read from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FundingRound {
    pub id: String,
    pub round_name: String,
    pub color_scheme: String,
    pub start_time: i64,
    pub end_time: i64,
    pub active: bool,
}

/// A cached spot price for a donation token, keyed by price-feed id.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TokenPrice {
    pub token: String,
    pub usd: f64,
    pub fetched_at: i64,
}

/// A stored donation record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contribution {
    pub id: i64,
    pub project_round_id: String,
    pub project_id: String,
    pub user_id: String,
    pub amount: f64,
    pub token: String,
    pub usd_amount: f64,
    pub matching_pool_share: i64,
    pub tx_signature: String,
    pub created_at: i64,
}

/// Contributor shown on an explorer card or a project's contributor list.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ContributorPreview {
    pub username: String,
    pub profile_picture: Option<String>,
}

// ─────────────────────────────────────────────────────────
// Explorer response shapes
// ─────────────────────────────────────────────────────────

/// Flat row produced by the verified-participation JOIN; assembled into
/// [`VerifiedProject`] before it leaves the db layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ParticipationRow {
    pub id: String,
    pub status: String,
    pub amount_raise: f64,
    pub round_id: String,
    pub round_name: String,
    pub color_scheme: String,
    pub active: bool,
    pub start_time: i64,
    pub end_time: i64,
    pub project_id: String,
    pub project_name: String,
    pub short_description: String,
    pub logo: String,
    pub project_link: Option<String>,
    pub industry: String,
    pub owner_username: String,
    pub is_archive: bool,
}

/// One explorer entry: a participation with its round and project nested.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedProject {
    pub id: String,
    pub status: ApprovalStatus,
    pub amount_raise: f64,
    pub funding_round: RoundInfo,
    pub project: ProjectInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundInfo {
    pub id: String,
    pub round_name: String,
    pub color_scheme: String,
    pub active: bool,
    pub start_time: i64,
    pub end_time: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
    pub short_description: String,
    pub logo: String,
    pub project_link: Option<String>,
    /// Industry-tag list as stored: JSON text.
    pub industry: String,
    pub owner: Owner,
    pub is_archive: bool,
    pub contributions: Vec<ContributorPreview>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Owner {
    pub username: String,
}

impl From<ParticipationRow> for VerifiedProject {
    fn from(row: ParticipationRow) -> Self {
        VerifiedProject {
            id: row.id,
            status: ApprovalStatus::from_db(&row.status),
            amount_raise: row.amount_raise,
            funding_round: RoundInfo {
                id: row.round_id,
                round_name: row.round_name,
                color_scheme: row.color_scheme,
                active: row.active,
                start_time: row.start_time,
                end_time: row.end_time,
            },
            project: ProjectInfo {
                id: row.project_id,
                name: row.project_name,
                short_description: row.short_description,
                logo: row.logo,
                project_link: row.project_link,
                industry: row.industry,
                owner: Owner {
                    username: row.owner_username,
                },
                is_archive: row.is_archive,
                contributions: Vec::new(),
            },
        }
    }
}

/// Reduced participation shape used when validating a donation target.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ParticipationRef {
    pub id: String,
    pub project_id: String,
    pub status: String,
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_status_round_trip() {
        assert_eq!(ApprovalStatus::from_db("PENDING"), ApprovalStatus::Pending);
        assert_eq!(ApprovalStatus::from_db("APPROVED"), ApprovalStatus::Approved);
        assert_eq!(ApprovalStatus::from_db("REJECTED"), ApprovalStatus::Rejected);
        assert_eq!(ApprovalStatus::Approved.as_str(), "APPROVED");
        assert_eq!(
            ApprovalStatus::from_db(ApprovalStatus::Rejected.as_str()),
            ApprovalStatus::Rejected
        );
    }

    #[test]
    fn round_phase_boundaries() {
        // start inclusive, end exclusive
        assert_eq!(RoundPhase::at(99, 100, 200), RoundPhase::Upcoming);
        assert_eq!(RoundPhase::at(100, 100, 200), RoundPhase::Live);
        assert_eq!(RoundPhase::at(199, 100, 200), RoundPhase::Live);
        assert_eq!(RoundPhase::at(200, 100, 200), RoundPhase::Ended);
    }

    #[test]
    fn industry_tags_decode() {
        let raw = r#"[{"label":"DeFi","value":"defi","colorScheme":"teal"},{"label":"NFT","value":"nft"}]"#;
        let tags: Vec<IndustryTag> = serde_json::from_str(raw).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].value, "defi");
        assert_eq!(tags[0].color_scheme.as_deref(), Some("teal"));
        assert_eq!(tags[1].color_scheme, None);
    }
}

/// Visit state definitions for tracking URL claims
///
/// This module defines all possible states a URL can be in once a worker
/// has claimed it for crawling.
use chrono::{DateTime, Utc};
use std::fmt;
use url::Url;

/// Represents the current claim state of a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitState {
    // ===== Active States =====
    /// A worker holds the claim and is processing the URL
    Pending,

    /// The claim was given back after a transient failure; the URL may be
    /// claimed again
    Released,

    // ===== Terminal States =====
    /// The page was fetched and its links published
    Done,

    /// The task was dead-lettered; the URL is never crawled again
    Failed,
}

impl VisitState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if a new claim on a URL in this state may succeed
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Released)
    }

    /// Converts the visit state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Released => "released",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parses a visit state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "released" => Some(Self::Released),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible visit states
    pub fn all_states() -> [Self; 4] {
        [Self::Pending, Self::Released, Self::Done, Self::Failed]
    }
}

impl fmt::Display for VisitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A claim record held by a visited set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitedRecord {
    /// The normalized URL
    pub url: Url,

    /// When the most recent claim was taken
    pub claimed_at: DateTime<Utc>,

    /// Current state of the claim
    pub state: VisitState,

    /// Number of failed attempts charged against this URL
    pub attempts: u32,
}

impl VisitedRecord {
    /// Creates a fresh pending record claimed now
    pub fn pending(url: Url) -> Self {
        Self {
            url,
            claimed_at: Utc::now(),
            state: VisitState::Pending,
            attempts: 0,
        }
    }
}

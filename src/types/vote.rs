//! Reactions and the votes they carry.

use serde::{Deserialize, Serialize};

use super::ids::{PrNumber, ReactionId};

/// GitHub reaction content.
///
/// Deserializes from the API's content strings. Contents this enum does not
/// know about (GitHub has added new ones before) become [`Reaction::Other`]
/// and carry no weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reaction {
    /// +1 / thumbs up
    #[serde(rename = "+1")]
    ThumbsUp,
    /// -1 / thumbs down
    #[serde(rename = "-1")]
    ThumbsDown,
    #[serde(rename = "laugh")]
    Laugh,
    #[serde(rename = "hooray")]
    Hooray,
    #[serde(rename = "confused")]
    Confused,
    #[serde(rename = "heart")]
    Heart,
    #[serde(rename = "rocket")]
    Rocket,
    #[serde(rename = "eyes")]
    Eyes,
    #[serde(other)]
    Other,
}

impl Reaction {
    /// The vote this reaction casts: +1, -1, or 0.
    pub fn weight(self) -> i64 {
        match self {
            Reaction::ThumbsUp => 1,
            Reaction::ThumbsDown => -1,
            _ => 0,
        }
    }
}

/// A reaction attached to a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionData {
    pub id: ReactionId,
    pub content: Reaction,
}

/// An open pull request as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestSummary {
    pub number: PrNumber,
    /// Global pull request id (distinct from the per-repo number).
    pub id: u64,
}

/// One open pull request with its score for the current cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub number: PrNumber,
    pub id: u64,
    pub net_score: i64,
}

/// Folds reactions into a net score: `#(+1) - #(-1)`.
pub fn net_score<'a>(reactions: impl IntoIterator<Item = &'a ReactionData>) -> i64 {
    reactions.into_iter().map(|r| r.content.weight()).sum()
}

//! Shared protocol vocabulary: lifecycle states, CIST categories, response
//! kinds, transcript roles, and the server's session snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a conversation session, as reported by the server.
///
/// Transitions are entirely server-driven; the client defaults to [`Init`]
/// until first contact and otherwise mirrors whatever the server reports.
/// The aliases accept the spellings used by earlier server builds.
///
/// Spellings outside the known set decode to [`Unknown`] rather than
/// failing: the state rides inside `conversation_response`, and a strict
/// decode here would reject the whole frame, content included, whenever the
/// server introduces a transient state.
///
/// [`Init`]: LifecycleState::Init
/// [`Unknown`]: LifecycleState::Unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Init,
    #[serde(alias = "photo_based_chat")]
    PhotoChat,
    #[serde(alias = "cist_evaluation")]
    StructuredEval,
    AsyncProcessing,
    Completed,
    #[serde(other)]
    Unknown,
}

/// The eight categories of the embedded structured-assessment flow.
///
/// This set is closed: the server only ever scores these categories, each
/// with a fixed maximum score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CistCategory {
    OrientationTime,
    OrientationPlace,
    MemoryRegistration,
    MemoryRecall,
    MemoryRecognition,
    Attention,
    ExecutiveFunction,
    LanguageNaming,
}

impl CistCategory {
    /// All categories, in assessment order.
    pub const ALL: [CistCategory; 8] = [
        CistCategory::OrientationTime,
        CistCategory::OrientationPlace,
        CistCategory::MemoryRegistration,
        CistCategory::MemoryRecall,
        CistCategory::MemoryRecognition,
        CistCategory::Attention,
        CistCategory::ExecutiveFunction,
        CistCategory::LanguageNaming,
    ];

    /// The wire spelling of this category.
    pub fn as_str(self) -> &'static str {
        match self {
            CistCategory::OrientationTime => "orientation_time",
            CistCategory::OrientationPlace => "orientation_place",
            CistCategory::MemoryRegistration => "memory_registration",
            CistCategory::MemoryRecall => "memory_recall",
            CistCategory::MemoryRecognition => "memory_recognition",
            CistCategory::Attention => "attention",
            CistCategory::ExecutiveFunction => "executive_function",
            CistCategory::LanguageNaming => "language_naming",
        }
    }

    /// Parses a wire spelling; `None` for anything outside the closed set.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.as_str() == value)
    }

    /// Maximum score the server can award for this category.
    pub fn max_score(self) -> f64 {
        match self {
            CistCategory::OrientationTime => 4.0,
            CistCategory::OrientationPlace => 1.0,
            CistCategory::MemoryRegistration => 3.0,
            CistCategory::MemoryRecall => 3.0,
            CistCategory::MemoryRecognition => 4.0,
            CistCategory::Attention => 1.0,
            CistCategory::ExecutiveFunction => 2.0,
            CistCategory::LanguageNaming => 3.0,
        }
    }
}

/// Tag the server attaches to assistant messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    PhotoConversation,
    CistQuestion,
    FollowupQuestion,
    EvaluationComplete,
}

impl ResponseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseKind::PhotoConversation => "photo_conversation",
            ResponseKind::CistQuestion => "cist_question",
            ResponseKind::FollowupQuestion => "followup_question",
            ResponseKind::EvaluationComplete => "evaluation_complete",
        }
    }

    /// Parses a wire spelling; `None` for kinds this client does not know.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "photo_conversation" => Some(ResponseKind::PhotoConversation),
            "cist_question" => Some(ResponseKind::CistQuestion),
            "followup_question" => Some(ResponseKind::FollowupQuestion),
            "evaluation_complete" => Some(ResponseKind::EvaluationComplete),
            _ => None,
        }
    }
}

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Server-authoritative session snapshot nested in `conversation_response`.
///
/// Every field is optional on the wire: a partial snapshot must only touch
/// the fields it actually carries, so absence is modeled as `None` rather
/// than a default value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_state: Option<LifecycleState>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cist_progress: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cist_scores: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
}

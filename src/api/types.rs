use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Status (as returned by the server, nested entities embedded)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPayload {
    pub id: String,
    #[serde(default)]
    pub account: Option<Account>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub spoiler_text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
    #[serde(default)]
    pub in_reply_to_account_id: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub reblog: Option<Box<StatusPayload>>,
    #[serde(default)]
    pub quote: Option<Box<StatusPayload>>,
    #[serde(default)]
    pub poll: Option<Poll>,
    #[serde(default)]
    pub group: Option<Group>,
    #[serde(default)]
    pub favourited: bool,
    #[serde(default)]
    pub reblogged: bool,
    #[serde(default)]
    pub replies_count: u64,
    #[serde(default)]
    pub favourites_count: u64,
    #[serde(default)]
    pub reblogs_count: u64,
    #[serde(default)]
    pub reactions: Vec<EmojiReaction>,
    #[serde(default)]
    pub filtered: Vec<FilterResult>,
    #[serde(default)]
    pub pleroma: Option<PleromaStatus>,
}

/// Pleroma/Akkoma extensions carried under `status.pleroma`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PleromaStatus {
    #[serde(default)]
    pub emoji_reactions: Vec<EmojiReaction>,
    #[serde(default)]
    pub quote: Option<Box<StatusPayload>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiReaction {
    pub name: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub me: bool,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    pub filter: FilterRef,
    #[serde(default)]
    pub keyword_matches: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRef {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub filter_action: Option<String>,
}

impl StatusPayload {
    /// Quoted post, from either the Mastodon field or the Pleroma extension.
    pub fn quoted(&self) -> Option<&StatusPayload> {
        self.quote
            .as_deref()
            .or_else(|| self.pleroma.as_ref().and_then(|p| p.quote.as_deref()))
    }

    /// Emoji reactions, from either the top-level field or the Pleroma extension.
    pub fn emoji_reactions(&self) -> &[EmojiReaction] {
        if !self.reactions.is_empty() {
            return &self.reactions;
        }
        self.pleroma
            .as_ref()
            .map(|p| p.emoji_reactions.as_slice())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub acct: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub statuses_count: u64,
    #[serde(default)]
    pub pleroma: Option<AccountPleroma>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountPleroma {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_suggested: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_moderator: bool,
}

impl Account {
    pub fn tags(&self) -> &[String] {
        self.pleroma
            .as_ref()
            .map(|p| p.tags.as_slice())
            .unwrap_or_default()
    }

    pub fn is_verified(&self) -> bool {
        self.tags().iter().any(|t| t == "verified")
    }

    pub fn is_suggested(&self) -> bool {
        self.pleroma.as_ref().is_some_and(|p| p.is_suggested)
    }
}

// ---------------------------------------------------------------------------
// Relationship
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Target account id.
    pub id: String,
    #[serde(default)]
    pub following: bool,
    #[serde(default)]
    pub followed_by: bool,
    #[serde(default)]
    pub requested: bool,
    #[serde(default)]
    pub blocking: bool,
    #[serde(default)]
    pub blocked_by: bool,
    #[serde(default)]
    pub muting: bool,
}

// ---------------------------------------------------------------------------
// Poll & Group
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub votes_count: u64,
    #[serde(default)]
    pub voters_count: Option<u64>,
    #[serde(default)]
    pub voted: bool,
    #[serde(default)]
    pub own_votes: Vec<u32>,
    #[serde(default)]
    pub options: Vec<PollOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub title: String,
    #[serde(default)]
    pub votes_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub members_count: u64,
    #[serde(default)]
    pub locked: bool,
}

// ---------------------------------------------------------------------------
// Conversation context & posting
// ---------------------------------------------------------------------------

/// Response of `GET /api/v1/statuses/:id/context`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextPayload {
    #[serde(default)]
    pub ancestors: Vec<StatusPayload>,
    #[serde(default)]
    pub descendants: Vec<StatusPayload>,
}

/// Parameters of `POST /api/v1/statuses`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusParams {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spoiler_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

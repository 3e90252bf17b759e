//! Builders and a scripted server for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use crate::api::types::{Account, ContextPayload, EmojiReaction, Relationship, StatusParams, StatusPayload};
use crate::api::{AccountApi, ApiClientError, Page, StatusApi};

pub fn account(id: &str) -> Account {
    Account {
        id: id.into(),
        acct: id.into(),
        username: id.into(),
        display_name: String::new(),
        url: None,
        avatar: None,
        locked: false,
        bot: false,
        followers_count: 0,
        following_count: 0,
        statuses_count: 0,
        pleroma: None,
    }
}

pub fn status_payload(id: &str, account_id: &str) -> StatusPayload {
    StatusPayload {
        id: id.into(),
        account: Some(account(account_id)),
        content: String::new(),
        spoiler_text: String::new(),
        created_at: None,
        in_reply_to_id: None,
        in_reply_to_account_id: None,
        visibility: None,
        url: None,
        reblog: None,
        quote: None,
        poll: None,
        group: None,
        favourited: false,
        reblogged: false,
        replies_count: 0,
        favourites_count: 0,
        reblogs_count: 0,
        reactions: Vec::new(),
        filtered: Vec::new(),
        pleroma: None,
    }
}

pub fn page(ids: &[&str]) -> Page<StatusPayload> {
    Page::new(ids.iter().map(|id| status_payload(id, "author")).collect())
}

/// An in-memory server. Each call is logged as `op:args`, optionally held
/// until [`MockApi::release`], and fails if its op was marked failing.
#[derive(Default)]
pub struct MockApi {
    calls: Mutex<Vec<String>>,
    failing: HashSet<&'static str>,
    gate: Option<Arc<Notify>>,
    statuses: Mutex<HashMap<String, StatusPayload>>,
    status_pages: Mutex<VecDeque<Page<StatusPayload>>>,
    account_pages: Mutex<VecDeque<Page<Account>>>,
    context: Mutex<Option<ContextPayload>>,
    posted: Mutex<u32>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every call until [`MockApi::release`].
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Notify::new()));
        self
    }

    pub fn failing(mut self, op: &'static str) -> Self {
        self.failing.insert(op);
        self
    }

    /// Server-side copy returned (and updated) by status mutations.
    pub fn with_status(self, payload: StatusPayload) -> Self {
        lock(&self.statuses).insert(payload.id.clone(), payload);
        self
    }

    pub fn with_status_pages(self, pages: Vec<Page<StatusPayload>>) -> Self {
        lock(&self.status_pages).extend(pages);
        self
    }

    pub fn with_account_pages(self, pages: Vec<Page<Account>>) -> Self {
        lock(&self.account_pages).extend(pages);
        self
    }

    pub fn with_context(self, context: ContextPayload) -> Self {
        *lock(&self.context) = Some(context);
        self
    }

    /// Let one held call through.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    async fn respond<T>(
        &self,
        op: &'static str,
        call: String,
        ok: impl FnOnce() -> Result<T, ApiClientError>,
    ) -> Result<T, ApiClientError> {
        lock(&self.calls).push(call);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.failing.contains(op) {
            return Err(ApiClientError::ApiError {
                status: 500,
                detail: format!("{op} failed"),
            });
        }
        ok()
    }

    fn update_status(
        &self,
        id: &str,
        f: impl FnOnce(&mut StatusPayload),
    ) -> Result<StatusPayload, ApiClientError> {
        let mut statuses = lock(&self.statuses);
        let status = statuses.get_mut(id).ok_or_else(|| ApiClientError::ApiError {
            status: 404,
            detail: "Record not found".into(),
        })?;
        f(status);
        Ok(status.clone())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StatusApi for MockApi {
    async fn get_status(&self, id: &str) -> Result<StatusPayload, ApiClientError> {
        self.respond("get_status", format!("get_status:{id}"), || {
            self.update_status(id, |_| {})
        })
        .await
    }

    async fn get_context(&self, id: &str) -> Result<ContextPayload, ApiClientError> {
        self.respond("context", format!("context:{id}"), || {
            Ok(lock(&self.context).clone().unwrap_or_default())
        })
        .await
    }

    async fn get_status_page(&self, path: &str) -> Result<Page<StatusPayload>, ApiClientError> {
        self.respond("page", format!("page:{path}"), || {
            Ok(lock(&self.status_pages)
                .pop_front()
                .unwrap_or_else(|| Page::new(Vec::new())))
        })
        .await
    }

    async fn create_status(
        &self,
        params: &StatusParams,
        idempotency_key: &str,
    ) -> Result<StatusPayload, ApiClientError> {
        let _ = idempotency_key;
        self.respond("post", "post".to_string(), || {
            let mut n = lock(&self.posted);
            *n += 1;
            let mut status = status_payload(&format!("posted-{n}"), "me");
            status.content = params.status.clone();
            status.in_reply_to_id = params.in_reply_to_id.clone();
            Ok(status)
        })
        .await
    }

    async fn favourite(&self, id: &str) -> Result<StatusPayload, ApiClientError> {
        self.respond("favourite", format!("favourite:{id}"), || {
            self.update_status(id, |s| {
                if !s.favourited {
                    s.favourited = true;
                    s.favourites_count += 1;
                }
            })
        })
        .await
    }

    async fn unfavourite(&self, id: &str) -> Result<StatusPayload, ApiClientError> {
        self.respond("unfavourite", format!("unfavourite:{id}"), || {
            self.update_status(id, |s| {
                if s.favourited {
                    s.favourited = false;
                    s.favourites_count = s.favourites_count.saturating_sub(1);
                }
            })
        })
        .await
    }

    async fn reblog(&self, id: &str) -> Result<StatusPayload, ApiClientError> {
        self.respond("reblog", format!("reblog:{id}"), || {
            let original = self.update_status(id, |s| {
                if !s.reblogged {
                    s.reblogged = true;
                    s.reblogs_count += 1;
                }
            })?;
            let mut wrapper = status_payload(&format!("reblog-of-{id}"), "me");
            wrapper.reblog = Some(Box::new(original));
            Ok(wrapper)
        })
        .await
    }

    async fn unreblog(&self, id: &str) -> Result<StatusPayload, ApiClientError> {
        self.respond("unreblog", format!("unreblog:{id}"), || {
            self.update_status(id, |s| {
                if s.reblogged {
                    s.reblogged = false;
                    s.reblogs_count = s.reblogs_count.saturating_sub(1);
                }
            })
        })
        .await
    }

    async fn react(&self, id: &str, emoji: &str) -> Result<StatusPayload, ApiClientError> {
        self.respond("react", format!("react:{id}:{emoji}"), || {
            self.update_status(id, |s| match s.reactions.iter_mut().find(|r| r.name == emoji) {
                Some(r) if !r.me => {
                    r.me = true;
                    r.count += 1;
                }
                Some(_) => {}
                None => s.reactions.push(EmojiReaction {
                    name: emoji.to_owned(),
                    count: 1,
                    me: true,
                    url: None,
                }),
            })
        })
        .await
    }

    async fn unreact(&self, id: &str, emoji: &str) -> Result<StatusPayload, ApiClientError> {
        self.respond("unreact", format!("unreact:{id}:{emoji}"), || {
            self.update_status(id, |s| {
                if let Some(r) = s.reactions.iter_mut().find(|r| r.name == emoji && r.me) {
                    r.me = false;
                    r.count = r.count.saturating_sub(1);
                }
                s.reactions.retain(|r| r.count > 0);
            })
        })
        .await
    }
}

impl AccountApi for MockApi {
    async fn verify_credentials(&self) -> Result<Account, ApiClientError> {
        self.respond("verify_credentials", "verify_credentials".to_string(), || {
            Ok(account("me"))
        })
        .await
    }

    async fn get_account(&self, account_id: &str) -> Result<Account, ApiClientError> {
        self.respond("get_account", format!("get_account:{account_id}"), || {
            Ok(account(account_id))
        })
        .await
    }

    async fn get_account_page(&self, path: &str) -> Result<Page<Account>, ApiClientError> {
        self.respond("page", format!("page:{path}"), || {
            Ok(lock(&self.account_pages)
                .pop_front()
                .unwrap_or_else(|| Page::new(Vec::new())))
        })
        .await
    }

    async fn get_relationships(
        &self,
        account_ids: &[String],
    ) -> Result<Vec<Relationship>, ApiClientError> {
        self.respond(
            "relationships",
            format!("relationships:{}", account_ids.join(",")),
            || {
                Ok(account_ids
                    .iter()
                    .map(|id| Relationship {
                        id: id.clone(),
                        ..Default::default()
                    })
                    .collect())
            },
        )
        .await
    }

    async fn follow(&self, account_id: &str) -> Result<Relationship, ApiClientError> {
        self.respond("follow", format!("follow:{account_id}"), || {
            Ok(Relationship {
                id: account_id.to_owned(),
                following: true,
                ..Default::default()
            })
        })
        .await
    }

    async fn unfollow(&self, account_id: &str) -> Result<Relationship, ApiClientError> {
        self.respond("unfollow", format!("unfollow:{account_id}"), || {
            Ok(Relationship {
                id: account_id.to_owned(),
                ..Default::default()
            })
        })
        .await
    }

    async fn tag_users(&self, nicknames: &[String], tags: &[String]) -> Result<(), ApiClientError> {
        self.respond(
            "tag",
            format!("tag:{}:{}", nicknames.join(","), tags.join(",")),
            || Ok(()),
        )
        .await
    }

    async fn untag_users(&self, nicknames: &[String], tags: &[String]) -> Result<(), ApiClientError> {
        self.respond(
            "untag",
            format!("untag:{}:{}", nicknames.join(","), tags.join(",")),
            || Ok(()),
        )
        .await
    }

    async fn set_suggested(&self, nicknames: &[String], suggested: bool) -> Result<(), ApiClientError> {
        let op = if suggested { "suggest" } else { "unsuggest" };
        self.respond(op, format!("{op}:{}", nicknames.join(",")), || Ok(()))
            .await
    }
}

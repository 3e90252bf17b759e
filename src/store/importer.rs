//! Flattening of server status payloads into store rows.
//!
//! A status payload embeds its author, poll, group, and possibly a reblogged
//! and a quoted status, which embed their own. Each of those becomes an
//! independently addressable entity. Nested payloads are processed from an
//! explicit queue so arbitrarily deep reblog/quote chains never grow the
//! call stack.

use std::collections::VecDeque;

use crate::api::types::{Account, Group, Poll, StatusPayload};
use crate::store::entity::Status;

/// Store rows produced from a batch of payloads.
#[derive(Debug, Default)]
pub struct Normalized {
    pub accounts: Vec<Account>,
    pub statuses: Vec<Status>,
    pub polls: Vec<Poll>,
    pub groups: Vec<Group>,
    /// Ids of accepted top-level payloads, in input order.
    pub root_ids: Vec<String>,
    /// Number of payloads (top-level or nested) dropped as broken.
    pub rejected: usize,
}

/// A payload is broken when it has no author, or it is a reblog whose inner
/// status has no author.
pub fn is_broken(payload: &StatusPayload) -> bool {
    payload.account.is_none()
        || payload
            .reblog
            .as_deref()
            .is_some_and(|inner| inner.account.is_none())
}

pub fn normalize_statuses(payloads: Vec<StatusPayload>) -> Normalized {
    let mut out = Normalized::default();
    let mut queue: VecDeque<(StatusPayload, bool)> =
        payloads.into_iter().map(|p| (p, true)).collect();

    while let Some((payload, top_level)) = queue.pop_front() {
        if is_broken(&payload) {
            tracing::debug!(status_id = %payload.id, top_level, "dropping broken status payload");
            out.rejected += 1;
            continue;
        }

        if top_level {
            out.root_ids.push(payload.id.clone());
        }

        let flat = flatten(payload);
        out.accounts.extend(flat.account);
        out.polls.extend(flat.poll);
        out.groups.extend(flat.group);
        out.statuses.push(flat.status);
        queue.extend(flat.nested.into_iter().map(|p| (p, false)));
    }

    out
}

struct Flattened {
    status: Status,
    account: Option<Account>,
    poll: Option<Poll>,
    group: Option<Group>,
    nested: Vec<StatusPayload>,
}

fn flatten(payload: StatusPayload) -> Flattened {
    let reactions = payload.emoji_reactions().to_vec();
    let StatusPayload {
        id,
        account,
        content,
        spoiler_text,
        created_at,
        in_reply_to_id,
        in_reply_to_account_id,
        visibility,
        url,
        reblog,
        quote,
        poll,
        group,
        favourited,
        reblogged,
        replies_count,
        favourites_count,
        reblogs_count,
        reactions: _,
        filtered,
        pleroma,
    } = payload;

    let quote = quote.or_else(|| pleroma.and_then(|p| p.quote));
    let mut nested = Vec::new();
    let reblog_id = reblog.map(|r| {
        let id = r.id.clone();
        nested.push(*r);
        id
    });
    let quote_id = quote.map(|q| {
        let id = q.id.clone();
        nested.push(*q);
        id
    });

    let status = Status {
        id,
        account_id: account.as_ref().map(|a| a.id.clone()).unwrap_or_default(),
        content,
        spoiler_text,
        created_at,
        in_reply_to_id,
        in_reply_to_account_id,
        visibility,
        url,
        reblog_id,
        quote_id,
        poll_id: poll.as_ref().map(|p| p.id.clone()),
        group_id: group.as_ref().map(|g| g.id.clone()),
        favourited,
        reblogged,
        replies_count,
        favourites_count,
        reblogs_count,
        reactions,
        filtered,
    };

    Flattened {
        status,
        account,
        poll,
        group,
        nested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{account, status_payload};

    #[test]
    fn flattens_reblog_quote_poll_and_group() {
        let mut quoted = status_payload("q", "carol");
        quoted.poll = Some(Poll {
            id: "p1".into(),
            expires_at: None,
            expired: false,
            multiple: false,
            votes_count: 0,
            voters_count: None,
            voted: false,
            own_votes: vec![],
            options: vec![],
        });
        let mut inner = status_payload("inner", "bob");
        inner.quote = Some(Box::new(quoted));
        let mut outer = status_payload("outer", "alice");
        outer.reblog = Some(Box::new(inner));

        let out = normalize_statuses(vec![outer]);

        assert_eq!(out.root_ids, vec!["outer".to_string()]);
        let ids: Vec<&str> = out.statuses.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["outer", "inner", "q"]);
        assert_eq!(out.statuses[0].reblog_id.as_deref(), Some("inner"));
        assert_eq!(out.statuses[1].quote_id.as_deref(), Some("q"));
        assert_eq!(out.statuses[2].poll_id.as_deref(), Some("p1"));
        assert_eq!(out.accounts.len(), 3);
        assert_eq!(out.polls.len(), 1);
    }

    #[test]
    fn pleroma_quote_is_followed() {
        let mut outer = status_payload("1", "alice");
        outer.pleroma = Some(crate::api::types::PleromaStatus {
            emoji_reactions: vec![],
            quote: Some(Box::new(status_payload("2", "bob"))),
        });
        let out = normalize_statuses(vec![outer]);
        assert_eq!(out.statuses[0].quote_id.as_deref(), Some("2"));
        assert_eq!(out.statuses.len(), 2);
    }

    #[test]
    fn rejects_broken_payloads_without_failing_batch() {
        let mut no_account = status_payload("1", "alice");
        no_account.account = None;

        let mut broken_reblog = status_payload("2", "alice");
        let mut inner = status_payload("3", "bob");
        inner.account = None;
        broken_reblog.reblog = Some(Box::new(inner));

        let ok = status_payload("4", "alice");

        let out = normalize_statuses(vec![no_account, broken_reblog, ok]);
        assert_eq!(out.root_ids, vec!["4".to_string()]);
        assert_eq!(out.statuses.len(), 1);
        assert_eq!(out.rejected, 2);
    }

    #[test]
    fn deep_quote_chain_is_flattened_iteratively() {
        let mut payload = status_payload("0", "a");
        for i in 1..1_000 {
            let mut outer = status_payload(&i.to_string(), "a");
            outer.quote = Some(Box::new(payload));
            payload = outer;
        }
        let out = normalize_statuses(vec![payload]);
        assert_eq!(out.statuses.len(), 1_000);
        assert_eq!(out.accounts.len(), 1_000);
        assert_eq!(out.accounts[0], account("a"));
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn broken_payload_is_dropped_below_info() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut broken = status_payload("1", "alice");
            broken.account = None;
            let out = normalize_statuses(vec![broken, status_payload("2", "bob")]);
            assert_eq!(out.rejected, 1);
            assert_eq!(out.root_ids, vec!["2".to_string()]);
        });

        assert!(captured.0.lock().unwrap().is_empty());
    }
}

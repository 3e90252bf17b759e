//! Emoji reactions, one per user.
//!
//! A status carries `emoji → {count, me}`. Reacting with a new emoji first
//! clears the user's favourite and any other reaction of theirs, in
//! parallel; the new reaction is only sent once every removal went through.
//! `👍` is the favourite itself and is routed there.

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};

use crate::api::SocialApi;
use crate::api::types::EmojiReaction;
use crate::effects::{MutationCallbacks, MutationCoordinator, MutationKind, MutationOutcome};
use crate::store::entity::Status;
use crate::store::transaction::Transaction;

pub const FAVOURITE_EMOJI: &str = "👍";

pub fn react_effect(status_id: &str, emoji: &str) -> Transaction {
    let emoji = emoji.to_owned();
    Transaction::new().update::<Status>(status_id, move |s| {
        let mut reactions = s.reactions.clone();
        match reactions.iter_mut().find(|r| r.name == emoji) {
            Some(r) => {
                r.count = r.count.saturating_add(1);
                r.me = true;
            }
            None => reactions.push(EmojiReaction {
                name: emoji,
                count: 1,
                me: true,
                url: None,
            }),
        }
        Status {
            reactions,
            ..s.clone()
        }
    })
}

pub fn unreact_effect(status_id: &str, emoji: &str) -> Transaction {
    let emoji = emoji.to_owned();
    Transaction::new().update::<Status>(status_id, move |s| {
        let mut reactions = s.reactions.clone();
        if let Some(i) = reactions.iter().position(|r| r.name == emoji) {
            let r = &mut reactions[i];
            r.count = r.count.saturating_sub(1);
            r.me = false;
            if r.count == 0 {
                reactions.remove(i);
            }
        }
        Status {
            reactions,
            ..s.clone()
        }
    })
}

/// Undo [`unreact_effect`] for `previous`, the user's reaction as it stood
/// at `position` before removal. A pruned entry comes back as it was.
pub fn restore_reaction_effect(
    status_id: &str,
    previous: &EmojiReaction,
    position: usize,
) -> Transaction {
    let previous = previous.clone();
    Transaction::new().update::<Status>(status_id, move |s| {
        let mut reactions = s.reactions.clone();
        match reactions.iter_mut().find(|r| r.name == previous.name) {
            Some(r) => {
                r.count = r.count.saturating_add(1);
                r.me = true;
            }
            None => reactions.insert(position.min(reactions.len()), previous),
        }
        Status {
            reactions,
            ..s.clone()
        }
    })
}

impl<A: SocialApi> MutationCoordinator<A> {
    pub async fn emoji_react(
        &self,
        status_id: &str,
        emoji: &str,
        callbacks: Option<MutationCallbacks>,
    ) -> MutationOutcome {
        if !self.session().is_authenticated() {
            return MutationOutcome::Unauthenticated;
        }
        let Some(status) = self.cache().select_entity::<Status>(status_id) else {
            return MutationOutcome::NoOp;
        };

        let is_favourite = emoji == FAVOURITE_EMOJI;
        let already = if is_favourite {
            status.favourited
        } else {
            status.reaction(emoji).is_some_and(|r| r.me)
        };
        if already {
            return MutationOutcome::NoOp;
        }

        let mut removals: Vec<BoxFuture<'_, MutationOutcome>> = Vec::new();
        if status.favourited && !is_favourite {
            removals.push(self.unfavourite(status_id, None).boxed());
        }
        for previous in status.own_reactions().filter(|r| r.name != emoji) {
            let name = previous.name.clone();
            removals.push(
                async move { self.un_emoji_react(status_id, &name, None).await }.boxed(),
            );
        }

        if !removals.is_empty() {
            let results = join_all(removals).await;
            let failed = results.iter().filter(|o| o.is_rolled_back()).count();
            if failed > 0 {
                tracing::warn!(
                    status_id,
                    emoji,
                    failed,
                    total = results.len(),
                    "could not clear previous reactions, not reacting"
                );
                let error = results.into_iter().find_map(|o| match o {
                    MutationOutcome::RolledBack(e) => Some(e),
                    _ => None,
                });
                if let (Some(error), Some(on_error)) = (&error, callbacks.and_then(|c| c.on_error)) {
                    on_error(error);
                }
                return error.map_or(MutationOutcome::NoOp, MutationOutcome::RolledBack);
            }
        }

        if is_favourite {
            return self.favourite(status_id, callbacks).await;
        }

        self.run(
            MutationKind::React,
            status_id,
            react_effect(status_id, emoji),
            unreact_effect(status_id, emoji),
            self.api().react(status_id, emoji),
            |cache, status| {
                cache.import_statuses(vec![status], None);
            },
            callbacks,
        )
        .await
    }

    pub async fn un_emoji_react(
        &self,
        status_id: &str,
        emoji: &str,
        callbacks: Option<MutationCallbacks>,
    ) -> MutationOutcome {
        if emoji == FAVOURITE_EMOJI {
            return self.unfavourite(status_id, callbacks).await;
        }
        if !self.session().is_authenticated() {
            return MutationOutcome::Unauthenticated;
        }
        let applied = self.cache().select_entity::<Status>(status_id).and_then(|s| {
            s.reactions
                .iter()
                .position(|r| r.name == emoji && r.me)
                .map(|i| (i, s.reactions[i].clone()))
        });
        let Some((position, previous)) = applied else {
            return MutationOutcome::NoOp;
        };

        self.run(
            MutationKind::Unreact,
            status_id,
            unreact_effect(status_id, emoji),
            restore_reaction_effect(status_id, &previous, position),
            self.api().unreact(status_id, emoji),
            |cache, status| {
                cache.import_statuses(vec![status], None);
            },
            callbacks,
        )
        .await
    }
}

use crate::api::types::{Account, Group, Poll, Relationship};
use crate::store::entity::{Entity, EntityKind, EntityStore, Status};

/// Produces the next snapshot of an entity from its current one.
pub type Updater<T> = Box<dyn FnOnce(&T) -> T + Send>;

/// A batch of keyed updaters across entity kinds, applied as one store write.
///
/// An updater only runs if its entity is present; a transaction never
/// creates an entity. There is no rollback inside a transaction: optimistic
/// effects are undone by applying their inverse transaction.
#[derive(Default)]
pub struct Transaction {
    pub(crate) accounts: Vec<(String, Updater<Account>)>,
    pub(crate) statuses: Vec<(String, Updater<Status>)>,
    pub(crate) polls: Vec<(String, Updater<Poll>)>,
    pub(crate) groups: Vec<(String, Updater<Group>)>,
    pub(crate) relationships: Vec<(String, Updater<Relationship>)>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `f` for the entity of type `T` with `id`.
    pub fn update<T: Entity>(
        mut self,
        id: impl Into<String>,
        f: impl FnOnce(&T) -> T + Send + 'static,
    ) -> Self {
        T::updaters(&mut self).push((id.into(), Box::new(f)));
        self
    }

    /// Append another transaction's updaters after this one's.
    pub fn merge(mut self, other: Transaction) -> Self {
        self.accounts.extend(other.accounts);
        self.statuses.extend(other.statuses);
        self.polls.extend(other.polls);
        self.groups.extend(other.groups);
        self.relationships.extend(other.relationships);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
            && self.statuses.is_empty()
            && self.polls.is_empty()
            && self.groups.is_empty()
            && self.relationships.is_empty()
    }

    /// Run every updater against `store`, returning the `(kind, id)` pairs
    /// that were actually written.
    pub(crate) fn apply(self, store: &mut EntityStore) -> Vec<(EntityKind, String)> {
        let mut touched = Vec::new();
        apply_table(store, self.accounts, &mut touched);
        apply_table(store, self.statuses, &mut touched);
        apply_table(store, self.polls, &mut touched);
        apply_table(store, self.groups, &mut touched);
        apply_table(store, self.relationships, &mut touched);
        touched
    }
}

fn apply_table<T: Entity>(
    store: &mut EntityStore,
    updaters: Vec<(String, Updater<T>)>,
    touched: &mut Vec<(EntityKind, String)>,
) {
    let table = T::table_mut(store);
    for (id, f) in updaters {
        let Some(current) = table.get(&id) else {
            tracing::trace!(kind = %T::KIND, %id, "transaction skipped missing entity");
            continue;
        };
        let next = f(current.as_ref());
        table.insert(id.clone(), next);
        touched.push((T::KIND, id));
    }
}

fn queued_ids<T>(updaters: &[(String, Updater<T>)]) -> Vec<&str> {
    updaters.iter().map(|(id, _)| id.as_str()).collect()
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("accounts", &queued_ids(&self.accounts))
            .field("statuses", &queued_ids(&self.statuses))
            .field("polls", &queued_ids(&self.polls))
            .field("groups", &queued_ids(&self.groups))
            .field("relationships", &queued_ids(&self.relationships))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str, followers: u64) -> Account {
        Account {
            id: id.into(),
            acct: id.into(),
            username: id.into(),
            display_name: String::new(),
            url: None,
            avatar: None,
            locked: false,
            bot: false,
            followers_count: followers,
            following_count: 0,
            statuses_count: 0,
            pleroma: None,
        }
    }

    #[test]
    fn updates_existing_entities_across_kinds() {
        let mut store = EntityStore::default();
        store.put(account("1", 3));
        store.put(Relationship {
            id: "1".into(),
            ..Default::default()
        });

        let touched = Transaction::new()
            .update::<Account>("1", |a| Account {
                followers_count: a.followers_count + 1,
                ..a.clone()
            })
            .update::<Relationship>("1", |r| Relationship {
                following: true,
                ..r.clone()
            })
            .apply(&mut store);

        assert_eq!(touched.len(), 2);
        assert_eq!(store.get::<Account>("1").unwrap().followers_count, 4);
        assert!(store.get::<Relationship>("1").unwrap().following);
    }

    #[test]
    fn never_creates_missing_entities() {
        let mut store = EntityStore::default();
        let touched = Transaction::new()
            .update::<Account>("missing-id", |a| a.clone())
            .apply(&mut store);
        assert!(touched.is_empty());
        assert!(store.accounts.is_empty());
    }

    #[test]
    fn merged_updaters_run_in_order() {
        let mut store = EntityStore::default();
        store.put(account("1", 0));
        let double = Transaction::new().update::<Account>("1", |a| Account {
            followers_count: a.followers_count * 2,
            ..a.clone()
        });
        let incr = Transaction::new().update::<Account>("1", |a| Account {
            followers_count: a.followers_count + 5,
            ..a.clone()
        });
        incr.merge(double).apply(&mut store);
        assert_eq!(store.get::<Account>("1").unwrap().followers_count, 10);
    }
}

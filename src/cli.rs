use std::collections::HashSet;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{self, eyre};
use tokio::sync::broadcast::error::RecvError;

use crate::api::types::{Account, Poll, StatusParams};
use crate::api::{AccountApi, MastodonClient, StatusApi};
use crate::auth::Session;
use crate::auth::credentials::load_credentials;
use crate::config::{AppConfig, load_config};
use crate::effects::{MutationCoordinator, MutationOutcome};
use crate::fetch::{FetchOutcome, ListFetcher, PageRequest};
use crate::poll::{poll_newer, poll_partial_timeline};
use crate::store::entity::{EntityKind, Status};
use crate::store::list::ListKey;
use crate::store::{CacheState, EntityCache};
use crate::thread::ThreadEntry;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "fedicache", about = "Cached CLI for Mastodon and Pleroma servers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand)]
pub enum CliCommand {
    /// Fetch your home timeline (JSONL)
    Home {
        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Follow the home timeline until interrupted (JSONL)
    Watch {
        /// Only refetch while the server reports the timeline as partial
        #[arg(long)]
        partial_only: bool,
    },
    /// Fetch a status with its ancestors and replies (JSONL)
    Thread {
        /// Status ID or URL
        id_or_url: String,
    },
    /// Favourite a status
    Favourite { id_or_url: String },
    /// Remove a favourite
    Unfavourite { id_or_url: String },
    /// Reblog a status
    Reblog { id_or_url: String },
    /// Undo a reblog
    Unreblog { id_or_url: String },
    /// Add an emoji reaction, replacing any previous one
    React { id_or_url: String, emoji: String },
    /// Remove an emoji reaction
    Unreact { id_or_url: String, emoji: String },
    /// Follow an account
    Follow { account_id: String },
    /// Unfollow an account
    Unfollow { account_id: String },
    /// Admin: tag an account as verified
    Verify { account_id: String },
    /// Admin: remove the verified tag
    Unverify { account_id: String },
    /// Admin: add an account to suggested follows
    Suggest { account_id: String },
    /// Admin: remove an account from suggested follows
    Unsuggest { account_id: String },
    /// Publish a status
    Post {
        text: String,
        /// Status ID or URL to reply to
        #[arg(long)]
        in_reply_to: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Denormalization helper
// ---------------------------------------------------------------------------

/// Reblogs and quotes are embedded this many levels deep.
const EMBED_DEPTH: usize = 2;

/// Build a self-contained JSON object for a cached status with its author,
/// poll, reblog and quote embedded. `None` if the status is not cached.
fn denormalize_status(state: &CacheState, id: &str) -> Option<serde_json::Value> {
    denormalize(state, id, EMBED_DEPTH)
}

fn denormalize(state: &CacheState, id: &str, depth: usize) -> Option<serde_json::Value> {
    let status = state.entities.get::<Status>(id)?;
    let account = state
        .entities
        .get::<Account>(&status.account_id)
        .map(|a| a.as_ref());
    let poll = status
        .poll_id
        .as_deref()
        .and_then(|poll_id| state.entities.get::<Poll>(poll_id))
        .map(|p| p.as_ref());
    let embed = |nested: &Option<String>| {
        if depth == 0 {
            return None;
        }
        nested
            .as_deref()
            .and_then(|nested| denormalize(state, nested, depth - 1))
    };

    Some(serde_json::json!({
        "status": status.as_ref(),
        "account": account,
        "poll": poll,
        "reblog": embed(&status.reblog_id),
        "quote": embed(&status.quote_id),
    }))
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

/// Print cached statuses as JSONL to stdout, skipping ids not in the cache.
fn print_statuses(cache: &EntityCache, ids: &[String]) -> eyre::Result<()> {
    let values: Vec<serde_json::Value> =
        cache.read(|state| ids.iter().filter_map(|id| denormalize_status(state, id)).collect());
    for value in values {
        println!("{}", serde_json::to_string(&value)?);
    }
    Ok(())
}

fn print_thread(cache: &EntityCache, entries: &[ThreadEntry]) -> eyre::Result<()> {
    let values: Vec<serde_json::Value> = cache.read(|state| {
        entries
            .iter()
            .filter_map(|entry| match entry {
                ThreadEntry::Status { id } => denormalize_status(state, id),
                ThreadEntry::Gap { .. } => serde_json::to_value(entry).ok(),
            })
            .collect()
    });
    for value in values {
        println!("{}", serde_json::to_string(&value)?);
    }
    Ok(())
}

/// Print the mutation result followed by the target's cached state.
fn report(
    outcome: MutationOutcome,
    cache: &EntityCache,
    kind: EntityKind,
    target: &str,
) -> eyre::Result<()> {
    let state = cache.read(|state| match kind {
        EntityKind::Statuses => denormalize_status(state, target),
        EntityKind::Accounts => state
            .entities
            .get::<Account>(target)
            .and_then(|a| serde_json::to_value(a.as_ref()).ok()),
        _ => None,
    });
    let result = match &outcome {
        MutationOutcome::Unauthenticated => "unauthenticated",
        MutationOutcome::NoOp => "noop",
        MutationOutcome::Committed => "committed",
        MutationOutcome::RolledBack(_) => "rolled_back",
    };
    let line = serde_json::json!({ "result": result, "target": target, "state": state });
    println!("{}", serde_json::to_string(&line)?);

    match outcome {
        MutationOutcome::Unauthenticated => {
            Err(eyre!("not signed in; set FEDI_ACCESS_TOKEN to an access token"))
        }
        MutationOutcome::RolledBack(e) => Err(eyre!("{e}")),
        MutationOutcome::NoOp | MutationOutcome::Committed => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Client construction
// ---------------------------------------------------------------------------

/// Build a `MastodonClient` from env credentials + config.
pub fn build_api_client() -> eyre::Result<(MastodonClient, AppConfig)> {
    let config = load_config();
    let creds = load_credentials(config.instance_url.as_deref())?;

    if !creds.has_token() {
        eprintln!("Hint: set FEDI_ACCESS_TOKEN to act as a signed-in user.");
    }

    let client = MastodonClient::from_credentials(&creds).map_err(|e| eyre!("{e}"))?;
    Ok((client, config))
}

/// Resolve the signed-in account, caching it. Anonymous without a token.
async fn sign_in(client: &MastodonClient, cache: &EntityCache) -> eyre::Result<Session> {
    if !client.has_token() {
        return Ok(Session::anonymous());
    }
    let me = client
        .verify_credentials()
        .await
        .map_err(|e| eyre!("{e}"))?;
    tracing::debug!(account = %me.acct, "signed in");
    let id = me.id.clone();
    cache.import_entities(vec![me], None);
    Ok(Session::authenticated(id))
}

// ---------------------------------------------------------------------------
// Command execution
// ---------------------------------------------------------------------------

/// Extract a status ID from either a raw ID or a status URL.
fn parse_status_id(id_or_url: &str) -> eyre::Result<String> {
    if id_or_url.starts_with("http://") || id_or_url.starts_with("https://") {
        let url = url::Url::parse(id_or_url).map_err(|e| eyre!("invalid URL: {e}"))?;
        // Mastodon: /@user/<id>; Pleroma: /notice/<id>; ActivityPub: /statuses/<id>
        let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
        let id = match segments.as_slice() {
            [user, id, ..] if user.starts_with('@') => Some(*id),
            [.., "notice" | "statuses", id] => Some(*id),
            _ => None,
        };
        match id {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(eyre!("could not extract status ID from URL: {id_or_url}")),
        }
    } else {
        Ok(id_or_url.to_string())
    }
}

fn fetched(outcome: FetchOutcome) -> eyre::Result<()> {
    match outcome {
        FetchOutcome::Failed(e) => Err(eyre!("{e}")),
        _ => Ok(()),
    }
}

/// Make sure the status is cached so optimistic effects have something to
/// act on.
async fn load_status(client: &MastodonClient, cache: &EntityCache, id: &str) -> eyre::Result<()> {
    let status = client.get_status(id).await.map_err(|e| eyre!("{e}"))?;
    cache.import_statuses(vec![status], None);
    Ok(())
}

async fn load_account(client: &MastodonClient, cache: &EntityCache, id: &str) -> eyre::Result<()> {
    let account = client.get_account(id).await.map_err(|e| eyre!("{e}"))?;
    cache.import_entities(vec![account], None);
    Ok(())
}

pub async fn run_command(cmd: CliCommand) -> eyre::Result<()> {
    let (client, config) = build_api_client()?;
    let cache = EntityCache::new();
    let session = sign_in(&client, &cache).await?;
    let api = Arc::new(client);
    let fetcher = ListFetcher::new(Arc::clone(&api), cache.clone(), &config);
    let coordinator = MutationCoordinator::new(Arc::clone(&api), cache.clone(), session);
    let key = ListKey::HomeTimeline;

    match cmd {
        CliCommand::Home { pages } => {
            fetched(fetcher.fetch_statuses(&key, PageRequest::First).await)?;
            for _ in 1..pages {
                match fetcher.fetch_statuses(&key, PageRequest::Next).await {
                    FetchOutcome::Exhausted => break,
                    outcome => fetched(outcome)?,
                }
            }
            print_statuses(&cache, &cache.select_list_ids(EntityKind::Statuses, &key))?;
        }

        CliCommand::Watch { partial_only } => {
            fetched(fetcher.fetch_statuses(&key, PageRequest::First).await)?;
            let initial = cache.select_list_ids(EntityKind::Statuses, &key);
            print_statuses(&cache, &initial)?;
            let mut printed: HashSet<String> = initial.into_iter().collect();

            let mut events = cache.subscribe();
            let fetcher = Arc::new(fetcher);
            let interval = config.poll_interval();
            let mut poller = if partial_only {
                poll_partial_timeline(Arc::clone(&fetcher), key.clone(), interval)
            } else {
                poll_newer(Arc::clone(&fetcher), key.clone(), interval)
            };

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = poller.finished() => break,
                    event = events.recv() => match event {
                        Ok(event) if event.touches_list(EntityKind::Statuses, &key) => {
                            let fresh: Vec<String> = cache
                                .select_list_ids(EntityKind::Statuses, &key)
                                .into_iter()
                                .filter(|id| !printed.contains(id))
                                .collect();
                            print_statuses(&cache, &fresh)?;
                            printed.extend(fresh);
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "cache events lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            poller.stop();
        }

        CliCommand::Thread { id_or_url } => {
            let status_id = parse_status_id(&id_or_url)?;
            let entries = fetcher
                .fetch_thread(&status_id)
                .await
                .map_err(|e| eyre!("{e}"))?;
            print_thread(&cache, &entries)?;
        }

        CliCommand::Favourite { id_or_url } => {
            let id = parse_status_id(&id_or_url)?;
            load_status(&api, &cache, &id).await?;
            let outcome = coordinator.favourite(&id, None).await;
            report(outcome, &cache, EntityKind::Statuses, &id)?;
        }

        CliCommand::Unfavourite { id_or_url } => {
            let id = parse_status_id(&id_or_url)?;
            load_status(&api, &cache, &id).await?;
            let outcome = coordinator.unfavourite(&id, None).await;
            report(outcome, &cache, EntityKind::Statuses, &id)?;
        }

        CliCommand::Reblog { id_or_url } => {
            let id = parse_status_id(&id_or_url)?;
            load_status(&api, &cache, &id).await?;
            let outcome = coordinator.reblog(&id, None).await;
            report(outcome, &cache, EntityKind::Statuses, &id)?;
        }

        CliCommand::Unreblog { id_or_url } => {
            let id = parse_status_id(&id_or_url)?;
            load_status(&api, &cache, &id).await?;
            let outcome = coordinator.unreblog(&id, None).await;
            report(outcome, &cache, EntityKind::Statuses, &id)?;
        }

        CliCommand::React { id_or_url, emoji } => {
            let id = parse_status_id(&id_or_url)?;
            load_status(&api, &cache, &id).await?;
            let outcome = coordinator.emoji_react(&id, &emoji, None).await;
            report(outcome, &cache, EntityKind::Statuses, &id)?;
        }

        CliCommand::Unreact { id_or_url, emoji } => {
            let id = parse_status_id(&id_or_url)?;
            load_status(&api, &cache, &id).await?;
            let outcome = coordinator.un_emoji_react(&id, &emoji, None).await;
            report(outcome, &cache, EntityKind::Statuses, &id)?;
        }

        CliCommand::Follow { account_id } => {
            load_account(&api, &cache, &account_id).await?;
            fetcher
                .fetch_relationships(std::slice::from_ref(&account_id))
                .await
                .map_err(|e| eyre!("{e}"))?;
            let outcome = coordinator.follow(&account_id, None).await;
            report(outcome, &cache, EntityKind::Accounts, &account_id)?;
        }

        CliCommand::Unfollow { account_id } => {
            load_account(&api, &cache, &account_id).await?;
            fetcher
                .fetch_relationships(std::slice::from_ref(&account_id))
                .await
                .map_err(|e| eyre!("{e}"))?;
            let outcome = coordinator.unfollow(&account_id, None).await;
            report(outcome, &cache, EntityKind::Accounts, &account_id)?;
        }

        CliCommand::Verify { account_id } => {
            load_account(&api, &cache, &account_id).await?;
            let outcome = coordinator.verify(&account_id, None).await;
            report(outcome, &cache, EntityKind::Accounts, &account_id)?;
        }

        CliCommand::Unverify { account_id } => {
            load_account(&api, &cache, &account_id).await?;
            let outcome = coordinator.unverify(&account_id, None).await;
            report(outcome, &cache, EntityKind::Accounts, &account_id)?;
        }

        CliCommand::Suggest { account_id } => {
            load_account(&api, &cache, &account_id).await?;
            let outcome = coordinator.suggest(&account_id, None).await;
            report(outcome, &cache, EntityKind::Accounts, &account_id)?;
        }

        CliCommand::Unsuggest { account_id } => {
            load_account(&api, &cache, &account_id).await?;
            let outcome = coordinator.unsuggest(&account_id, None).await;
            report(outcome, &cache, EntityKind::Accounts, &account_id)?;
        }

        CliCommand::Post { text, in_reply_to } => {
            let in_reply_to_id = in_reply_to.as_deref().map(parse_status_id).transpose()?;
            if let Some(parent) = &in_reply_to_id {
                load_status(&api, &cache, parent).await?;
            }
            let params = StatusParams {
                status: text,
                in_reply_to_id,
                ..Default::default()
            };
            let id = coordinator
                .create_status(params)
                .await
                .map_err(|e| eyre!("{e}"))?;
            print_statuses(&cache, &[id])?;
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

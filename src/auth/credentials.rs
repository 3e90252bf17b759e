use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to load .env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
    #[error("no instance configured; set FEDI_INSTANCE in env or .env")]
    NoInstance,
}

/// Where to connect and, optionally, as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub instance: String,
    pub access_token: Option<String>,
}

impl Credentials {
    pub fn has_token(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Return candidate .env paths in priority order.
fn env_file_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/fedicache/.env"));
    }
    paths.push(PathBuf::from(".env"));
    paths
}

/// Load credentials from `FEDI_INSTANCE` / `FEDI_ACCESS_TOKEN`, reading
/// .env files first. Variables already set in the environment win, since
/// dotenvy never overwrites them.
///
/// `fallback_instance` is used when `FEDI_INSTANCE` is unset.
pub fn load_credentials(fallback_instance: Option<&str>) -> Result<Credentials, CredentialError> {
    for path in env_file_paths() {
        if path.exists() {
            let _ = dotenvy::from_path(&path);
        }
    }

    let get = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

    let instance = get("FEDI_INSTANCE")
        .or_else(|| fallback_instance.map(str::to_owned))
        .filter(|v| !v.is_empty())
        .ok_or(CredentialError::NoInstance)?;

    Ok(Credentials {
        instance,
        access_token: get("FEDI_ACCESS_TOKEN"),
    })
}

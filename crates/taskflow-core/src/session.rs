use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::task::User;

pub const DEFAULT_TOKEN_KEY: &str = "token";
pub const DEFAULT_USER_KEY: &str = "user";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    SignedIn,
    SignedOut,
    /// Cleared by the gateway after the server rejected the token.
    Expired,
}

/// Where the application should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Tasks,
    Login,
}

/// Token and profile persisted between runs, as one JSON object whose keys
/// the caller chooses.
#[derive(Debug, Clone)]
pub struct SessionFile {
    pub path: PathBuf,
    token_key: String,
    user_key: String,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_keys(path, DEFAULT_TOKEN_KEY, DEFAULT_USER_KEY)
    }

    pub fn with_keys(
        path: impl Into<PathBuf>,
        token_key: impl Into<String>,
        user_key: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            token_key: token_key.into(),
            user_key: user_key.into(),
        }
    }

    #[tracing::instrument(skip(self), fields(file = %self.path.display()))]
    pub fn load(&self) -> anyhow::Result<Option<(String, User)>> {
        if !self.path.exists() {
            debug!("no session file");
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed reading {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(None);
        }

        let mut object: Map<String, Value> = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.path.display()))?;

        let token = match object.remove(&self.token_key) {
            Some(Value::String(token)) if !token.is_empty() => token,
            _ => return Ok(None),
        };
        let user = match object.remove(&self.user_key) {
            Some(value) => serde_json::from_value(value)
                .with_context(|| format!("invalid `{}` entry in session file", self.user_key))?,
            None => User::default(),
        };

        Ok(Some((token, user)))
    }

    #[tracing::instrument(skip(self, token, user), fields(file = %self.path.display()))]
    pub fn save(&self, token: &str, user: &User) -> anyhow::Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let mut object = Map::new();
        object.insert(self.token_key.clone(), Value::String(token.to_string()));
        object.insert(self.user_key.clone(), serde_json::to_value(user)?);

        let mut temp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut temp, &Value::Object(object))?;
        writeln!(temp)?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.path.display(), err))?;

        debug!("saved session file");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(file = %self.path.display()))]
    pub fn remove(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed removing {}", self.path.display()))
            }
        }
    }
}

#[derive(Debug, Default)]
struct SignedInState {
    token: Option<String>,
    user: Option<User>,
}

/// The authentication context shared by the gateway and the application.
///
/// Cloning is cheap; every clone observes the same token.
#[derive(Clone)]
pub struct Session {
    state: Arc<RwLock<SignedInState>>,
    events: Arc<watch::Sender<AuthState>>,
    file: Option<Arc<SessionFile>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("file", &self.file.as_ref().map(|file| file.path.clone()))
            .finish()
    }
}

impl Session {
    /// An in-memory session with nothing persisted.
    pub fn new() -> Self {
        let (events, _) = watch::channel(AuthState::SignedOut);
        Self {
            state: Arc::new(RwLock::new(SignedInState::default())),
            events: Arc::new(events),
            file: None,
        }
    }

    /// Reads whatever a previous run left in `file` and writes every later
    /// change back to it.
    #[tracing::instrument(skip(file), fields(file = %file.path.display()))]
    pub fn restore(file: SessionFile) -> Result<Self, SyncError> {
        let mut session = Self::new();
        let stored = file.load().map_err(|err| SyncError::Session(format!("{err:#}")))?;
        if let Some((token, user)) = stored {
            info!(email = %user.email, "restored saved session");
            *session.state.write() = SignedInState {
                token: Some(token),
                user: Some(user),
            };
            session.events.send_replace(AuthState::SignedIn);
        }
        session.file = Some(Arc::new(file));
        Ok(session)
    }

    pub fn get(&self) -> Option<String> {
        self.state.read().token.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state.read().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().token.is_some()
    }

    pub fn initial_route(&self) -> Route {
        if self.is_authenticated() {
            Route::Tasks
        } else {
            Route::Login
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.events.subscribe()
    }

    #[tracing::instrument(skip(self, token, user), fields(email = %user.email))]
    pub fn set(&self, token: String, user: User) -> Result<(), SyncError> {
        if let Some(file) = &self.file {
            file.save(&token, &user)
                .map_err(|err| SyncError::Session(format!("{err:#}")))?;
        }
        *self.state.write() = SignedInState {
            token: Some(token),
            user: Some(user),
        };
        self.events.send_replace(AuthState::SignedIn);
        info!("session established");
        Ok(())
    }

    /// Explicit logout.
    #[tracing::instrument(skip(self))]
    pub fn clear(&self) -> Result<(), SyncError> {
        *self.state.write() = SignedInState::default();
        self.events.send_replace(AuthState::SignedOut);
        if let Some(file) = &self.file {
            file.remove()
                .map_err(|err| SyncError::Session(format!("{err:#}")))?;
        }
        info!("session cleared");
        Ok(())
    }

    /// Forced invalidation after the server rejected the token. Subscribers
    /// see [`AuthState::Expired`] and are expected to route to login.
    #[tracing::instrument(skip(self))]
    pub fn invalidate(&self) {
        *self.state.write() = SignedInState::default();
        self.events.send_replace(AuthState::Expired);
        if let Some(file) = &self.file
            && let Err(err) = file.remove()
        {
            warn!(error = %format!("{err:#}"), "could not remove saved session after expiry");
        }
        warn!("session invalidated by server");
    }
}

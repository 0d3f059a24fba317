use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::gateway::DEFAULT_API_URL;
use crate::lifecycle::Timings;
use crate::session::{
  DEFAULT_TOKEN_KEY,
  DEFAULT_USER_KEY,
  SessionFile
};

pub const RC_ENV: &str = "TASKFLOWRC";
pub const SESSION_FILE_NAME: &str =
  "session.json";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("api.url", DEFAULT_API_URL),
      ("data.location", "~/.taskflow"),
      ("ui.success_hold_ms", "2000"),
      ("ui.reset_delay_ms", "300"),
      (
        "session.token_key",
        DEFAULT_TOKEN_KEY
      ),
      (
        "session.user_key",
        DEFAULT_USER_KEY
      ),
      ("color", "on")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading taskflowrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no taskflowrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };
    parse_bool(raw).map(Some).ok_or_else(
      || {
        anyhow!(
          "config key {key} expects \
           on/off, got {raw:?}"
        )
      }
    )
  }

  /// A present but unparsable value is an
  /// error, not a silent default.
  pub fn get_u64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u64>> {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
      return Ok(None);
    }
    raw
      .parse::<u64>()
      .map(Some)
      .with_context(|| {
        format!(
          "config key {key} expects a \
           non-negative integer, got \
           {raw:?}"
        )
      })
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  pub fn api_url(&self) -> String {
    self
      .get("api.url")
      .filter(|url| !url.trim().is_empty())
      .unwrap_or_else(|| {
        DEFAULT_API_URL.to_string()
      })
  }

  /// `None` when unset or zero.
  pub fn http_timeout(
    &self
  ) -> anyhow::Result<Option<Duration>> {
    Ok(
      self
        .get_u64("http.timeout")?
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
    )
  }

  pub fn timings(
    &self
  ) -> anyhow::Result<Timings> {
    let defaults = Timings::default();
    Ok(Timings {
      success_hold: self
        .get_u64("ui.success_hold_ms")?
        .map(Duration::from_millis)
        .unwrap_or(defaults.success_hold),
      reset_delay:  self
        .get_u64("ui.reset_delay_ms")?
        .map(Duration::from_millis)
        .unwrap_or(defaults.reset_delay)
    })
  }

  pub fn session_file(
    &self,
    data_dir: &Path
  ) -> SessionFile {
    SessionFile::with_keys(
      data_dir.join(SESSION_FILE_NAME),
      self
        .get("session.token_key")
        .unwrap_or_else(|| {
          DEFAULT_TOKEN_KEY.to_string()
        }),
      self
        .get("session.user_key")
        .unwrap_or_else(|| {
          DEFAULT_USER_KEY.to_string()
        })
    )
  }

  /// Reads one rc file. Each included file is read at
  /// most once, so include cycles end quietly.
  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    if self.loaded_files.contains(&path) {
      warn!(file = %path.display(), "rc file already loaded; skipping");
      return Ok(());
    }
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default();

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let line = strip_comment(raw_line);
      if line.is_empty() {
        continue;
      }

      if let Some(target) =
        line.strip_prefix("include ")
      {
        let target = target.trim();
        if target.is_empty() {
          return Err(anyhow!(
            "{}:{}: include needs a path",
            path.display(),
            idx + 1
          ));
        }
        let include =
          base_dir.join(expand_tilde(
            Path::new(target)
          ));
        if include.exists() {
          self.load_file(&include)?;
        } else {
          warn!(include = %include.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (key, value) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "{}:{}: expected key=value, \
             got {raw_line:?}",
            path.display(),
            idx + 1
          )
        })?;
      let key = key.trim();
      trace!(key, "loaded config key");
      self.map.insert(
        key.to_string(),
        value.trim().to_string()
      );
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) = std::env::var(RC_ENV)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    return Ok(None);
  };
  let candidate =
    home.join(".taskflowrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".taskflow"))
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

/// A `#` opens a comment at the start of a line or
/// after whitespace; `#` inside a value such as a URL
/// fragment is kept.
fn strip_comment(line: &str) -> &str {
  let mut prev_blank = true;
  for (idx, ch) in line.char_indices() {
    if ch == '#' && prev_blank {
      return line[..idx].trim();
    }
    prev_blank = ch.is_whitespace();
  }
  line.trim()
}

fn parse_bool(
  raw: &str
) -> Option<bool> {
  match raw
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

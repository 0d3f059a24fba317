pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod render;
pub mod session;
pub mod store;
pub mod task;
pub mod transport;
pub mod validate;
pub mod view;

use std::ffi::OsString;

use anyhow::{
  Context,
  anyhow
};
use clap::Parser;
use tracing::{
  debug,
  info,
  warn
};

pub use error::SyncError;
pub use gateway::Gateway;
pub use session::{
  AuthState,
  Route,
  Session,
  SessionFile
};
pub use store::EntityStore;
pub use transport::{
  HttpTransport,
  Transport
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting taskflow CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.taskflowrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let session_file =
    cfg.session_file(&data_dir);
  let session =
    Session::restore(session_file)
      .with_context(|| {
        format!(
          "failed to restore session \
           from {}",
          data_dir.display()
        )
      })?;
  let auth_events = session.subscribe();

  let command = cli.command.unwrap_or(
    cli::Command::List(
      cli::ListArgs::default()
    )
  );
  if session.initial_route()
    == Route::Login
    && !command.is_anonymous()
  {
    return Err(anyhow!(
      "not signed in; run `taskflow \
       login <email>` first"
    ));
  }

  let transport = HttpTransport::new(
    cfg.http_timeout()?
  )?;
  let gateway = Gateway::new(
    transport,
    session,
    &cfg.api_url()
  );
  let store = EntityStore::new(gateway);
  let renderer =
    render::Renderer::new(&cfg)?;
  let mut app = commands::App::new(
    store,
    cfg.timings()?,
    renderer
  );

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_time()
      .enable_io()
      .build()
      .context(
        "failed to start async runtime"
      )?;
  let result = runtime.block_on(
    commands::dispatch(&mut app, command)
  );

  if *auth_events.borrow()
    == AuthState::Expired
  {
    warn!(
      "server rejected the saved \
       session; it has been removed"
    );
  }

  result?;
  info!("done");
  Ok(())
}

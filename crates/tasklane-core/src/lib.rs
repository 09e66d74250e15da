pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod gesture;
pub mod ordering;
pub mod preferences;
pub mod render;
pub mod session;
pub mod storage;
pub mod todos;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tasklane CLI"
  );

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  );
  if let Some(url) = cli.api_url {
    cfg.apply_overrides([(
      "api.url".to_string(),
      url
    )]);
  }
  debug!(files = ?cfg.loaded_files, "configuration loaded");

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store = Arc::new(
    storage::FileStore::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open state store \
           at {}",
          data_dir.display()
        )
      })?
  );

  let command = cli.command.unwrap_or(
    cli::Command::List {
      status: None,
      page:   1
    }
  );

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  runtime.block_on(async {
    let mut app =
      commands::App::new(&cfg, store)?;
    app.dispatch(command).await
  })?;

  info!("done");
  Ok(())
}

pub mod appointment;
pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod patient;
pub mod render;
pub mod summary;

use std::ffi::OsString;

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
    "starting frontdesk CLI"
  );

  let mut cfg = config::Config::load(
    cli.frontdeskrc.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
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

  let store =
    datastore::DataStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let settings = cfg.calendar_settings();
  debug!(?settings, "calendar settings");

  let renderer = render::Renderer::new(
    &cfg,
    settings.timezone
  )?;

  commands::dispatch(
    &store,
    &renderer,
    settings,
    cli.command
  )?;

  info!("done");
  Ok(())
}

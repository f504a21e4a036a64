//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled                                         |
//! |----------|----------------------------------------------------------|
//! | `board`  | `Board`, `Watch`                                         |
//! | `cell`   | `Cycle`, `Notes`                                         |
//! | `cage`   | `Configs`, `Toggle`, `Split`, `Combine`, `Seed`, `InitCage` |
//! | `config` | `Config`                                                 |
//! | `setup`  | `SetupSql`                                               |

pub mod board;
pub mod cage;
pub mod cell;
pub mod config;
pub mod setup;

pub use board::{cmd_board, cmd_watch};
pub use cage::{Reshape, cmd_configs, cmd_init_cage, cmd_reshape, cmd_seed};
pub use cell::{cmd_cycle, cmd_notes};
pub use config::cmd_config;
pub use setup::cmd_setup_sql;

use anyhow::{Context, Result};
use kennel::config::KennelToml;
use kennel::dashboard::Dashboard;
use kennel::store;
use kennel::ui::render_load_error;

use crate::Cli;

/// Resolve `kennel.toml` plus environment overrides, logging any warnings.
pub fn load_config(cli: &Cli) -> Result<KennelToml> {
    let config = KennelToml::resolve(cli.config.as_deref())?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    Ok(config)
}

/// Open the configured store and load the board. A failed load prints the
/// matching error screen before returning the error.
pub async fn open_dashboard(cli: &Cli) -> Result<(KennelToml, Dashboard)> {
    let config = load_config(cli)?;
    let store = store::open(&config)?;
    let dashboard = Dashboard::new(store, config.dashboard.notes_quiescence());

    if let Err(err) = dashboard.load().await {
        print!("{}", render_load_error(&err));
        return Err(err).context("Failed to load the board");
    }
    Ok((config, dashboard))
}

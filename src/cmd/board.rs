//! `kennel board` and `kennel watch`.

use anyhow::{Context, Result};
use console::Term;
use kennel::store;
use kennel::ui::board::render_change;
use kennel::ui::render_board;

use super::{load_config, open_dashboard};
use crate::Cli;

pub async fn cmd_board(cli: &Cli, watch: bool) -> Result<()> {
    let (_, dashboard) = open_dashboard(cli).await?;

    if !watch {
        print!("{}", render_board(&dashboard.snapshot()));
        return Ok(());
    }

    // Keep showing the board offline if the feed cannot be joined.
    let feed = match dashboard.connect().await {
        Ok(feed) => Some(feed),
        Err(e) => {
            tracing::warn!("live updates unavailable: {}", e);
            None
        }
    };

    let term = Term::stdout();
    let mut updates = dashboard.watch();
    term.clear_screen().ok();
    print!("{}", render_board(&updates.borrow_and_update().clone()));
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                if state.loading {
                    continue;
                }
                term.clear_screen().ok();
                print!("{}", render_board(&state));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    if let Some(feed) = feed {
        feed.close().await;
    }
    Ok(())
}

/// Print change notifications as they arrive until Ctrl-C or the feed ends.
pub async fn cmd_watch(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let store = store::open(&config)?;
    let mut subscription = store
        .subscribe()
        .await
        .context("Failed to subscribe to cell changes")?;
    println!("Watching for changes (Ctrl-C to stop)...");

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => println!("{}", render_change(&event)),
                None => {
                    println!("Change feed closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    subscription.unsubscribe().await;
    Ok(())
}

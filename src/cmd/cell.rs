//! Per-cell commands: `kennel cycle` and `kennel notes`.

use anyhow::{Context, Result};
use kennel::ui::board::render_cell;

use super::open_dashboard;
use crate::Cli;

pub async fn cmd_cycle(cli: &Cli, id: i64) -> Result<()> {
    let (_, dashboard) = open_dashboard(cli).await?;
    let row = dashboard
        .cycle_state(id)
        .await
        .with_context(|| format!("Failed to update cell {}", id))?;
    println!("Cage {}", row.cage_num);
    println!("{}", render_cell(&row));
    Ok(())
}

/// Write notes through the editor's blur path. No words clears the notes.
pub async fn cmd_notes(cli: &Cli, id: i64, words: &[String]) -> Result<()> {
    let (_, dashboard) = open_dashboard(cli).await?;
    if dashboard.snapshot().cell(id).is_none() {
        anyhow::bail!("Cell {} not found", id);
    }

    dashboard.edit_notes(id, &words.join(" "));
    let row = dashboard
        .blur_notes(id)
        .await
        .with_context(|| format!("Failed to save notes for cell {}", id))?;

    if let Some(row) = row {
        println!("{}", render_cell(&row));
    }
    println!("Notes saved ({})", dashboard.notes_counter(id));
    Ok(())
}

//! Cage configuration commands.

use anyhow::{Context, Result};
use console::style;
use kennel::reconcile::{CageReconciler, ReconcileOutcome};
use kennel::store;
use kennel::ui::board::render_cell;
use kennel::ui::icons::CHECK;
use kennel::ui::{SavingSpinner, render_config_panel};

use super::{load_config, open_dashboard};
use crate::Cli;

/// Which shape a reshape command asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reshape {
    Toggle,
    Split,
    Combine,
}

fn describe(outcome: ReconcileOutcome) -> String {
    match outcome {
        ReconcileOutcome::SplitFromCombined => "split the combined cell into Inner and Outer".into(),
        ReconcileOutcome::CreatedMissing(1) => "created 1 missing cell".into(),
        ReconcileOutcome::CreatedMissing(n) => format!("created {} missing cells", n),
        ReconcileOutcome::Combined => "merged Inner and Outer into one cell".into(),
        ReconcileOutcome::Unchanged => "cells already matched".into(),
    }
}

pub async fn cmd_configs(cli: &Cli) -> Result<()> {
    let (_, dashboard) = open_dashboard(cli).await?;
    let state = dashboard.snapshot();
    print!("{}", render_config_panel(&state.configurations, state.saving_cage));
    Ok(())
}

pub async fn cmd_reshape(cli: &Cli, cage_num: i32, reshape: Reshape) -> Result<()> {
    let (_, dashboard) = open_dashboard(cli).await?;
    let reconciler = CageReconciler::new(dashboard.store().clone());

    let combining = match reshape {
        Reshape::Toggle => dashboard.snapshot().is_split(cage_num),
        Reshape::Split => false,
        Reshape::Combine => true,
    };
    if combining && !cli.yes {
        use dialoguer::Confirm;

        let confirm = Confirm::new()
            .with_prompt(format!(
                "Combine cage {}? Inner and Outer notes will be merged into one",
                cage_num
            ))
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirm {
            println!("Cancelled");
            return Ok(());
        }
    }

    let spinner = SavingSpinner::start(cage_num);
    let result = match reshape {
        Reshape::Toggle => dashboard
            .toggle_cage(&reconciler, cage_num)
            .await
            .map(|(_, outcome)| outcome),
        Reshape::Split => reconciler.set_split(cage_num, true).await,
        Reshape::Combine => reconciler.set_split(cage_num, false).await,
    };

    spinner.finish();

    let outcome = result.with_context(|| format!("Failed to reconcile cage {}", cage_num))?;
    let shape = if combining { "combined" } else { "split" };
    println!(
        "{}Cage {} is {}: {}",
        CHECK,
        cage_num,
        style(shape).bold(),
        describe(outcome)
    );
    Ok(())
}

pub async fn cmd_seed(cli: &Cli, count: Option<i32>) -> Result<()> {
    let config = load_config(cli)?;
    let count = count.unwrap_or(config.dashboard.default_cage_count);
    if count < 1 {
        anyhow::bail!("--count must be positive, got {}", count);
    }

    let reconciler = CageReconciler::new(store::open(&config)?);
    let seeded = reconciler
        .seed_default_configurations(count)
        .await
        .context("Failed to seed cage configurations")?;
    println!("Seeded {} cage configurations (all split)", seeded);
    Ok(())
}

pub async fn cmd_init_cage(cli: &Cli, cage_num: i32) -> Result<()> {
    if cage_num < 1 {
        anyhow::bail!("Cage number must be positive, got {}", cage_num);
    }
    let config = load_config(cli)?;
    let reconciler = CageReconciler::new(store::open(&config)?);
    let cells = reconciler
        .initialize_cage(cage_num)
        .await
        .with_context(|| format!("Failed to initialize cage {}", cage_num))?;

    println!("Cage {}", cage_num);
    for cell in &cells {
        println!("{}", render_cell(cell));
    }
    Ok(())
}

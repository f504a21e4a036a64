//! Text rendering for the board, the configuration panel and load errors.
//!
//! Every function returns a `String` so commands decide where it goes and
//! tests can inspect it.

use std::fmt::Write as _;

use console::style;
use kennel_common::{CageConfiguration, CellRecord, ChangeEvent, WalkState};

use crate::dashboard::{BoardStats, DashboardState};
use crate::errors::LoadError;
use crate::ui::icons::{self, CROSS, DOG, LIVE, NOTE, OFFLINE, WRENCH};

pub const TITLE: &str = "Kennel Care Tracker";

const SETUP_STEPS: &[&str] = &[
    "Open your Supabase project dashboard",
    "Go to the SQL Editor",
    "Paste the output of `kennel setup-sql`",
    "Run the script",
    "Run `kennel board` again",
];

pub fn render_header(live: bool) -> String {
    let indicator = if live {
        format!("{}{}", LIVE, style("Live").green())
    } else {
        format!("{}{}", OFFLINE, style("Offline").dim())
    };
    let mut out = String::new();
    let _ = writeln!(out, "{}{}  {}", DOG, style(TITLE).bold(), indicator);
    let _ = writeln!(
        out,
        "{}",
        style("Cycle a cell with `kennel cycle <id>`: Not yet → Walked → Do not walk").dim()
    );
    out
}

fn styled_state(state: WalkState) -> String {
    let label = match state {
        WalkState::NotYet => style(state.label()).yellow(),
        WalkState::Walked => style(state.label()).green(),
        WalkState::DoNotWalk => style(state.label()).red(),
    };
    format!("{}{}", icons::state_icon(state), label)
}

/// One card line: id, side, state and notes preview.
pub fn render_cell(cell: &CellRecord) -> String {
    let mut line = format!(
        "  #{:<5} {:<6} {}",
        cell.id,
        cell.cell_side.as_str(),
        styled_state(cell.state)
    );
    if let Some(notes) = cell.notes.as_deref() {
        let _ = write!(line, "  {}{}", NOTE, style(notes).italic());
    }
    line
}

pub fn render_footer(stats: &BoardStats) -> String {
    format!(
        "Total: {} cells | Walked: {} | Pending: {} | Skip: {}",
        stats.total, stats.walked, stats.pending, stats.skipped
    )
}

pub fn render_board(state: &DashboardState) -> String {
    let mut out = render_header(state.live);
    out.push('\n');

    let groups = state.groups();
    if groups.is_empty() {
        let _ = writeln!(
            out,
            "No cells yet. Create one with `kennel init-cage <cage>`."
        );
    }
    for group in groups {
        let _ = writeln!(out, "{}", style(format!("Cage {}", group.cage_num)).bold());
        for cell in group.cells {
            let _ = writeln!(out, "{}", render_cell(cell));
        }
    }

    out.push('\n');
    let _ = writeln!(out, "{}", render_footer(&state.stats()));
    out
}

pub fn render_config_panel(
    configurations: &[CageConfiguration],
    saving_cage: Option<i32>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", style("Cage Configuration").bold());
    let _ = writeln!(
        out,
        "{}",
        style("Configure which cages are split (Inner/Outer) or combined (single cell)").dim()
    );
    out.push('\n');

    for config in configurations {
        let (badge, description) = if config.is_split {
            (style("Split").blue(), "Has Inner and Outer cells")
        } else {
            (style("Combined").green(), "Single combined cell")
        };
        let _ = write!(
            out,
            "  Cage {:<4} {:<10} {}",
            config.cage_num, badge, description
        );
        if saving_cage == Some(config.cage_num) {
            let _ = write!(out, "  {}", style("Updating...").cyan());
        }
        out.push('\n');
    }

    let split = configurations.iter().filter(|c| c.is_split).count();
    out.push('\n');
    let _ = writeln!(
        out,
        "Split: {} | Combined: {}",
        split,
        configurations.len() - split
    );
    out
}

/// Full-screen error for a failed load: setup guidance for a missing
/// schema, otherwise the message and how to retry.
pub fn render_load_error(err: &LoadError) -> String {
    let mut out = String::new();
    match err {
        LoadError::SetupRequired { .. } => {
            let _ = writeln!(out, "{}{}", WRENCH, style("Database Setup Required").bold());
            let _ = writeln!(
                out,
                "Database table not found. Please run the setup SQL script in your Supabase dashboard."
            );
            out.push('\n');
            for (i, step) in SETUP_STEPS.iter().enumerate() {
                let _ = writeln!(out, "  {}. {}", i + 1, step);
            }
        }
        LoadError::NotConfigured { source } => {
            let _ = writeln!(out, "{}{}", CROSS, style("Store not configured").bold());
            let _ = writeln!(out, "{}", source);
            let _ = writeln!(
                out,
                "Set SUPABASE_URL and SUPABASE_ANON_KEY (or KENNEL_STORE=sqlite) and try again."
            );
        }
        LoadError::Connection { source } => {
            let _ = writeln!(out, "{}{}", CROSS, style("Connection Error").bold());
            let _ = writeln!(
                out,
                "Failed to load cages. Please check your database connection."
            );
            let _ = writeln!(out, "{}", style(source).dim());
            let _ = writeln!(out, "Retry with `kennel board`.");
        }
    }
    out
}

/// One line per change notification, for `kennel watch`.
pub fn render_change(event: &ChangeEvent) -> String {
    match event {
        ChangeEvent::Insert(cell) => format!(
            "INSERT cage {} {} #{} {}",
            cell.cage_num,
            cell.cell_side,
            cell.id,
            cell.state.label()
        ),
        ChangeEvent::Update { new, .. } => format!(
            "UPDATE cage {} {} #{} {}",
            new.cage_num,
            new.cell_side,
            new.id,
            new.state.label()
        ),
        ChangeEvent::Delete(key) => format!("DELETE #{}", key.id),
        ChangeEvent::Other { kind } => format!("{} (resync)", kind),
    }
}

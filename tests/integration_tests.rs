//! Integration tests for the kennel CLI
//!
//! These run the binary against a local SQLite store in a temporary
//! directory, so no hosted store is needed.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const STORE_VARS: &[&str] = &[
    "KENNEL_STORE",
    "KENNEL_DB_PATH",
    "SUPABASE_URL",
    "SUPABASE_ANON_KEY",
    "RUST_LOG",
];

/// Helper to create a kennel Command with no store settings inherited
fn kennel(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("kennel");
    cmd.current_dir(dir.path());
    for var in STORE_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// Helper to create a kennel Command backed by a SQLite file in `dir`
fn kennel_local(dir: &TempDir) -> Command {
    let mut cmd = kennel(dir);
    cmd.env("KENNEL_STORE", "sqlite")
        .env("KENNEL_DB_PATH", dir.path().join("kennel.db"));
    cmd
}

/// Helper to seed configurations and create the first cage
fn seed_first_cage(dir: &TempDir) {
    kennel_local(dir).arg("seed").assert().success();
    kennel_local(dir)
        .args(["init-cage", "1"])
        .assert()
        .success();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_kennel_help() {
        let dir = TempDir::new().unwrap();
        kennel(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("combine"));
    }

    #[test]
    fn test_kennel_version() {
        let dir = TempDir::new().unwrap();
        kennel(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_setup_sql_creates_both_tables() {
        let dir = TempDir::new().unwrap();
        kennel(&dir)
            .arg("setup-sql")
            .assert()
            .success()
            .stdout(predicate::str::contains("create table if not exists public.cells"))
            .stdout(predicate::str::contains(
                "create table if not exists public.cage_configurations",
            ))
            .stdout(predicate::str::contains("supabase_realtime"));
    }

    #[test]
    fn test_unconfigured_board_shows_error_screen() {
        let dir = TempDir::new().unwrap();
        kennel(&dir)
            .arg("board")
            .assert()
            .failure()
            .stdout(predicate::str::contains("Store not configured"))
            .stdout(predicate::str::contains("SUPABASE_URL"));
    }

    #[test]
    fn test_unconfigured_seed_fails() {
        let dir = TempDir::new().unwrap();
        kennel(&dir)
            .arg("seed")
            .assert()
            .failure()
            .stderr(predicate::str::contains("not configured"));
    }
}

// =============================================================================
// Configuration Tests
// =============================================================================

mod config_tests {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = TempDir::new().unwrap();
        kennel(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("defaults"))
            .stdout(predicate::str::contains("backend = \"supabase\""));
    }

    #[test]
    fn test_config_validate_warns_about_missing_credentials() {
        let dir = TempDir::new().unwrap();
        kennel(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("SUPABASE_URL is not set"));
    }

    #[test]
    fn test_config_file_selects_sqlite() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("kennel.toml"),
            "[store]\nbackend = \"sqlite\"\ndb_path = \"data/kennel.db\"\n",
        )
        .unwrap();

        kennel(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid"));

        kennel(&dir).args(["init-cage", "3"]).assert().success();
        assert!(dir.path().join("data/kennel.db").exists());
    }

    #[test]
    fn test_config_show_masks_key() {
        let dir = TempDir::new().unwrap();
        kennel(&dir)
            .env("SUPABASE_URL", "https://example.supabase.co")
            .env("SUPABASE_ANON_KEY", "super-secret")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("https://example.supabase.co"))
            .stdout(predicate::str::contains("super-secret").not());
    }

    #[test]
    fn test_explicit_config_path_must_exist() {
        let dir = TempDir::new().unwrap();
        kennel(&dir)
            .args(["--config", "missing.toml", "config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read config file"));
    }
}

// =============================================================================
// Board and Cell Tests
// =============================================================================

mod board_tests {
    use super::*;

    #[test]
    fn test_empty_board() {
        let dir = TempDir::new().unwrap();
        kennel_local(&dir)
            .arg("board")
            .assert()
            .success()
            .stdout(predicate::str::contains("Kennel Care Tracker"))
            .stdout(predicate::str::contains("No cells yet"))
            .stdout(predicate::str::contains("Total: 0 cells"));
    }

    #[test]
    fn test_init_cage_shows_on_board() {
        let dir = TempDir::new().unwrap();
        seed_first_cage(&dir);

        kennel_local(&dir)
            .arg("board")
            .assert()
            .success()
            .stdout(predicate::str::contains("Cage 1"))
            .stdout(predicate::str::contains("Inner"))
            .stdout(predicate::str::contains("Outer"))
            .stdout(predicate::str::contains(
                "Total: 2 cells | Walked: 0 | Pending: 2 | Skip: 0",
            ));
    }

    #[test]
    fn test_init_cage_twice_keeps_two_cells() {
        let dir = TempDir::new().unwrap();
        seed_first_cage(&dir);
        kennel_local(&dir)
            .args(["init-cage", "1"])
            .assert()
            .success();

        kennel_local(&dir)
            .arg("board")
            .assert()
            .success()
            .stdout(predicate::str::contains("Total: 2 cells"));
    }

    #[test]
    fn test_cycle_advances_state() {
        let dir = TempDir::new().unwrap();
        seed_first_cage(&dir);

        kennel_local(&dir)
            .args(["cycle", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Walked"));
        kennel_local(&dir)
            .args(["cycle", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Do not walk"));

        kennel_local(&dir)
            .arg("board")
            .assert()
            .success()
            .stdout(predicate::str::contains("Skip: 1"));
    }

    #[test]
    fn test_cycle_unknown_cell_fails() {
        let dir = TempDir::new().unwrap();
        seed_first_cage(&dir);

        kennel_local(&dir)
            .args(["cycle", "99"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Cell 99 not found"));
    }

    #[test]
    fn test_notes_saved_and_cleared() {
        let dir = TempDir::new().unwrap();
        seed_first_cage(&dir);

        kennel_local(&dir)
            .args(["notes", "2", "needs", "water"])
            .assert()
            .success()
            .stdout(predicate::str::contains("needs water"))
            .stdout(predicate::str::contains("Notes saved (11/500)"));

        kennel_local(&dir)
            .arg("board")
            .assert()
            .success()
            .stdout(predicate::str::contains("needs water"));

        kennel_local(&dir)
            .args(["notes", "2"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Notes saved (0/500)"));
    }
}

// =============================================================================
// Cage Configuration Tests
// =============================================================================

mod cage_tests {
    use super::*;

    #[test]
    fn test_seed_default_count() {
        let dir = TempDir::new().unwrap();
        kennel_local(&dir)
            .arg("seed")
            .assert()
            .success()
            .stdout(predicate::str::contains("Seeded 21 cage configurations"));

        kennel_local(&dir)
            .arg("configs")
            .assert()
            .success()
            .stdout(predicate::str::contains("Split: 21 | Combined: 0"));
    }

    #[test]
    fn test_seed_custom_count() {
        let dir = TempDir::new().unwrap();
        kennel_local(&dir)
            .args(["seed", "--count", "4"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Seeded 4 cage configurations"));
    }

    #[test]
    fn test_combine_merges_cells() {
        let dir = TempDir::new().unwrap();
        seed_first_cage(&dir);
        kennel_local(&dir).args(["cycle", "1"]).assert().success();
        kennel_local(&dir)
            .args(["notes", "1", "a"])
            .assert()
            .success();
        kennel_local(&dir)
            .args(["notes", "2", "b"])
            .assert()
            .success();

        kennel_local(&dir)
            .args(["--yes", "combine", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cage 1 is"))
            .stdout(predicate::str::contains("merged Inner and Outer"));

        kennel_local(&dir)
            .arg("board")
            .assert()
            .success()
            .stdout(predicate::str::contains("Both"))
            .stdout(predicate::str::contains("a; b"))
            .stdout(predicate::str::contains(
                "Total: 1 cells | Walked: 1 | Pending: 0 | Skip: 0",
            ));

        kennel_local(&dir)
            .arg("configs")
            .assert()
            .success()
            .stdout(predicate::str::contains("Single combined cell"))
            .stdout(predicate::str::contains("Split: 20 | Combined: 1"));
    }

    #[test]
    fn test_toggle_round_trip() {
        let dir = TempDir::new().unwrap();
        seed_first_cage(&dir);

        kennel_local(&dir)
            .args(["--yes", "toggle", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("merged Inner and Outer"));
        kennel_local(&dir)
            .args(["toggle", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("split the combined cell"));

        kennel_local(&dir)
            .arg("board")
            .assert()
            .success()
            .stdout(predicate::str::contains("Inner"))
            .stdout(predicate::str::contains("Total: 2 cells"));
    }

    #[test]
    fn test_split_empty_cage_creates_cells() {
        let dir = TempDir::new().unwrap();
        kennel_local(&dir)
            .args(["split", "5"])
            .assert()
            .success()
            .stdout(predicate::str::contains("created 2 missing cells"));

        kennel_local(&dir)
            .arg("board")
            .assert()
            .success()
            .stdout(predicate::str::contains("Cage 5"));
    }

    #[test]
    fn test_combine_empty_cage_creates_nothing() {
        let dir = TempDir::new().unwrap();
        kennel_local(&dir)
            .args(["--yes", "combine", "6"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cells already matched"));

        kennel_local(&dir)
            .arg("board")
            .assert()
            .success()
            .stdout(predicate::str::contains("Total: 0 cells"));
    }

    #[test]
    fn test_init_cage_rejects_zero() {
        let dir = TempDir::new().unwrap();
        kennel_local(&dir)
            .args(["init-cage", "0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("must be positive"));
    }
}

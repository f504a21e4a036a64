//! Shared terminal icons.
//!
//! Each icon falls back to plain ASCII when the terminal cannot show emoji.

use console::Emoji;

use kennel_common::WalkState;

// Walk states
pub static WALKED: Emoji<'_, '_> = Emoji("✅ ", "[x]");
pub static NOT_YET: Emoji<'_, '_> = Emoji("⏳ ", "[ ]");
pub static DO_NOT_WALK: Emoji<'_, '_> = Emoji("⛔ ", "[-]");

// Connectivity
pub static LIVE: Emoji<'_, '_> = Emoji("🟢 ", "(*)");
pub static OFFLINE: Emoji<'_, '_> = Emoji("⚪ ", "( )");

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✔️  ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WRENCH: Emoji<'_, '_> = Emoji("🔧 ", "[SETUP]");
pub static NOTE: Emoji<'_, '_> = Emoji("📝 ", "~");
pub static DOG: Emoji<'_, '_> = Emoji("🐕 ", "");

pub fn state_icon(state: WalkState) -> &'static Emoji<'static, 'static> {
    match state {
        WalkState::NotYet => &NOT_YET,
        WalkState::Walked => &WALKED,
        WalkState::DoNotWalk => &DO_NOT_WALK,
    }
}

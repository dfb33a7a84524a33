//! Mode selection for `run`.

use convoetl_types::{RunMode, SyncMode};

/// Resolve a requested mode against checkpoint presence.
///
/// `auto` picks incremental when a checkpoint exists and backfill
/// otherwise. Explicit modes pass through.
#[must_use]
pub fn select_mode(requested: RunMode, checkpoint: Option<i64>) -> SyncMode {
    match requested {
        RunMode::Backfill => SyncMode::Backfill,
        RunMode::Incremental => SyncMode::Incremental,
        RunMode::Auto if checkpoint.is_some() => SyncMode::Incremental,
        RunMode::Auto => SyncMode::Backfill,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_without_checkpoint_backfills() {
        assert_eq!(select_mode(RunMode::Auto, None), SyncMode::Backfill);
    }

    #[test]
    fn auto_with_checkpoint_is_incremental() {
        assert_eq!(select_mode(RunMode::Auto, Some(0)), SyncMode::Incremental);
        assert_eq!(select_mode(RunMode::Auto, Some(2500)), SyncMode::Incremental);
    }

    #[test]
    fn explicit_mode_overrides_checkpoint() {
        assert_eq!(select_mode(RunMode::Backfill, Some(10)), SyncMode::Backfill);
        assert_eq!(select_mode(RunMode::Incremental, None), SyncMode::Incremental);
    }
}

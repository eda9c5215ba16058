mod posting;
mod repository;

pub use posting::*;
pub use repository::*;

/// SQL migration for accounts, businesses and the transaction ledger
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// SQL migration for round-up reclaims
pub const MIGRATION_002_ROUND_UP_RECLAIMS: &str =
    include_str!("migrations/002_round_up_reclaims.sql");

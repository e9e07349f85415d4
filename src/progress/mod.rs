pub mod ledger;
pub mod store;

pub use ledger::{
    level_for_xp, xp_for_level, xp_for_session, DailyStat, ProgressLedger, Quest, QuestCadence,
    QuestKind, QuestStatus, SessionReward,
};
pub use store::LedgerStore;

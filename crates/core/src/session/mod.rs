pub mod engine;
pub mod states;

pub use engine::{SelectionSession, SessionError};
pub use states::{
    AdvanceOutcome, FinalizeAction, FinalizeResolution, FinalizeTicket, HistoryFrame,
    PendingFinalize, SelectionChange, SessionMode, SessionPhase, SessionSummary,
};

//! Settlement engines
//!
//! - **rtgs**: immediate gross settlement and the Queue 2 retry pass
//! - **lsm**: liquidity-saving mechanisms (bilateral offsetting, cycles)

pub mod lsm;
pub mod rtgs;

pub use rtgs::{
    process_queue, submit_registered, try_settle, QueueProcessingResult, SettlementError,
    SubmissionResult,
};

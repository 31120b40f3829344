//! Domain types: agents, transactions, simulation state, events.

pub mod agent;
pub mod event;
pub mod queue_index;
pub mod state;
pub mod transaction;

pub use agent::{Agent, AgentError, WithdrawError};
pub use event::{Event, EventLog};
pub use state::SimulationState;
pub use transaction::{Transaction, TransactionError, TransactionStatus};

//! JSON decision-tree policies
//!
//! - **fields**: the closed context-field catalog
//! - **types**: the typed AST (deserialized from JSON)
//! - **context**: per-call evaluation snapshots
//! - **interpreter**: expression evaluation and tree traversal
//! - **validation**: load-time safety checks
//! - **executor**: the validated, executable TreePolicy
//! - **factory**: built-in policy variants (FIFO, deadline, liquidity-aware)
//! - **schema_docs**: machine-readable grammar documentation

pub mod context;
pub mod executor;
pub mod factory;
pub mod fields;
pub mod interpreter;
pub mod schema_docs;
pub mod types;
pub mod validation;

pub use context::EvalContext;
pub use executor::{TreePolicy, TreePolicyError};
pub use factory::create_policy;
pub use fields::{Field, TreeKind};
pub use interpreter::EvalError;
pub use types::{ActionNode, Computation, DecisionTreeDef, Expression, TreeNode, ValueExpr};
pub use validation::{validate_tree, ValidationError};

// core.rs splits the ledger into submodules for easier maintenance.
pub mod chain;
pub mod codec;
pub mod ledger;
pub mod validation;

pub use chain::*;
pub use ledger::*;
pub use validation::*;

// Thin re-export module: the implementation lives under `blockchain/core/`,
// split into block types, canonical encoding, validation and the ledger.

pub mod core;
pub use self::core::*;

pub mod lots;
pub mod position;
pub mod trailing;
pub mod transaction;

pub use lots::{Lot, LotLedger};
pub use position::Position;
pub use transaction::{OrderKind, RejectReason, Transaction, TransactionKind};

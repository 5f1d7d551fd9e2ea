pub mod chain_handlers;
pub mod dispatch;
pub mod engine;
pub mod ledger_service;
pub mod sym_deposit;
pub mod tx_pipeline;

pub use chain_handlers::ChainHandler;
pub use dispatch::{DispatchTable, DispatchTableBuilder};
pub use engine::{TxEngine, TxEngineBuilder};
pub use ledger_service::LedgerTxService;
pub use sym_deposit::{SymDepositPipeline, SymDepositRequest};
pub use tx_pipeline::{TxPipeline, TxStateStream, MAX_PENDING_PROGRESS};

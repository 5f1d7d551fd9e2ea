//! txforge - 多链交易执行引擎
//!
//! 链派发表（参数校验 + 按链路由）、分阶段的交易流水线、硬件钱包派生路径解析

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use error::{EngineError, EngineErrorCode};
pub use service::engine::{TxEngine, TxEngineBuilder};

// 统一模块导出
pub mod prelude {
    pub use crate::{
        config::Config,
        domain::{
            Asset, Chain, ChainAdapter, ChainParams, HardwareTransport, HdMode, Network,
            Operation, PoolValidator, TransactionRequest, TransactionState, TxStatus, TxType,
            WalletSelector,
        },
        error::{EngineError, EngineErrorCode},
        service::{SymDepositRequest, TxEngine, TxStateStream},
    };
}

//! Domain 模块
//!
//! 链能力描述、交易请求、派生路径和流水线状态等领域模型

pub mod adapter;
pub mod chain_config;
pub mod derivation;
pub mod request;
pub mod transaction_status;

// 重新导出常用类型
pub use adapter::{
    BroadcastRequest, ChainAdapter, FeeContext, Fees, HardwareTransport, PoolValidator,
    ResolvedFee, TransportFactory, TxStatusReport,
};
pub use chain_config::{
    capabilities, Chain, ChainCapabilities, ChainFamily, ChainRegistry, Network, Operation,
    CHAIN_REGISTRY,
};
pub use derivation::{
    list_derivation_options, resolve_derivation_path, DerivationDescriptor, DerivationOption,
    EvmHdMode, HdMode, UtxoHdMode,
};
pub use request::{
    AccountParams, ApiKey, Asset, ChainParams, CosmosParams, EvmParams, FeeOption, FeeSelection,
    PoolAddress, TransactionRequest, TxHash, TxType, UtxoParams, WalletSelector, WalletType,
};
pub use transaction_status::{
    CompletedLeg, DepositLeg, SymDepositState, SymDepositStatus, TransactionState, TxFailure,
    TxStatus,
};

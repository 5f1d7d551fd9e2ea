//! 交易请求模型
//!
//! 辅助字段（API key、路由合约、destination tag、节点 URL）按链族收拢到 `ChainParams`，
//! 每个处理器只匹配自己链族的字段。

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    chain_config::{capabilities, Chain, ChainFamily, Network, Operation},
    derivation::HdMode,
};

/// 交易哈希
pub type TxHash = String;

/// 交易类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Send,
    Deposit,
    Swap,
    Withdraw,
}

impl TxType {
    /// 流水线总步数
    pub fn steps_total(&self) -> u8 {
        match self {
            Self::Send | Self::Deposit | Self::Swap | Self::Withdraw => 3,
        }
    }

    /// 是否需要与流动性池交互（需先校验池地址）
    pub fn is_pool_operation(&self) -> bool {
        !matches!(self, Self::Send)
    }

    /// 各交易类型的默认手续费档位
    pub fn default_fee_option(&self) -> FeeOption {
        FeeOption::Fast
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Send => "send",
            Self::Deposit => "deposit",
            Self::Swap => "swap",
            Self::Withdraw => "withdraw",
        };
        f.write_str(s)
    }
}

/// 钱包类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    /// 本地加密私钥
    #[default]
    Keystore,
    /// 硬件钱包
    Ledger,
}

/// 钱包选择器
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSelector {
    pub wallet_type: WalletType,
    pub account: u32,
    pub index: u32,
    #[serde(default)]
    pub hd_mode: Option<HdMode>,
}

impl WalletSelector {
    pub fn keystore(account: u32, index: u32) -> Self {
        Self {
            wallet_type: WalletType::Keystore,
            account,
            index,
            hd_mode: None,
        }
    }

    pub fn ledger(account: u32, index: u32) -> Self {
        Self {
            wallet_type: WalletType::Ledger,
            account,
            index,
            hd_mode: None,
        }
    }

    pub fn with_hd_mode(mut self, hd_mode: HdMode) -> Self {
        self.hd_mode = Some(hd_mode);
        self
    }

    pub fn is_hardware(&self) -> bool {
        self.wallet_type == WalletType::Ledger
    }
}

/// 手续费档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeOption {
    Average,
    Fast,
    Fastest,
}

/// 手续费选择：档位或显式费率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeSelection {
    Tier(FeeOption),
    Rate(Decimal),
}

/// API key，Debug 输出时脱敏
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoParams {
    pub fee: Option<FeeSelection>,
    pub api_key: Option<ApiKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmParams {
    pub fee: Option<FeeSelection>,
    pub api_key: Option<ApiKey>,
    /// 路由合约地址（存入时必填）
    pub router: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmosParams {
    /// 固定手续费（最小单位）
    pub fee_amount: Option<u128>,
    /// 节点 URL（THOR / MAYA 存入时必填）
    pub node_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountParams {
    pub destination_tag: Option<u32>,
}

/// 按链族区分的链相关参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum ChainParams {
    Utxo(UtxoParams),
    Evm(EvmParams),
    Cosmos(CosmosParams),
    Account(AccountParams),
}

impl ChainParams {
    /// 指定链族的空参数
    pub fn empty_for(family: ChainFamily) -> Self {
        match family {
            ChainFamily::Utxo => Self::Utxo(UtxoParams::default()),
            ChainFamily::Evm => Self::Evm(EvmParams::default()),
            ChainFamily::Cosmos => Self::Cosmos(CosmosParams::default()),
            ChainFamily::Account => Self::Account(AccountParams::default()),
        }
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            Self::Utxo(_) => ChainFamily::Utxo,
            Self::Evm(_) => ChainFamily::Evm,
            Self::Cosmos(_) => ChainFamily::Cosmos,
            Self::Account(_) => ChainFamily::Account,
        }
    }

    /// 按字节 / 按 gas 计费链的手续费选择
    pub fn fee_selection(&self) -> Option<FeeSelection> {
        match self {
            Self::Utxo(p) => p.fee,
            Self::Evm(p) => p.fee,
            Self::Cosmos(_) | Self::Account(_) => None,
        }
    }

    pub fn api_key(&self) -> Option<&ApiKey> {
        match self {
            Self::Utxo(p) => p.api_key.as_ref(),
            Self::Evm(p) => p.api_key.as_ref(),
            Self::Cosmos(_) | Self::Account(_) => None,
        }
    }
}

/// 资产
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub chain: Chain,
    pub symbol: String,
    /// 代币合约地址（原生资产为空）
    #[serde(default)]
    pub contract: Option<String>,
}

impl Asset {
    /// 链的原生资产
    pub fn native(chain: Chain) -> Self {
        let symbol = capabilities(chain)
            .map(|caps| caps.native_symbol)
            .unwrap_or_else(|| chain.as_str());
        Self {
            chain,
            symbol: symbol.to_string(),
            contract: None,
        }
    }

    pub fn token(chain: Chain, symbol: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            chain,
            symbol: symbol.into(),
            contract: Some(contract.into()),
        }
    }

    pub fn is_native(&self) -> bool {
        self.contract.is_none() && *self == Self::native(self.chain)
    }

    /// EVM 代币合约地址，用于查询交易状态
    pub fn evm_token_address(&self) -> Option<&str> {
        if self.chain.family() == ChainFamily::Evm {
            self.contract.as_deref()
        } else {
            None
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.contract {
            Some(contract) => write!(f, "{}.{}-{}", self.chain, self.symbol, contract),
            None => write!(f, "{}.{}", self.chain, self.symbol),
        }
    }
}

/// 流动性协议入金地址
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAddress {
    pub chain: Chain,
    pub address: String,
    #[serde(default)]
    pub router: Option<String>,
    #[serde(default)]
    pub halted: bool,
}

/// 交易请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub tx_type: TxType,
    pub chain: Chain,
    #[serde(default)]
    pub network: Network,
    pub wallet: WalletSelector,
    /// 发送方地址，缺省时通过适配器获取
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub asset: Option<Asset>,
    /// 金额（链原生精度的最小单位）
    pub amount: u128,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    /// 池操作报价时使用的入金地址
    #[serde(default)]
    pub pool: Option<PoolAddress>,
    pub params: ChainParams,
}

impl TransactionRequest {
    pub fn new(tx_type: TxType, chain: Chain, amount: u128) -> Self {
        Self {
            tx_type,
            chain,
            network: Network::Mainnet,
            wallet: WalletSelector::default(),
            sender: None,
            asset: None,
            amount,
            memo: None,
            recipient: None,
            pool: None,
            params: ChainParams::empty_for(chain.family()),
        }
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn with_wallet(mut self, wallet: WalletSelector) -> Self {
        self.wallet = wallet;
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.asset = Some(asset);
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_pool(mut self, pool: PoolAddress) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_params(mut self, params: ChainParams) -> Self {
        self.params = params;
        self
    }

    /// 未选择手续费时使用交易类型的默认档位（只对按字节 / gas 计费的链生效）
    pub fn with_default_fee(mut self) -> Self {
        let tier = FeeSelection::Tier(self.tx_type.default_fee_option());
        match &mut self.params {
            ChainParams::Utxo(p) if p.fee.is_none() => p.fee = Some(tier),
            ChainParams::Evm(p) if p.fee.is_none() => p.fee = Some(tier),
            _ => {}
        }
        self
    }

    /// 该请求在派发表中对应的操作
    ///
    /// 池操作在链接入了存入表时走存入（EVM 路由合约、THOR/MAYA MsgDeposit），
    /// 否则直接发送到池入金地址。
    pub fn operation(&self) -> Operation {
        match self.tx_type {
            TxType::Send => Operation::Send,
            TxType::Deposit | TxType::Swap | TxType::Withdraw => {
                if crate::domain::chain_config::CHAIN_REGISTRY
                    .is_chain_enabled(self.chain, Operation::Deposit)
                {
                    Operation::Deposit
                } else {
                    Operation::Send
                }
            }
        }
    }

    /// 用池地址补全收款地址和路由合约
    pub fn route_to_pool(mut self, pool: &PoolAddress) -> Self {
        self.recipient = Some(pool.address.clone());
        if let (ChainParams::Evm(params), Some(router)) = (&mut self.params, &pool.router) {
            params.router = Some(router.clone());
        }
        self
    }

    /// 资产缺省时取原生资产
    pub fn asset_or_native(&self) -> Asset {
        self.asset
            .clone()
            .unwrap_or_else(|| Asset::native(self.chain))
    }
}

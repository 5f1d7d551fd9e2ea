//! 多链配置模块
//!
//! 定义所有支持的区块链、链族，以及每条链在发送/存入时需要的参数能力描述

use std::{collections::HashMap, fmt, str::FromStr};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// 支持的链（封闭枚举，增删链是编译期可见的变更）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Chain {
    Btc,
    Bch,
    Ltc,
    Doge,
    Dash,
    Zec,
    Eth,
    Bsc,
    Avax,
    Arb,
    Base,
    Gaia,
    Thor,
    Maya,
    Kuji,
    Xrp,
    Sol,
    Tron,
    Xrd,
    Ada,
}

impl Chain {
    pub const ALL: [Chain; 20] = [
        Chain::Btc,
        Chain::Bch,
        Chain::Ltc,
        Chain::Doge,
        Chain::Dash,
        Chain::Zec,
        Chain::Eth,
        Chain::Bsc,
        Chain::Avax,
        Chain::Arb,
        Chain::Base,
        Chain::Gaia,
        Chain::Thor,
        Chain::Maya,
        Chain::Kuji,
        Chain::Xrp,
        Chain::Sol,
        Chain::Tron,
        Chain::Xrd,
        Chain::Ada,
    ];

    /// 链标识符（大写）
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Btc => "BTC",
            Self::Bch => "BCH",
            Self::Ltc => "LTC",
            Self::Doge => "DOGE",
            Self::Dash => "DASH",
            Self::Zec => "ZEC",
            Self::Eth => "ETH",
            Self::Bsc => "BSC",
            Self::Avax => "AVAX",
            Self::Arb => "ARB",
            Self::Base => "BASE",
            Self::Gaia => "GAIA",
            Self::Thor => "THOR",
            Self::Maya => "MAYA",
            Self::Kuji => "KUJI",
            Self::Xrp => "XRP",
            Self::Sol => "SOL",
            Self::Tron => "TRON",
            Self::Xrd => "XRD",
            Self::Ada => "ADA",
        }
    }

    /// 用于错误信息的链全称
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Btc => "Bitcoin",
            Self::Bch => "Bitcoin Cash",
            Self::Ltc => "Litecoin",
            Self::Doge => "Dogecoin",
            Self::Dash => "Dash",
            Self::Zec => "Zcash",
            Self::Eth => "Ethereum",
            Self::Bsc => "BNB Smart Chain",
            Self::Avax => "Avalanche C-Chain",
            Self::Arb => "Arbitrum One",
            Self::Base => "Base",
            Self::Gaia => "Cosmos",
            Self::Thor => "THORChain",
            Self::Maya => "MAYAChain",
            Self::Kuji => "Kujira",
            Self::Xrp => "Ripple",
            Self::Sol => "Solana",
            Self::Tron => "Tron",
            Self::Xrd => "Radix",
            Self::Ada => "Cardano",
        }
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            Self::Btc | Self::Bch | Self::Ltc | Self::Doge | Self::Dash | Self::Zec => {
                ChainFamily::Utxo
            }
            Self::Eth | Self::Bsc | Self::Avax | Self::Arb | Self::Base => ChainFamily::Evm,
            Self::Gaia | Self::Thor | Self::Maya | Self::Kuji => ChainFamily::Cosmos,
            Self::Xrp | Self::Sol | Self::Tron | Self::Xrd | Self::Ada => ChainFamily::Account,
        }
    }

    /// 是否为流动性协议自身的链（THORChain / MAYAChain）
    pub fn is_protocol_chain(&self) -> bool {
        matches!(self, Self::Thor | Self::Maya)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::utils::chain_normalizer::normalize_chain_identifier(s)
    }
}

/// 链族：决定请求携带哪一组链相关参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    /// UTXO 模型，按字节计费 (BTC, LTC, DOGE...)
    Utxo,
    /// EVM 系列，按 gas 计费
    Evm,
    /// Cosmos SDK 系列 (GAIA, THOR, MAYA)
    Cosmos,
    /// 其他账户模型链 (XRP, TRON, SOL...)
    Account,
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Utxo => "utxo",
            Self::Evm => "evm",
            Self::Cosmos => "cosmos",
            Self::Account => "account",
        };
        f.write_str(s)
    }
}

/// 网络
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Stagenet,
    Testnet,
}

/// 派发表类型：发送表 / 存入表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Send,
    Deposit,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Send => "sendTx",
            Self::Deposit => "deposit",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 手续费要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeRequirement {
    /// 由适配器自行决定
    None,
    /// 需要手续费档位或费率（按字节 / 按 gas 计费）
    TierOrRate,
    /// 需要固定手续费金额
    FlatAmount,
}

/// HD 模式要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdModeKind {
    /// 不关心派生模式
    None,
    /// 只接受 UTXO 模式或不传
    Utxo,
    /// 必须传入合法的 EVM 模式
    Evm,
}

/// 存入（流动性协议入金）要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositRequirement {
    /// 未接入存入表
    NotSupported,
    /// 需要路由合约地址 + 收款地址 (EVM)
    Router,
    /// 需要节点 URL (THOR / MAYA 原生 MsgDeposit)
    NodeUrl,
}

/// 链能力描述
#[derive(Debug, Clone)]
pub struct ChainCapabilities {
    pub chain: Chain,
    /// 原生资产符号
    pub native_symbol: &'static str,
    /// 发送时必须指定资产
    pub requires_asset: bool,
    /// 只允许转原生资产
    pub single_asset: bool,
    pub fee: FeeRequirement,
    /// 数据提供方需要 API key
    pub requires_api_key: bool,
    pub hd_mode: HdModeKind,
    pub supports_destination_tag: bool,
    pub deposit: DepositRequirement,
    /// 已接入但被显式禁用（硬件钱包不支持）
    pub disabled: bool,
}

impl ChainCapabilities {
    fn new(chain: Chain, native_symbol: &'static str) -> Self {
        Self {
            chain,
            native_symbol,
            requires_asset: false,
            single_asset: false,
            fee: FeeRequirement::None,
            requires_api_key: false,
            hd_mode: HdModeKind::None,
            supports_destination_tag: false,
            deposit: DepositRequirement::NotSupported,
            disabled: false,
        }
    }

    fn utxo(chain: Chain, native_symbol: &'static str) -> Self {
        Self {
            fee: FeeRequirement::TierOrRate,
            hd_mode: HdModeKind::Utxo,
            ..Self::new(chain, native_symbol)
        }
    }

    fn evm(chain: Chain, native_symbol: &'static str) -> Self {
        Self {
            requires_asset: true,
            fee: FeeRequirement::TierOrRate,
            hd_mode: HdModeKind::Evm,
            deposit: DepositRequirement::Router,
            ..Self::new(chain, native_symbol)
        }
    }

    fn with_api_key(mut self) -> Self {
        self.requires_api_key = true;
        self
    }

    fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn family(&self) -> ChainFamily {
        self.chain.family()
    }

    /// 该链在指定派发表中是否启用
    pub fn is_enabled(&self, operation: Operation) -> bool {
        if self.disabled {
            return false;
        }
        match operation {
            Operation::Send => true,
            Operation::Deposit => self.deposit != DepositRequirement::NotSupported,
        }
    }
}

/// 链能力注册表
pub struct ChainRegistry {
    capabilities: HashMap<Chain, ChainCapabilities>,
}

impl ChainRegistry {
    /// 创建预配置的注册表
    pub fn new() -> Self {
        let mut registry = Self {
            capabilities: HashMap::new(),
        };

        registry.register_default_chains();
        registry
    }

    fn register_default_chains(&mut self) {
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // UTXO 系列
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        self.register(ChainCapabilities::utxo(Chain::Btc, "BTC").with_api_key());
        self.register(ChainCapabilities::utxo(Chain::Bch, "BCH"));
        self.register(ChainCapabilities::utxo(Chain::Ltc, "LTC").with_api_key());
        self.register(ChainCapabilities::utxo(Chain::Doge, "DOGE").with_api_key());
        self.register(ChainCapabilities::utxo(Chain::Dash, "DASH").with_api_key());
        self.register(ChainCapabilities::utxo(Chain::Zec, "ZEC").disabled());

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // EVM 系列
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        self.register(ChainCapabilities::evm(Chain::Eth, "ETH").with_api_key());
        self.register(ChainCapabilities::evm(Chain::Bsc, "BNB"));
        self.register(ChainCapabilities::evm(Chain::Avax, "AVAX"));
        self.register(ChainCapabilities::evm(Chain::Arb, "ETH"));
        self.register(ChainCapabilities::evm(Chain::Base, "ETH"));

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // Cosmos 系列
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        self.register(ChainCapabilities {
            requires_asset: true,
            fee: FeeRequirement::FlatAmount,
            ..ChainCapabilities::new(Chain::Gaia, "ATOM")
        });
        self.register(ChainCapabilities {
            requires_asset: true,
            deposit: DepositRequirement::NodeUrl,
            ..ChainCapabilities::new(Chain::Thor, "RUNE")
        });
        self.register(ChainCapabilities {
            requires_asset: true,
            deposit: DepositRequirement::NodeUrl,
            ..ChainCapabilities::new(Chain::Maya, "CACAO")
        });
        self.register(ChainCapabilities::new(Chain::Kuji, "KUJI").disabled());

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // 其他账户模型链
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        self.register(ChainCapabilities {
            requires_asset: true,
            single_asset: true,
            supports_destination_tag: true,
            ..ChainCapabilities::new(Chain::Xrp, "XRP")
        });
        self.register(ChainCapabilities {
            requires_asset: true,
            ..ChainCapabilities::new(Chain::Tron, "TRX")
        });
        self.register(ChainCapabilities::new(Chain::Sol, "SOL").disabled());
        self.register(ChainCapabilities::new(Chain::Xrd, "XRD").disabled());
        self.register(ChainCapabilities::new(Chain::Ada, "ADA").disabled());
    }

    /// 注册链能力
    pub fn register(&mut self, capabilities: ChainCapabilities) {
        self.capabilities.insert(capabilities.chain, capabilities);
    }

    pub fn get(&self, chain: Chain) -> Option<&ChainCapabilities> {
        self.capabilities.get(&chain)
    }

    /// 链在指定派发表中是否启用
    pub fn is_chain_enabled(&self, chain: Chain, operation: Operation) -> bool {
        self.get(chain)
            .map(|caps| caps.is_enabled(operation))
            .unwrap_or(false)
    }

    /// 列出指定派发表中启用的链（按 `Chain::ALL` 顺序）
    pub fn list_supported_chains(&self, operation: Operation) -> Vec<Chain> {
        Chain::ALL
            .iter()
            .copied()
            .filter(|chain| self.is_chain_enabled(*chain, operation))
            .collect()
    }

    /// 验证能力描述完整性
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for chain in Chain::ALL {
            let Some(caps) = self.get(chain) else {
                errors.push(format!("Chain {} has no capability descriptor", chain));
                continue;
            };

            if caps.native_symbol.is_empty() {
                errors.push(format!("Chain {} has empty native symbol", chain));
            }

            // 能力组合必须和链族匹配
            match (caps.family(), caps.hd_mode, caps.deposit) {
                (ChainFamily::Evm, HdModeKind::Evm, _) => {}
                (ChainFamily::Utxo, HdModeKind::Utxo, DepositRequirement::NotSupported) => {}
                (ChainFamily::Cosmos | ChainFamily::Account, HdModeKind::None, _) => {}
                _ => errors.push(format!(
                    "Chain {} has capabilities incompatible with family {}: {:?} / {:?}",
                    chain,
                    caps.family(),
                    caps.hd_mode,
                    caps.deposit
                )),
            }

            if caps.deposit == DepositRequirement::NodeUrl && !chain.is_protocol_chain() {
                errors.push(format!(
                    "Chain {} requires a node url for deposits but is not a protocol chain",
                    chain
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局能力注册表（初始化后只读）
pub static CHAIN_REGISTRY: Lazy<ChainRegistry> = Lazy::new(ChainRegistry::new);

/// 获取链能力描述
pub fn capabilities(chain: Chain) -> Option<&'static ChainCapabilities> {
    CHAIN_REGISTRY.get(chain)
}

//! 外部协作方接口
//!
//! 链 SDK 客户端、流动性协议池校验和硬件钱包传输层都以 trait 形式注入，
//! 引擎本身不做任何网络或设备 IO。

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    chain_config::{Chain, Network},
    request::{Asset, FeeOption, PoolAddress, TxHash, WalletSelector},
};

/// 硬件钱包传输句柄（生命周期由调用方管理，引擎只借用）
#[async_trait]
pub trait HardwareTransport: Send + Sync {
    /// 设备标识，用于日志
    fn device_id(&self) -> &str;

    /// 关闭连接
    async fn close(&self) -> Result<()>;
}

/// 硬件传输工厂
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn HardwareTransport>>;
}

/// 手续费估算结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Fees {
    /// 按档位给出的费率（sat/vB、gwei...）
    Tiered {
        average: Decimal,
        fast: Decimal,
        fastest: Decimal,
    },
    /// 固定手续费
    Flat { amount: Decimal },
}

impl Fees {
    pub fn rate_for(&self, option: FeeOption) -> Decimal {
        match self {
            Self::Tiered {
                average,
                fast,
                fastest,
            } => match option {
                FeeOption::Average => *average,
                FeeOption::Fast => *fast,
                FeeOption::Fastest => *fastest,
            },
            Self::Flat { amount } => *amount,
        }
    }
}

/// 广播时使用的具体手续费
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedFee {
    /// 由适配器自行决定
    Auto,
    /// 费率（按字节 / 按 gas）
    Rate(Decimal),
    /// 固定金额（最小单位）
    Flat(u128),
}

/// 估算手续费时的上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeContext {
    pub network: Network,
    pub sender: String,
    pub recipient: Option<String>,
    pub asset: Asset,
    pub amount: u128,
    pub memo: Option<String>,
}

/// 已校验、已补全的广播请求
///
/// 由链处理器在校验通过后构造，适配器只负责编码、签名和提交。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastRequest {
    pub chain: Chain,
    pub network: Network,
    pub wallet: WalletSelector,
    /// 设备使用的派生路径
    pub derivation_path: String,
    pub sender: String,
    pub recipient: Option<String>,
    pub asset: Asset,
    pub amount: u128,
    pub memo: Option<String>,
    pub fee: ResolvedFee,
    /// EVM 存入使用的路由合约
    pub router: Option<String>,
    /// THOR / MAYA 原生存入使用的节点
    pub node_url: Option<String>,
    pub destination_tag: Option<u32>,
    /// 是否走原生存入消息（MsgDeposit / 路由合约 deposit）
    pub is_deposit: bool,
    /// 数据提供方 API key（已脱敏 Debug）
    pub api_key: Option<crate::domain::request::ApiKey>,
}

/// 链上状态查询结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum TxStatusReport {
    Pending,
    Finalized,
    Failed(String),
}

/// 链 SDK 客户端
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> Chain;

    /// 获取发送方地址
    async fn get_address(
        &self,
        wallet: &WalletSelector,
        derivation_path: &str,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<String>;

    async fn estimate_fees(&self, ctx: &FeeContext) -> Result<Fees>;

    /// 签名并广播，返回交易哈希
    async fn broadcast(
        &self,
        request: &BroadcastRequest,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<TxHash>;

    /// 查询交易状态，`token_address` 为 EVM 代币合约
    async fn poll_status(&self, tx_hash: &str, token_address: Option<&str>)
        -> Result<TxStatusReport>;
}

/// 流动性协议入金地址 / 节点校验
#[async_trait]
pub trait PoolValidator: Send + Sync {
    /// 校验调用方报价时使用的入金地址仍然有效
    ///
    /// 地址已轮换、路由合约变更或池已暂停时返回错误。
    async fn validate_pool_address(&self, pool: &PoolAddress, network: Network) -> Result<()>;

    /// 协议原生资产存入前校验节点可用
    async fn validate_node(&self, chain: Chain, network: Network) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_rate_for_tier() {
        let fees = Fees::Tiered {
            average: Decimal::new(5, 0),
            fast: Decimal::new(10, 0),
            fastest: Decimal::new(25, 0),
        };
        assert_eq!(fees.rate_for(FeeOption::Average), Decimal::new(5, 0));
        assert_eq!(fees.rate_for(FeeOption::Fast), Decimal::new(10, 0));
        assert_eq!(fees.rate_for(FeeOption::Fastest), Decimal::new(25, 0));

        let flat = Fees::Flat {
            amount: Decimal::new(2000, 0),
        };
        assert_eq!(flat.rate_for(FeeOption::Fastest), Decimal::new(2000, 0));
    }

    #[test]
    fn test_status_report_serde() {
        let json = serde_json::to_value(TxStatusReport::Failed("out of gas".into())).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "out of gas");
    }
}

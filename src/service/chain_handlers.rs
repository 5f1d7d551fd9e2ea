//! 链处理器
//!
//! 每条链在每张派发表（发送 / 存入）里注册一个处理器。处理器先做纯校验，
//! 校验通过后才会调用适配器：获取发送方地址 → 解析手续费 → 签名广播。
//! 适配器错误在这里统一转换为 `EngineError`。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::{
    domain::{
        adapter::{BroadcastRequest, ChainAdapter, FeeContext, HardwareTransport, ResolvedFee},
        chain_config::{
            capabilities, Chain, ChainCapabilities, ChainFamily, DepositRequirement,
            FeeRequirement, HdModeKind, Operation,
        },
        derivation::{resolve_derivation_path, HdMode},
        request::{
            AccountParams, ApiKey, ChainParams, CosmosParams, EvmParams, FeeSelection,
            TransactionRequest, TxHash, UtxoParams,
        },
    },
    error::{EngineError, EngineErrorCode},
};

/// 链处理器
#[async_trait]
pub trait ChainHandler: Send + Sync {
    fn chain(&self) -> Chain;

    fn operation(&self) -> Operation;

    /// 校验请求参数，不触达适配器
    fn validate(&self, request: &TransactionRequest) -> Result<(), EngineError>;

    /// 执行已校验的请求，返回交易哈希
    async fn execute(
        &self,
        request: &TransactionRequest,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<TxHash, EngineError>;
}

/// 为 (链, 派发表) 构造处理器；链未启用时返回 None
pub fn build_handler(
    chain: Chain,
    operation: Operation,
    adapter: Arc<dyn ChainAdapter>,
) -> Option<Arc<dyn ChainHandler>> {
    let caps = capabilities(chain)?;
    if !caps.is_enabled(operation) {
        return None;
    }

    let core = HandlerCore {
        caps,
        operation,
        adapter,
    };

    let handler: Arc<dyn ChainHandler> = match caps.family() {
        ChainFamily::Utxo => Arc::new(UtxoHandler { core }),
        ChainFamily::Evm => Arc::new(EvmHandler { core }),
        ChainFamily::Cosmos => Arc::new(CosmosHandler { core }),
        ChainFamily::Account => Arc::new(AccountHandler { core }),
    };
    Some(handler)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 公共部分
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct HandlerCore {
    caps: &'static ChainCapabilities,
    operation: Operation,
    adapter: Arc<dyn ChainAdapter>,
}

impl HandlerCore {
    fn chain(&self) -> Chain {
        self.caps.chain
    }

    fn chain_name(&self) -> &'static str {
        self.caps.chain.display_name()
    }

    fn missing(&self, what: &str) -> EngineError {
        EngineError::invalid_data(format!(
            "{} needs to be defined to send transaction on {}",
            what,
            self.chain_name()
        ))
    }

    /// 资产与链族参数
    fn validate_asset_and_params(&self, request: &TransactionRequest) -> Result<(), EngineError> {
        match &request.asset {
            None if self.caps.requires_asset => return Err(self.missing("Asset")),
            None => {}
            Some(asset) => {
                if asset.chain != self.chain() {
                    return Err(EngineError::invalid_data(format!(
                        "Asset {} does not belong to {}",
                        asset,
                        self.chain_name()
                    )));
                }
                if self.caps.single_asset && asset.symbol != self.caps.native_symbol {
                    return Err(EngineError::invalid_data(format!(
                        "Only {} can be sent on {}, got {}",
                        self.caps.native_symbol,
                        self.chain_name(),
                        asset
                    )));
                }
            }
        }

        if request.params.family() != self.caps.family() {
            return Err(EngineError::invalid_data(format!(
                "{} parameters given for {} chain {}",
                request.params.family(),
                self.caps.family(),
                self.chain()
            )));
        }
        Ok(())
    }

    fn validate_fee_selection(&self, fee: Option<FeeSelection>) -> Result<(), EngineError> {
        if self.caps.fee != FeeRequirement::TierOrRate {
            return Ok(());
        }
        match fee {
            None => Err(self.missing("Fee option")),
            Some(FeeSelection::Rate(rate)) if rate.is_sign_negative() || rate.is_zero() => {
                Err(EngineError::invalid_data(format!(
                    "Fee rate must be positive to send transaction on {}, got {}",
                    self.chain_name(),
                    rate
                )))
            }
            Some(_) => Ok(()),
        }
    }

    fn validate_api_key(&self, api_key: Option<&ApiKey>) -> Result<(), EngineError> {
        if !self.caps.requires_api_key {
            return Ok(());
        }
        match api_key {
            Some(key) if !key.is_blank() => Ok(()),
            _ => Err(EngineError::invalid_data(format!(
                "{} needs an api key",
                self.chain_name()
            ))),
        }
    }

    /// 发送必须有收款地址；池操作的收款地址在校验池地址时已补全
    fn validate_recipient(&self, request: &TransactionRequest) -> Result<(), EngineError> {
        if self.operation != Operation::Send {
            return Ok(());
        }
        match request.recipient.as_deref() {
            Some(r) if !r.trim().is_empty() => Ok(()),
            _ => Err(self.missing("Recipient")),
        }
    }

    fn validate_hd_mode(&self, mode: Option<HdMode>) -> Result<(), EngineError> {
        match (self.caps.hd_mode, mode) {
            (HdModeKind::None, _) => Ok(()),
            (HdModeKind::Utxo, None | Some(HdMode::Default) | Some(HdMode::Utxo(_))) => Ok(()),
            (HdModeKind::Utxo, Some(other)) => Err(EngineError::invalid_data(format!(
                "Invalid UTXO HD mode set for {} transaction: {}",
                self.chain_name(),
                other
            ))),
            (HdModeKind::Evm, Some(HdMode::Evm(_))) => Ok(()),
            (HdModeKind::Evm, _) => Err(EngineError::invalid_data(format!(
                "Invalid EVM HD mode set - needed to send transaction on {}",
                self.chain_name()
            ))),
        }
    }

    fn derivation_path(&self, request: &TransactionRequest) -> String {
        resolve_derivation_path(
            self.chain(),
            request.wallet.account,
            request.wallet.index,
            request.network,
            request.wallet.hd_mode,
        )
        .path
    }

    async fn resolve_sender(
        &self,
        request: &TransactionRequest,
        derivation_path: &str,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<String, EngineError> {
        if let Some(sender) = request.sender.as_deref().filter(|s| !s.trim().is_empty()) {
            return Ok(sender.to_string());
        }

        let address = self
            .adapter
            .get_address(&request.wallet, derivation_path, transport)
            .await
            .map_err(|e| {
                warn!(chain = %self.chain(), error = ?e, "Failed to get sender address");
                EngineError::from_adapter(EngineErrorCode::GetAddressFailed, &e)
            })?;

        if address.trim().is_empty() {
            return Err(EngineError::get_address_failed(format!(
                "Empty address returned for {} (path {})",
                self.chain_name(),
                derivation_path
            )));
        }
        Ok(address)
    }

    /// 档位 → 具体费率
    async fn resolve_fee(
        &self,
        selection: Option<FeeSelection>,
        ctx: &FeeContext,
    ) -> Result<ResolvedFee, EngineError> {
        match selection {
            None => Ok(ResolvedFee::Auto),
            Some(FeeSelection::Rate(rate)) => Ok(ResolvedFee::Rate(rate)),
            Some(FeeSelection::Tier(option)) => {
                let fees = self.adapter.estimate_fees(ctx).await.map_err(|e| {
                    let e = e.context("fee estimation failed");
                    EngineError::tx_failed(self.operation, format!("{:#}", e))
                })?;
                let rate = fees.rate_for(option);
                debug!(chain = %self.chain(), ?option, %rate, "Resolved fee tier");
                Ok(ResolvedFee::Rate(rate))
            }
        }
    }

    fn fee_context(&self, request: &TransactionRequest, sender: &str) -> FeeContext {
        FeeContext {
            network: request.network,
            sender: sender.to_string(),
            recipient: request.recipient.clone(),
            asset: request.asset_or_native(),
            amount: request.amount,
            memo: request.memo.clone(),
        }
    }

    fn broadcast_request(
        &self,
        request: &TransactionRequest,
        derivation_path: String,
        sender: String,
        fee: ResolvedFee,
    ) -> BroadcastRequest {
        BroadcastRequest {
            chain: self.chain(),
            network: request.network,
            wallet: request.wallet.clone(),
            derivation_path,
            sender,
            recipient: request.recipient.clone(),
            asset: request.asset_or_native(),
            amount: request.amount,
            memo: request.memo.clone(),
            fee,
            router: None,
            node_url: None,
            destination_tag: None,
            is_deposit: self.operation == Operation::Deposit,
            api_key: request.params.api_key().cloned(),
        }
    }

    async fn broadcast(
        &self,
        request: &BroadcastRequest,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<TxHash, EngineError> {
        info!(
            chain = %self.chain(),
            operation = %self.operation,
            amount = request.amount,
            asset = %request.asset,
            hardware = transport.is_some(),
            "Broadcasting transaction"
        );

        let hash = self
            .adapter
            .broadcast(request, transport)
            .await
            .map_err(|e| {
                warn!(chain = %self.chain(), operation = %self.operation, error = ?e, "Broadcast failed");
                EngineError::tx_failed(self.operation, format!("{:#}", e))
            })?;

        if hash.trim().is_empty() {
            return Err(EngineError::invalid_response(format!(
                "Empty transaction hash returned by {} {}",
                self.chain_name(),
                self.operation
            )));
        }

        info!(chain = %self.chain(), tx_hash = %hash, "Transaction broadcasted");
        Ok(hash)
    }
}

fn params_mismatch(chain: Chain, params: &ChainParams) -> EngineError {
    EngineError::invalid_data(format!(
        "{} parameters given for {} chain {}",
        params.family(),
        chain.family(),
        chain
    ))
}

/// 0x 前缀 + 20 字节十六进制
fn is_evm_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .map(|h| h.len() == 40 && hex::decode(h).is_ok())
        .unwrap_or(false)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UTXO 系列
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct UtxoHandler {
    core: HandlerCore,
}

impl UtxoHandler {
    fn params<'a>(&self, request: &'a TransactionRequest) -> Result<&'a UtxoParams, EngineError> {
        match &request.params {
            ChainParams::Utxo(p) => Ok(p),
            other => Err(params_mismatch(self.core.chain(), other)),
        }
    }
}

#[async_trait]
impl ChainHandler for UtxoHandler {
    fn chain(&self) -> Chain {
        self.core.chain()
    }

    fn operation(&self) -> Operation {
        self.core.operation
    }

    fn validate(&self, request: &TransactionRequest) -> Result<(), EngineError> {
        self.core.validate_asset_and_params(request)?;
        let params = self.params(request)?;
        self.core.validate_fee_selection(params.fee)?;
        self.core.validate_api_key(params.api_key.as_ref())?;
        self.core.validate_recipient(request)?;
        self.core.validate_hd_mode(request.wallet.hd_mode)
    }

    async fn execute(
        &self,
        request: &TransactionRequest,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<TxHash, EngineError> {
        let params = self.params(request)?;
        let path = self.core.derivation_path(request);
        let sender = self.core.resolve_sender(request, &path, transport).await?;
        let fee = self
            .core
            .resolve_fee(params.fee, &self.core.fee_context(request, &sender))
            .await?;

        let broadcast = self.core.broadcast_request(request, path, sender, fee);
        self.core.broadcast(&broadcast, transport).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EVM 系列
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct EvmHandler {
    core: HandlerCore,
}

impl EvmHandler {
    fn params<'a>(&self, request: &'a TransactionRequest) -> Result<&'a EvmParams, EngineError> {
        match &request.params {
            ChainParams::Evm(p) => Ok(p),
            other => Err(params_mismatch(self.core.chain(), other)),
        }
    }

    fn validate_deposit(
        &self,
        request: &TransactionRequest,
        params: &EvmParams,
    ) -> Result<(), EngineError> {
        if self.core.caps.deposit != DepositRequirement::Router
            || self.core.operation != Operation::Deposit
        {
            return Ok(());
        }

        let router = params
            .router
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| self.core.missing("Router address"))?;
        if !is_evm_address(router) {
            return Err(EngineError::invalid_data(format!(
                "Invalid router address for {}: {}",
                self.core.chain_name(),
                router
            )));
        }

        if request
            .recipient
            .as_deref()
            .map_or(true, |r| r.trim().is_empty())
        {
            return Err(self.core.missing("Recipient"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainHandler for EvmHandler {
    fn chain(&self) -> Chain {
        self.core.chain()
    }

    fn operation(&self) -> Operation {
        self.core.operation
    }

    fn validate(&self, request: &TransactionRequest) -> Result<(), EngineError> {
        self.core.validate_asset_and_params(request)?;
        let params = self.params(request)?;
        self.core.validate_fee_selection(params.fee)?;
        self.core.validate_api_key(params.api_key.as_ref())?;
        self.validate_deposit(request, params)?;
        self.core.validate_recipient(request)?;
        self.core.validate_hd_mode(request.wallet.hd_mode)
    }

    async fn execute(
        &self,
        request: &TransactionRequest,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<TxHash, EngineError> {
        let params = self.params(request)?;
        let path = self.core.derivation_path(request);
        let sender = self.core.resolve_sender(request, &path, transport).await?;
        let fee = self
            .core
            .resolve_fee(params.fee, &self.core.fee_context(request, &sender))
            .await?;

        let mut broadcast = self.core.broadcast_request(request, path, sender, fee);
        if self.core.operation == Operation::Deposit {
            broadcast.router = params.router.clone();
        }
        self.core.broadcast(&broadcast, transport).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cosmos 系列
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct CosmosHandler {
    core: HandlerCore,
}

impl CosmosHandler {
    fn params<'a>(&self, request: &'a TransactionRequest) -> Result<&'a CosmosParams, EngineError> {
        match &request.params {
            ChainParams::Cosmos(p) => Ok(p),
            other => Err(params_mismatch(self.core.chain(), other)),
        }
    }
}

#[async_trait]
impl ChainHandler for CosmosHandler {
    fn chain(&self) -> Chain {
        self.core.chain()
    }

    fn operation(&self) -> Operation {
        self.core.operation
    }

    fn validate(&self, request: &TransactionRequest) -> Result<(), EngineError> {
        self.core.validate_asset_and_params(request)?;
        let params = self.params(request)?;

        if self.core.caps.fee == FeeRequirement::FlatAmount && params.fee_amount.is_none() {
            return Err(self.core.missing("Fee amount"));
        }

        if self.core.caps.deposit == DepositRequirement::NodeUrl
            && self.core.operation == Operation::Deposit
            && params
                .node_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            return Err(self.core.missing("\"nodeUrl\""));
        }
        self.core.validate_recipient(request)
    }

    async fn execute(
        &self,
        request: &TransactionRequest,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<TxHash, EngineError> {
        let params = self.params(request)?;
        let path = self.core.derivation_path(request);
        let sender = self.core.resolve_sender(request, &path, transport).await?;

        let fee = params
            .fee_amount
            .map(ResolvedFee::Flat)
            .unwrap_or(ResolvedFee::Auto);
        let mut broadcast = self.core.broadcast_request(request, path, sender, fee);
        if self.core.operation == Operation::Deposit {
            broadcast.node_url = params.node_url.clone();
        }
        self.core.broadcast(&broadcast, transport).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 其他账户模型链
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct AccountHandler {
    core: HandlerCore,
}

impl AccountHandler {
    fn params<'a>(&self, request: &'a TransactionRequest) -> Result<&'a AccountParams, EngineError> {
        match &request.params {
            ChainParams::Account(p) => Ok(p),
            other => Err(params_mismatch(self.core.chain(), other)),
        }
    }
}

#[async_trait]
impl ChainHandler for AccountHandler {
    fn chain(&self) -> Chain {
        self.core.chain()
    }

    fn operation(&self) -> Operation {
        self.core.operation
    }

    fn validate(&self, request: &TransactionRequest) -> Result<(), EngineError> {
        self.core.validate_asset_and_params(request)?;
        let params = self.params(request)?;

        if params.destination_tag.is_some() && !self.core.caps.supports_destination_tag {
            return Err(EngineError::invalid_data(format!(
                "{} does not support destination tags",
                self.core.chain_name()
            )));
        }
        self.core.validate_recipient(request)
    }

    async fn execute(
        &self,
        request: &TransactionRequest,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<TxHash, EngineError> {
        let params = self.params(request)?;
        let path = self.core.derivation_path(request);
        let sender = self.core.resolve_sender(request, &path, transport).await?;

        let mut broadcast = self
            .core
            .broadcast_request(request, path, sender, ResolvedFee::Auto);
        broadcast.destination_tag = params.destination_tag;
        self.core.broadcast(&broadcast, transport).await
    }
}

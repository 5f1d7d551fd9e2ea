//! 链派发表
//!
//! 发送表和存入表都是 `Chain -> Arc<dyn ChainHandler>` 的精确映射，构建后只读，
//! 可在多个流水线之间共享。每次派发按固定顺序校验，任一步失败立即返回，
//! 校验阶段不会调用任何适配器。

use std::{collections::HashMap, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    domain::{
        adapter::{ChainAdapter, HardwareTransport},
        chain_config::{Chain, Operation, CHAIN_REGISTRY},
        request::{TransactionRequest, TxHash},
    },
    error::EngineError,
    service::chain_handlers::{build_handler, ChainHandler},
};

/// 派发表构建器
pub struct DispatchTableBuilder {
    adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
    ledger_enabled: bool,
}

impl DispatchTableBuilder {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            ledger_enabled: true,
        }
    }

    /// 注册链适配器（同一条链后注册的覆盖先注册的）
    pub fn with_adapter(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.adapters.insert(adapter.chain(), adapter);
        self
    }

    pub fn with_adapters<I>(mut self, adapters: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ChainAdapter>>,
    {
        for adapter in adapters {
            self.adapters.insert(adapter.chain(), adapter);
        }
        self
    }

    pub fn ledger_enabled(mut self, enabled: bool) -> Self {
        self.ledger_enabled = enabled;
        self
    }

    pub fn build(self) -> DispatchTable {
        let mut send = HashMap::new();
        let mut deposit = HashMap::new();

        for (chain, adapter) in &self.adapters {
            if let Some(handler) = build_handler(*chain, Operation::Send, adapter.clone()) {
                send.insert(*chain, handler);
            }
            if let Some(handler) = build_handler(*chain, Operation::Deposit, adapter.clone()) {
                deposit.insert(*chain, handler);
            }
        }

        info!(
            adapters = self.adapters.len(),
            send_handlers = send.len(),
            deposit_handlers = deposit.len(),
            ledger_enabled = self.ledger_enabled,
            "Dispatch table built"
        );

        DispatchTable {
            adapters: self.adapters,
            send,
            deposit,
            ledger_enabled: self.ledger_enabled,
        }
    }
}

impl Default for DispatchTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 派发表
pub struct DispatchTable {
    adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
    send: HashMap<Chain, Arc<dyn ChainHandler>>,
    deposit: HashMap<Chain, Arc<dyn ChainHandler>>,
    ledger_enabled: bool,
}

impl DispatchTable {
    pub fn builder() -> DispatchTableBuilder {
        DispatchTableBuilder::new()
    }

    fn table(&self, operation: Operation) -> &HashMap<Chain, Arc<dyn ChainHandler>> {
        match operation {
            Operation::Send => &self.send,
            Operation::Deposit => &self.deposit,
        }
    }

    pub fn handler(&self, chain: Chain, operation: Operation) -> Option<&Arc<dyn ChainHandler>> {
        self.table(operation).get(&chain)
    }

    /// 链适配器（流水线确认阶段查询状态用）
    pub fn adapter(&self, chain: Chain) -> Option<&Arc<dyn ChainAdapter>> {
        self.adapters.get(&chain)
    }

    pub fn has_handler(&self, chain: Chain, operation: Operation) -> bool {
        self.table(operation).contains_key(&chain)
    }

    pub fn ledger_enabled(&self) -> bool {
        self.ledger_enabled
    }

    /// 按顺序校验请求，返回对应处理器
    pub fn validate(
        &self,
        operation: Operation,
        request: &TransactionRequest,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<&Arc<dyn ChainHandler>, EngineError> {
        let chain = request.chain;

        // 1. 链支持且未被禁用
        if !CHAIN_REGISTRY.is_chain_enabled(chain, operation) {
            return Err(EngineError::not_implemented(format!(
                "{} is not supported or enabled for '{}'",
                chain, operation
            )));
        }

        // 2. 处理器存在
        let handler = self.handler(chain, operation).ok_or_else(|| {
            EngineError::not_implemented(format!("{} is not supported for '{}'", chain, operation))
        })?;

        // 3-5. 资产、手续费、辅助字段
        handler.validate(request)?;

        // 6. 硬件钱包必须带上已连接的传输句柄
        if request.wallet.is_hardware() {
            if !self.ledger_enabled {
                return Err(EngineError::not_implemented(
                    "Ledger support is disabled in this build",
                ));
            }
            if transport.is_none() {
                return Err(EngineError::invalid_data(format!(
                    "Ledger transport needs to be connected to send transaction on {}",
                    chain.display_name()
                )));
            }
        }

        Ok(handler)
    }

    /// 校验并执行
    pub async fn dispatch(
        &self,
        operation: Operation,
        request: &TransactionRequest,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<TxHash, EngineError> {
        let handler = match self.validate(operation, request, transport) {
            Ok(handler) => handler,
            Err(e) => {
                debug!(
                    chain = %request.chain,
                    operation = %operation,
                    code = %e.code,
                    error = %e,
                    "Request rejected"
                );
                return Err(e);
            }
        };

        match handler.execute(request, transport).await {
            Ok(hash) => Ok(hash),
            Err(e) => {
                warn!(
                    chain = %request.chain,
                    operation = %operation,
                    code = %e.code,
                    error = %e,
                    "Dispatch failed"
                );
                Err(e)
            }
        }
    }

    pub async fn send(
        &self,
        request: &TransactionRequest,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<TxHash, EngineError> {
        self.dispatch(Operation::Send, request, transport).await
    }

    pub async fn deposit(
        &self,
        request: &TransactionRequest,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<TxHash, EngineError> {
        self.dispatch(Operation::Deposit, request, transport).await
    }
}

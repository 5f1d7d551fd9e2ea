//! 硬件钱包交易服务
//!
//! 每次调用打开一个传输连接，派发交易后无论成败都关闭连接。

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    config::ApiKeysConfig,
    domain::{
        adapter::TransportFactory,
        chain_config::Operation,
        request::{TransactionRequest, TxHash, WalletType},
    },
    error::{EngineError, EngineErrorCode},
    service::dispatch::DispatchTable,
};

pub struct LedgerTxService {
    dispatch: Arc<DispatchTable>,
    transports: Arc<dyn TransportFactory>,
    api_keys: ApiKeysConfig,
}

impl LedgerTxService {
    pub fn new(
        dispatch: Arc<DispatchTable>,
        transports: Arc<dyn TransportFactory>,
        api_keys: ApiKeysConfig,
    ) -> Self {
        Self {
            dispatch,
            transports,
            api_keys,
        }
    }

    pub async fn send_tx(&self, request: &TransactionRequest) -> Result<TxHash, EngineError> {
        self.execute(Operation::Send, request).await
    }

    pub async fn deposit(&self, request: &TransactionRequest) -> Result<TxHash, EngineError> {
        self.execute(Operation::Deposit, request).await
    }

    async fn execute(
        &self,
        operation: Operation,
        request: &TransactionRequest,
    ) -> Result<TxHash, EngineError> {
        if !self.dispatch.ledger_enabled() {
            return Err(EngineError::not_implemented(
                "Ledger support is disabled in this build",
            ));
        }
        if request.wallet.wallet_type != WalletType::Ledger {
            return Err(EngineError::invalid_data(format!(
                "Ledger {} called with a {:?} wallet",
                operation, request.wallet.wallet_type
            )));
        }
        let request = self.api_keys.apply(request.clone());

        let transport = self.transports.open().await.map_err(|e| {
            warn!(chain = %request.chain, error = ?e, "Failed to open Ledger transport");
            EngineError::from_adapter(EngineErrorCode::TransportFailed, &e)
        })?;
        debug!(chain = %request.chain, device = %transport.device_id(), "Ledger transport opened");

        let result = self
            .dispatch
            .dispatch(operation, &request, Some(transport.as_ref()))
            .await;

        // 无论成败都关闭；关闭失败不覆盖派发结果
        if let Err(e) = transport.close().await {
            warn!(device = %transport.device_id(), error = ?e, "Failed to close Ledger transport");
        }

        result
    }
}

//! 交易执行引擎门面
//!
//! 组装派发表、流水线、双腿存入和硬件钱包服务，对外暴露统一入口。

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::{
    config::{ApiKeysConfig, Config, PipelineConfig},
    domain::{
        adapter::{ChainAdapter, HardwareTransport, PoolValidator, TransportFactory},
        chain_config::{Chain, Network, Operation, CHAIN_REGISTRY},
        derivation::{self, DerivationDescriptor, DerivationOption, HdMode},
        request::{TransactionRequest, TxHash},
        transaction_status::{SymDepositState, TransactionState},
    },
    error::EngineError,
    service::{
        dispatch::DispatchTable,
        ledger_service::LedgerTxService,
        sym_deposit::{SymDepositPipeline, SymDepositRequest},
        tx_pipeline::{TxPipeline, TxStateStream},
    },
};

/// 引擎构建器
pub struct TxEngineBuilder {
    config: Config,
    adapters: Vec<Arc<dyn ChainAdapter>>,
    pool_validator: Option<Arc<dyn PoolValidator>>,
    transports: Option<Arc<dyn TransportFactory>>,
}

impl TxEngineBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            adapters: Vec::new(),
            pool_validator: None,
            transports: None,
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_pool_validator(mut self, validator: Arc<dyn PoolValidator>) -> Self {
        self.pool_validator = Some(validator);
        self
    }

    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transports = Some(factory);
        self
    }

    pub fn build(self) -> Result<TxEngine> {
        self.config.validate()?;

        let registry_errors = CHAIN_REGISTRY.validate();
        if let Err(errors) = registry_errors {
            anyhow::bail!("Chain registry is inconsistent: {}", errors.join("; "));
        }

        let pool_validator = self
            .pool_validator
            .ok_or_else(|| anyhow::anyhow!("A pool validator is required to build the engine"))?;

        let dispatch = Arc::new(
            DispatchTable::builder()
                .with_adapters(self.adapters)
                .ledger_enabled(self.config.ledger.enabled)
                .build(),
        );

        let ledger = self
            .transports
            .map(|factory| {
                LedgerTxService::new(dispatch.clone(), factory, self.config.api_keys.clone())
            });

        info!(
            ledger_enabled = self.config.ledger.enabled,
            ledger_service = ledger.is_some(),
            "Transaction engine ready"
        );

        Ok(TxEngine {
            pipeline: TxPipeline::new(
                dispatch.clone(),
                pool_validator.clone(),
                self.config.pipeline.clone(),
            ),
            sym_deposit: SymDepositPipeline::new(
                dispatch.clone(),
                pool_validator,
                self.config.pipeline.clone(),
            ),
            dispatch,
            ledger,
            api_keys: self.config.api_keys,
            pipeline_config: self.config.pipeline,
        })
    }
}

/// 交易执行引擎
pub struct TxEngine {
    dispatch: Arc<DispatchTable>,
    pipeline: TxPipeline,
    sym_deposit: SymDepositPipeline,
    ledger: Option<LedgerTxService>,
    api_keys: ApiKeysConfig,
    pipeline_config: PipelineConfig,
}

impl TxEngine {
    pub fn builder(config: Config) -> TxEngineBuilder {
        TxEngineBuilder::new(config)
    }

    pub async fn dispatch_send(
        &self,
        request: &TransactionRequest,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<TxHash, EngineError> {
        let request = self.with_configured_api_key(request.clone());
        self.dispatch.send(&request, transport).await
    }

    pub async fn dispatch_deposit(
        &self,
        request: &TransactionRequest,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<TxHash, EngineError> {
        let request = self.with_configured_api_key(request.clone());
        self.dispatch.deposit(&request, transport).await
    }

    /// 启动单笔交易流水线
    pub fn run_pipeline(
        &self,
        request: TransactionRequest,
        transport: Option<Arc<dyn HardwareTransport>>,
    ) -> TxStateStream<TransactionState> {
        let request = self.with_configured_api_key(request);
        self.pipeline.run(request, transport)
    }

    /// 启动双腿存入
    pub fn run_sym_deposit(
        &self,
        request: SymDepositRequest,
        asset_transport: Option<Arc<dyn HardwareTransport>>,
        native_transport: Option<Arc<dyn HardwareTransport>>,
    ) -> TxStateStream<SymDepositState> {
        let request = SymDepositRequest::new(
            self.with_configured_api_key(request.asset_leg),
            self.with_configured_api_key(request.native_leg),
        );
        self.sym_deposit
            .run(request, asset_transport, native_transport)
    }

    pub fn resolve_derivation_path(
        &self,
        chain: Chain,
        account: u32,
        index: u32,
        network: Network,
        mode: Option<HdMode>,
    ) -> DerivationDescriptor {
        derivation::resolve_derivation_path(chain, account, index, network, mode)
    }

    pub fn list_derivation_options(
        &self,
        chain: Chain,
        account: u32,
        index: u32,
        network: Network,
    ) -> Vec<DerivationOption> {
        derivation::list_derivation_options(chain, account, index, network)
    }

    /// 已启用且已接入客户端的链（按 `Chain::ALL` 顺序）
    pub fn list_supported_chains(&self, operation: Operation) -> Vec<Chain> {
        CHAIN_REGISTRY
            .list_supported_chains(operation)
            .into_iter()
            .filter(|chain| self.dispatch.has_handler(*chain, operation))
            .collect()
    }

    pub fn is_chain_enabled(&self, chain: Chain, operation: Operation) -> bool {
        CHAIN_REGISTRY.is_chain_enabled(chain, operation)
            && self.dispatch.has_handler(chain, operation)
    }

    /// 硬件钱包服务（未配置传输工厂时为 None）
    pub fn ledger(&self) -> Option<&LedgerTxService> {
        self.ledger.as_ref()
    }

    pub fn pipeline_config(&self) -> &PipelineConfig {
        &self.pipeline_config
    }

    fn with_configured_api_key(&self, request: TransactionRequest) -> TransactionRequest {
        self.api_keys.apply(request)
    }
}

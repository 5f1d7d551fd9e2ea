//! 测试辅助模块
//! 提供记录调用次数的适配器、池校验器、硬件传输以及常用请求构造

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use txforge::{
    config::{Config, PipelineConfig},
    domain::{
        ApiKey, Asset, BroadcastRequest, Chain, ChainAdapter, ChainParams, CosmosParams,
        EvmHdMode, EvmParams, FeeContext, FeeOption, FeeSelection, Fees, HardwareTransport,
        HdMode, Network, PoolAddress, PoolValidator, TransactionRequest, TransportFactory, TxHash,
        TxStatusReport, TxType, UtxoParams, WalletSelector,
    },
    TxEngine,
};

pub const ROUTER: &str = "0xD37BbE5744D730a1d98d8DC97c42F0Ca46aD7146";
pub const ETH_INBOUND: &str = "0x3f9b6f1a2e4c5d6e7f8091a2b3c4d5e6f7081920";
pub const BTC_INBOUND: &str = "bc1qpoolinboundaddress0000000000000000000";

// ============ 适配器 ============

#[derive(Debug, Default)]
pub struct CallCounts {
    pub get_address: AtomicUsize,
    pub estimate_fees: AtomicUsize,
    pub broadcast: AtomicUsize,
    pub poll_status: AtomicUsize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.get_address.load(Ordering::SeqCst)
            + self.estimate_fees.load(Ordering::SeqCst)
            + self.broadcast.load(Ordering::SeqCst)
            + self.poll_status.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub enum BroadcastBehavior {
    Hash(String),
    Empty,
    Fail(String),
}

/// 记录所有调用的链适配器
pub struct SpyAdapter {
    chain: Chain,
    pub calls: CallCounts,
    address: Mutex<Result<String, String>>,
    broadcast: Mutex<BroadcastBehavior>,
    statuses: Mutex<VecDeque<Result<TxStatusReport, String>>>,
    pub broadcasts: Mutex<Vec<BroadcastRequest>>,
    pub polled_tokens: Mutex<Vec<Option<String>>>,
    pub derivation_paths: Mutex<Vec<String>>,
}

impl SpyAdapter {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            calls: CallCounts::default(),
            address: Mutex::new(Ok(format!("{}-sender", chain.as_str().to_lowercase()))),
            broadcast: Mutex::new(BroadcastBehavior::Hash(format!(
                "{}-txhash",
                chain.as_str().to_lowercase()
            ))),
            statuses: Mutex::new(VecDeque::new()),
            broadcasts: Mutex::new(Vec::new()),
            polled_tokens: Mutex::new(Vec::new()),
            derivation_paths: Mutex::new(Vec::new()),
        }
    }

    pub fn arc(chain: Chain) -> Arc<Self> {
        Arc::new(Self::new(chain))
    }

    pub fn with_broadcast(self, behavior: BroadcastBehavior) -> Self {
        *self.broadcast.lock().unwrap() = behavior;
        self
    }

    pub fn with_address_error(self, msg: &str) -> Self {
        *self.address.lock().unwrap() = Err(msg.to_string());
        self
    }

    pub fn with_empty_address(self) -> Self {
        *self.address.lock().unwrap() = Ok(String::new());
        self
    }

    /// 依次返回的状态；用完后一直返回 Finalized
    pub fn with_statuses(self, statuses: Vec<Result<TxStatusReport, String>>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    pub fn broadcast_count(&self) -> usize {
        self.calls.broadcast.load(Ordering::SeqCst)
    }

    pub fn last_broadcast(&self) -> Option<BroadcastRequest> {
        self.broadcasts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChainAdapter for SpyAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn get_address(
        &self,
        _wallet: &WalletSelector,
        derivation_path: &str,
        _transport: Option<&dyn HardwareTransport>,
    ) -> Result<String> {
        self.calls.get_address.fetch_add(1, Ordering::SeqCst);
        self.derivation_paths
            .lock()
            .unwrap()
            .push(derivation_path.to_string());
        self.address.lock().unwrap().clone().map_err(|e| anyhow!(e))
    }

    async fn estimate_fees(&self, _ctx: &FeeContext) -> Result<Fees> {
        self.calls.estimate_fees.fetch_add(1, Ordering::SeqCst);
        Ok(Fees::Tiered {
            average: Decimal::new(5, 0),
            fast: Decimal::new(10, 0),
            fastest: Decimal::new(20, 0),
        })
    }

    async fn broadcast(
        &self,
        request: &BroadcastRequest,
        _transport: Option<&dyn HardwareTransport>,
    ) -> Result<TxHash> {
        self.calls.broadcast.fetch_add(1, Ordering::SeqCst);
        self.broadcasts.lock().unwrap().push(request.clone());
        match self.broadcast.lock().unwrap().clone() {
            BroadcastBehavior::Hash(hash) => Ok(hash),
            BroadcastBehavior::Empty => Ok(String::new()),
            BroadcastBehavior::Fail(msg) => Err(anyhow!(msg)),
        }
    }

    async fn poll_status(
        &self,
        _tx_hash: &str,
        token_address: Option<&str>,
    ) -> Result<TxStatusReport> {
        self.calls.poll_status.fetch_add(1, Ordering::SeqCst);
        self.polled_tokens
            .lock()
            .unwrap()
            .push(token_address.map(str::to_string));
        match self.statuses.lock().unwrap().pop_front() {
            Some(result) => result.map_err(|e| anyhow!(e)),
            None => Ok(TxStatusReport::Finalized),
        }
    }
}

// ============ 池校验 ============

/// 持有各链当前的入金地址，与请求中报价时的地址比对
pub struct MockPoolValidator {
    pools: HashMap<Chain, PoolAddress>,
    fail: AtomicBool,
    pub pool_calls: AtomicUsize,
    pub node_calls: AtomicUsize,
}

impl MockPoolValidator {
    pub fn new() -> Self {
        let mut pools = HashMap::new();
        pools.insert(Chain::Btc, btc_pool());
        pools.insert(Chain::Eth, eth_pool());
        Self {
            pools,
            fail: AtomicBool::new(false),
            pool_calls: AtomicUsize::new(0),
            node_calls: AtomicUsize::new(0),
        }
    }

    pub fn halted(mut self, chain: Chain) -> Self {
        if let Some(pool) = self.pools.get_mut(&chain) {
            pool.halted = true;
        }
        self
    }

    /// 入金地址已轮换，旧报价失效
    pub fn rotated(mut self, chain: Chain, address: &str) -> Self {
        if let Some(pool) = self.pools.get_mut(&chain) {
            pool.address = address.to_string();
        }
        self
    }

    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl PoolValidator for MockPoolValidator {
    async fn validate_pool_address(&self, pool: &PoolAddress, _network: Network) -> Result<()> {
        self.pool_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("inbound addresses unavailable"));
        }
        let current = self
            .pools
            .get(&pool.chain)
            .ok_or_else(|| anyhow!("no pool for {}", pool.chain))?;
        if current.halted {
            return Err(anyhow!("{} pool is halted", pool.chain));
        }
        if current.address != pool.address {
            return Err(anyhow!(
                "{} inbound address has rotated to {}",
                pool.chain,
                current.address
            ));
        }
        if current.router != pool.router {
            return Err(anyhow!("{} router has changed", pool.chain));
        }
        Ok(())
    }

    async fn validate_node(&self, chain: Chain, _network: Network) -> Result<()> {
        self.node_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("{} node unreachable", chain));
        }
        Ok(())
    }
}

// ============ 硬件传输 ============

#[derive(Clone, Default)]
pub struct MockTransport {
    pub close_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl HardwareTransport for MockTransport {
    fn device_id(&self) -> &str {
        "mock-ledger"
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockTransportFactory {
    pub transport: MockTransport,
    pub open_calls: AtomicUsize,
    pub fail_open: bool,
}

impl MockTransportFactory {
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn close_calls(&self) -> usize {
        self.transport.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn open(&self) -> Result<Box<dyn HardwareTransport>> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(anyhow!("no device connected"));
        }
        Ok(Box::new(self.transport.clone()))
    }
}

// ============ 配置与引擎 ============

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.logging.level = "debug".into();
    config.logging.format = "text".into();
    config.ledger.enabled = true;
    config.pipeline = PipelineConfig {
        tick_interval_ms: 5,
        poll_interval_ms: 10,
        confirmation_timeout_secs: 5,
        channel_capacity: 64,
    };
    config
}

pub fn build_engine(adapters: &[Arc<SpyAdapter>], validator: Arc<MockPoolValidator>) -> TxEngine {
    build_engine_with(test_config(), adapters, validator, None)
}

pub fn build_engine_with(
    config: Config,
    adapters: &[Arc<SpyAdapter>],
    validator: Arc<MockPoolValidator>,
    transports: Option<Arc<MockTransportFactory>>,
) -> TxEngine {
    let mut builder = TxEngine::builder(config).with_pool_validator(validator);
    for adapter in adapters {
        builder = builder.with_adapter(adapter.clone());
    }
    if let Some(factory) = transports {
        builder = builder.with_transport_factory(factory);
    }
    builder.build().expect("engine should build")
}

// ============ 请求 ============

pub fn fast_fee() -> Option<FeeSelection> {
    Some(FeeSelection::Tier(FeeOption::Fast))
}

pub fn btc_pool() -> PoolAddress {
    PoolAddress {
        chain: Chain::Btc,
        address: BTC_INBOUND.to_string(),
        router: None,
        halted: false,
    }
}

pub fn eth_pool() -> PoolAddress {
    PoolAddress {
        chain: Chain::Eth,
        address: ETH_INBOUND.to_string(),
        router: Some(ROUTER.to_string()),
        halted: false,
    }
}

/// 池操作带上报价时的入金地址
fn quoted(request: TransactionRequest, pool: PoolAddress) -> TransactionRequest {
    if request.tx_type.is_pool_operation() {
        request.with_pool(pool)
    } else {
        request
    }
}

pub fn btc_request(tx_type: TxType) -> TransactionRequest {
    let request = TransactionRequest::new(tx_type, Chain::Btc, 50_000)
        .with_recipient("bc1qrecipient000000000000000000000000000")
        .with_params(ChainParams::Utxo(UtxoParams {
            fee: fast_fee(),
            api_key: Some(ApiKey::new("btc-api-key")),
        }));
    quoted(request, btc_pool())
}

pub fn eth_request(tx_type: TxType, router: Option<&str>) -> TransactionRequest {
    let request = TransactionRequest::new(tx_type, Chain::Eth, 1_000_000_000_000_000)
        .with_asset(Asset::native(Chain::Eth))
        .with_recipient(ETH_INBOUND)
        .with_wallet(
            WalletSelector::keystore(0, 0).with_hd_mode(HdMode::Evm(EvmHdMode::Ledgerlive)),
        )
        .with_params(ChainParams::Evm(EvmParams {
            fee: fast_fee(),
            api_key: Some(ApiKey::new("eth-api-key")),
            router: router.map(str::to_string),
        }));
    quoted(request, eth_pool())
}

pub fn thor_deposit() -> TransactionRequest {
    TransactionRequest::new(TxType::Deposit, Chain::Thor, 100_000_000)
        .with_asset(Asset::native(Chain::Thor))
        .with_memo("+:BTC.BTC")
        .with_params(ChainParams::Cosmos(CosmosParams {
            fee_amount: None,
            node_url: Some("https://thornode.example".to_string()),
        }))
}

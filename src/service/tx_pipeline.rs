//! 交易流水线
//!
//! 单笔交易（发送 / 池存入 / 兑换 / 池提取）的三阶段执行：
//!
//! 1. 校验：池操作先校验入金地址（协议原生资产校验节点），再做派发表参数校验
//! 2. 签名广播：通过派发表执行，流水线不重试
//! 3. 确认：按间隔查询链上状态，等待期间按 tick 推进伪进度（上限 97）
//!
//! 每次运行一个 tokio 任务，状态快照通过有界 mpsc 通道推送给调用方的 `Stream`。
//! 调用方丢弃 stream 即取消：广播前取消不会提交交易，已开始的广播会完成，
//! 之后停止查询。

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures::Stream;
use tokio::{
    sync::mpsc,
    time::{interval, interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    config::PipelineConfig,
    domain::{
        adapter::{HardwareTransport, PoolValidator, TxStatusReport},
        chain_config::Operation,
        request::{TransactionRequest, TxHash, TxType},
        transaction_status::{TransactionState, TxFailure},
    },
    error::{EngineError, EngineErrorCode},
    service::dispatch::DispatchTable,
};

/// 确认阶段伪进度上限
pub const MAX_PENDING_PROGRESS: u8 = 97;

/// 各阶段进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProgressPlan {
    validate: u8,
    broadcast: u8,
    confirm: u8,
    /// 开始查询状态时的进度（发送流程额外一档）
    polling: Option<u8>,
}

impl ProgressPlan {
    fn for_tx_type(tx_type: TxType) -> Self {
        match tx_type {
            TxType::Send => Self {
                validate: 25,
                broadcast: 40,
                confirm: 70,
                polling: Some(85),
            },
            TxType::Deposit | TxType::Swap | TxType::Withdraw => Self {
                validate: 25,
                broadcast: 50,
                confirm: 75,
                polling: None,
            },
        }
    }
}

/// 状态快照流
pub struct TxStateStream<T = TransactionState> {
    run_id: Uuid,
    rx: mpsc::Receiver<T>,
}

impl<T> TxStateStream<T> {
    pub(crate) fn new(run_id: Uuid, rx: mpsc::Receiver<T>) -> Self {
        Self { run_id, rx }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// 消费整个流，返回最后一个快照
    pub async fn last(mut self) -> Option<T> {
        let mut last = None;
        while let Some(state) = self.rx.recv().await {
            last = Some(state);
        }
        last
    }
}

impl<T> Stream for TxStateStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// 状态发送端：保证进度不回退、终态只发一次
pub(crate) struct StateEmitter {
    tx: mpsc::Sender<TransactionState>,
    steps_total: u8,
    progress: u8,
    finished: bool,
}

impl StateEmitter {
    fn new(tx: mpsc::Sender<TransactionState>, steps_total: u8) -> Self {
        Self {
            tx,
            steps_total,
            progress: 0,
            finished: false,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }

    /// 返回 false 表示调用方已取消
    async fn send(&mut self, state: TransactionState) -> bool {
        if self.finished {
            return false;
        }
        self.tx.send(state).await.is_ok()
    }

    async fn initial(&mut self) -> bool {
        let state = TransactionState::initial(self.steps_total);
        self.send(state).await
    }

    async fn pending(&mut self, step: u8, progress: u8) -> bool {
        self.progress = self.progress.max(progress);
        let state = TransactionState::pending(step, self.steps_total, self.progress);
        self.send(state).await
    }

    async fn success(&mut self, tx_hash: TxHash) {
        let state = TransactionState::success(self.steps_total, tx_hash);
        self.send(state).await;
        self.finished = true;
    }

    async fn failure(&mut self, failure: TxFailure) {
        let state = TransactionState::failure(self.steps_total, failure);
        self.send(state).await;
        self.finished = true;
    }
}

#[async_trait]
impl ProgressSink for StateEmitter {
    fn is_cancelled(&self) -> bool {
        StateEmitter::is_cancelled(self)
    }

    fn current_progress(&self) -> u8 {
        self.progress
    }

    async fn advance(&mut self, step: u8, progress: u8) -> bool {
        self.pending(step, progress).await
    }
}

/// 确认阶段的伪进度接收端
#[async_trait]
pub(crate) trait ProgressSink: Send {
    fn is_cancelled(&self) -> bool;

    fn current_progress(&self) -> u8;

    /// 返回 false 表示调用方已取消
    async fn advance(&mut self, step: u8, progress: u8) -> bool;
}

/// 查询期间每个 tick 进度加 1，不超过 `cap`
pub(crate) struct ProgressTicks<'a, P: ProgressSink> {
    pub sink: &'a mut P,
    pub step: u8,
    pub cap: u8,
}

impl<'a, P: ProgressSink> ProgressTicks<'a, P> {
    pub fn new(sink: &'a mut P, step: u8, cap: u8) -> Self {
        Self { sink, step, cap }
    }

    /// 返回 false 表示调用方已取消
    async fn tick(&mut self) -> bool {
        if self.sink.is_cancelled() {
            return false;
        }
        let current = self.sink.current_progress();
        let next = current.saturating_add(1).min(self.cap);
        next <= current || self.sink.advance(self.step, next).await
    }
}

/// 交易流水线
pub struct TxPipeline {
    dispatch: Arc<DispatchTable>,
    pool_validator: Arc<dyn PoolValidator>,
    config: PipelineConfig,
}

impl TxPipeline {
    pub fn new(
        dispatch: Arc<DispatchTable>,
        pool_validator: Arc<dyn PoolValidator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            dispatch,
            pool_validator,
            config,
        }
    }

    /// 启动一次流水线运行
    ///
    /// 传输句柄由调用方持有并负责关闭，流水线只在运行期间使用。
    /// 必须在 tokio 运行时内调用。
    pub fn run(
        &self,
        request: TransactionRequest,
        transport: Option<Arc<dyn HardwareTransport>>,
    ) -> TxStateStream {
        let run_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let span = info_span!(
            "tx_pipeline",
            %run_id,
            chain = %request.chain,
            tx_type = %request.tx_type
        );

        let driver = PipelineDriver {
            dispatch: self.dispatch.clone(),
            pool_validator: self.pool_validator.clone(),
            config: self.config.clone(),
        };
        tokio::spawn(driver.drive(request, transport, tx).instrument(span));

        TxStateStream::new(run_id, rx)
    }
}

struct PipelineDriver {
    dispatch: Arc<DispatchTable>,
    pool_validator: Arc<dyn PoolValidator>,
    config: PipelineConfig,
}

impl PipelineDriver {
    async fn drive(
        self,
        request: TransactionRequest,
        transport: Option<Arc<dyn HardwareTransport>>,
        tx: mpsc::Sender<TransactionState>,
    ) {
        let plan = ProgressPlan::for_tx_type(request.tx_type);
        let mut emitter = StateEmitter::new(tx, request.tx_type.steps_total());
        let transport = transport.as_deref();

        if !emitter.initial().await {
            return;
        }

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // 阶段 1：校验
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        if !emitter.pending(1, plan.validate).await {
            debug!("Pipeline cancelled before validation");
            return;
        }

        let (request, operation) = match self.validate(request, transport).await {
            Ok(validated) => validated,
            Err(e) => {
                info!(code = %e.code, error = %e, "Pipeline failed at validation");
                emitter.failure(TxFailure::before_broadcast(1, e)).await;
                return;
            }
        };

        if emitter.is_cancelled() {
            debug!("Pipeline cancelled before broadcast");
            return;
        }

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // 阶段 2：签名广播
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        if !emitter.pending(2, plan.broadcast).await {
            debug!("Pipeline cancelled before broadcast");
            return;
        }

        let tx_hash = match self.dispatch.dispatch(operation, &request, transport).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(code = %e.code, error = %e, "Pipeline failed at broadcast");
                emitter.failure(TxFailure::during_broadcast(2, e)).await;
                return;
            }
        };
        info!(tx_hash = %tx_hash, "Transaction submitted");

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // 阶段 3：确认
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        if !emitter.pending(3, plan.confirm).await {
            debug!(tx_hash = %tx_hash, "Pipeline cancelled after broadcast, polling stopped");
            return;
        }
        if let Some(progress) = plan.polling {
            if !emitter.pending(3, progress).await {
                return;
            }
        }

        self.confirm(&request, tx_hash, &mut emitter).await;
    }

    /// 阶段 1：池 / 节点校验 + 参数校验，返回补全后的请求和派发表类型
    async fn validate(
        &self,
        request: TransactionRequest,
        transport: Option<&dyn HardwareTransport>,
    ) -> Result<(TransactionRequest, Operation), EngineError> {
        let request = if request.tx_type.is_pool_operation() {
            resolve_pool(self.pool_validator.as_ref(), request).await?
        } else {
            request
        };

        let operation = request.operation();
        self.dispatch.validate(operation, &request, transport)?;
        Ok((request, operation))
    }

    /// 阶段 3：查询链上状态直到终态
    async fn confirm(
        &self,
        request: &TransactionRequest,
        tx_hash: TxHash,
        emitter: &mut StateEmitter,
    ) {
        let outcome = poll_until_final(
            &self.dispatch,
            &self.config,
            request,
            &tx_hash,
            ProgressTicks::new(&mut *emitter, 3, MAX_PENDING_PROGRESS),
        )
        .await;

        match outcome {
            PollOutcome::Finalized => {
                info!(tx_hash = %tx_hash, "Transaction finalized");
                emitter.success(tx_hash).await;
            }
            PollOutcome::Failed(e) => {
                warn!(tx_hash = %tx_hash, code = %e.code, error = %e, "Transaction not confirmed");
                emitter
                    .failure(TxFailure::after_broadcast(3, e, tx_hash))
                    .await;
            }
            PollOutcome::Cancelled => {
                debug!(tx_hash = %tx_hash, "Pipeline cancelled while polling");
            }
        }
    }
}

/// 池操作的入金地址 / 节点校验
///
/// 协议原生资产（RUNE / CACAO）直接在协议链上存入，只需要节点可用；
/// 其他资产必须带上报价时的入金地址，校验通过后才会发往该地址。
pub(crate) async fn resolve_pool(
    validator: &dyn PoolValidator,
    request: TransactionRequest,
) -> Result<TransactionRequest, EngineError> {
    let asset = request.asset_or_native();

    if asset.chain.is_protocol_chain() && asset.is_native() {
        validator
            .validate_node(asset.chain, request.network)
            .await
            .map_err(|e| EngineError::from_adapter(EngineErrorCode::ValidatePoolFailed, &e))?;
        debug!(chain = %asset.chain, "Protocol node validated");
        return Ok(request);
    }

    let Some(pool) = request.pool.clone() else {
        return Err(EngineError::invalid_data(format!(
            "Pool address needs to be defined to {} on {}",
            request.tx_type,
            request.chain.display_name()
        )));
    };
    if pool.chain != request.chain {
        return Err(EngineError::invalid_data(format!(
            "Pool address for {} given for a {} transaction",
            pool.chain, request.chain
        )));
    }

    if pool.halted {
        return Err(EngineError::validate_pool_failed(format!(
            "{} pool is halted",
            request.chain
        )));
    }
    if pool.address.trim().is_empty() {
        return Err(EngineError::validate_pool_failed(format!(
            "Empty pool address returned for {}",
            request.chain
        )));
    }

    validator
        .validate_pool_address(&pool, request.network)
        .await
        .map_err(|e| EngineError::from_adapter(EngineErrorCode::ValidatePoolFailed, &e))?;

    debug!(chain = %request.chain, pool = %pool.address, "Pool address validated");
    Ok(request.route_to_pool(&pool))
}

pub(crate) enum PollOutcome {
    Finalized,
    Failed(EngineError),
    Cancelled,
}

/// 查询链上状态直到终态、超时或调用方取消
///
/// 等待期间按 tick 推进伪进度。
pub(crate) async fn poll_until_final<P: ProgressSink>(
    dispatch: &DispatchTable,
    config: &PipelineConfig,
    request: &TransactionRequest,
    tx_hash: &str,
    mut ticks: ProgressTicks<'_, P>,
) -> PollOutcome {
    let Some(adapter) = dispatch.adapter(request.chain).cloned() else {
        return PollOutcome::Failed(EngineError::tx_status_failed(format!(
            "No client registered to check {} transactions",
            request.chain
        )));
    };
    let token_address = request.asset.as_ref().and_then(|a| a.evm_token_address());

    let tick_period = config.tick_interval();
    let mut ticker = interval_at(Instant::now() + tick_period, tick_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut poller = interval(config.poll_interval());
    poller.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = tokio::time::sleep(config.confirmation_timeout());
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !ticks.tick().await {
                    return PollOutcome::Cancelled;
                }
            }
            _ = poller.tick() => {
                if ticks.sink.is_cancelled() {
                    return PollOutcome::Cancelled;
                }
                match adapter.poll_status(tx_hash, token_address).await {
                    Ok(TxStatusReport::Finalized) => return PollOutcome::Finalized,
                    Ok(TxStatusReport::Pending) => {
                        debug!(tx_hash = %tx_hash, "Transaction still pending");
                    }
                    Ok(TxStatusReport::Failed(reason)) => {
                        return PollOutcome::Failed(EngineError::tx_failed_on_chain(reason));
                    }
                    Err(e) => {
                        return PollOutcome::Failed(EngineError::from_adapter(
                            EngineErrorCode::TxStatusFailed,
                            &e,
                        ));
                    }
                }
            }
            _ = &mut deadline => {
                return PollOutcome::Failed(EngineError::tx_status_failed(format!(
                    "Transaction {} not confirmed within {}s",
                    tx_hash,
                    config.confirmation_timeout_secs
                )));
            }
        }
    }
}

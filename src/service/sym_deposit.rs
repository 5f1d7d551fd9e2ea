//! 对称（双腿）流动性存入
//!
//! 外部链资产和协议原生资产（RUNE / CACAO）各提交一笔交易：
//!
//! 1. 校验池地址和协议节点
//! 2. 广播资产腿（等待用户签名）
//! 3. 广播原生腿（等待用户签名）
//! 4. 确认资产腿
//! 5. 确认原生腿
//!
//! 只有硬件钱包的腿在广播时标记等待用户；确认阶段按 tick 推进伪进度，
//! 资产腿不超过原生腿确认的起点。
//!
//! 一腿转出而另一腿失败时以 `PartialSuccess` 结束，不做任何补偿。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    config::PipelineConfig,
    domain::{
        adapter::{HardwareTransport, PoolValidator},
        request::{TransactionRequest, TxHash, TxType},
        transaction_status::{
            CompletedLeg, DepositLeg, SymDepositState, SymDepositStatus, TxFailure,
        },
    },
    error::EngineError,
    service::{
        dispatch::DispatchTable,
        tx_pipeline::{
            poll_until_final, resolve_pool, PollOutcome, ProgressSink, ProgressTicks,
            TxStateStream, MAX_PENDING_PROGRESS,
        },
    },
};

/// 双腿存入请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymDepositRequest {
    /// 外部链资产腿
    pub asset_leg: TransactionRequest,
    /// 协议原生资产腿（THOR / MAYA 上的 RUNE / CACAO）
    pub native_leg: TransactionRequest,
}

impl SymDepositRequest {
    pub fn new(asset_leg: TransactionRequest, native_leg: TransactionRequest) -> Self {
        Self {
            asset_leg,
            native_leg,
        }
    }

    fn check_shape(&self) -> Result<(), EngineError> {
        if self.asset_leg.tx_type != TxType::Deposit || self.native_leg.tx_type != TxType::Deposit
        {
            return Err(EngineError::invalid_data(
                "Both legs of a symmetric deposit must be deposits",
            ));
        }
        if !self.native_leg.chain.is_protocol_chain() || !self.native_leg.asset_or_native().is_native()
        {
            return Err(EngineError::invalid_data(format!(
                "Native leg must deposit the protocol asset, got {}",
                self.native_leg.asset_or_native()
            )));
        }
        if self.asset_leg.chain.is_protocol_chain() {
            return Err(EngineError::invalid_data(format!(
                "Asset leg must be on an external chain, got {}",
                self.asset_leg.chain
            )));
        }
        Ok(())
    }
}

/// 进度
const VALIDATE_PROGRESS: u8 = 20;
const ASSET_BROADCAST_PROGRESS: u8 = 40;
const NATIVE_BROADCAST_PROGRESS: u8 = 60;
const ASSET_CONFIRM_PROGRESS: u8 = 80;
const NATIVE_CONFIRM_PROGRESS: u8 = 90;

struct SymEmitter {
    tx: mpsc::Sender<SymDepositState>,
    progress: u8,
}

impl SymEmitter {
    fn new(tx: mpsc::Sender<SymDepositState>) -> Self {
        Self { tx, progress: 0 }
    }

    fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }

    async fn pending(&mut self, step: u8, progress: u8, waiting_for_user: bool) -> bool {
        self.progress = self.progress.max(progress);
        self.tx
            .send(SymDepositState::pending(step, self.progress, waiting_for_user))
            .await
            .is_ok()
    }

    async fn finish(self, step: u8, status: SymDepositStatus) {
        let _ = self.tx.send(SymDepositState::terminal(step, status)).await;
    }
}

#[async_trait]
impl ProgressSink for SymEmitter {
    fn is_cancelled(&self) -> bool {
        SymEmitter::is_cancelled(self)
    }

    fn current_progress(&self) -> u8 {
        self.progress
    }

    async fn advance(&mut self, step: u8, progress: u8) -> bool {
        self.pending(step, progress, false).await
    }
}

/// 双腿存入执行器
pub struct SymDepositPipeline {
    dispatch: Arc<DispatchTable>,
    pool_validator: Arc<dyn PoolValidator>,
    config: PipelineConfig,
}

impl SymDepositPipeline {
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

    /// 启动一次双腿存入
    ///
    /// `asset_transport` / `native_transport` 分别用于两条腿的签名，
    /// 同一台设备时传入同一个句柄即可。
    pub fn run(
        &self,
        request: SymDepositRequest,
        asset_transport: Option<Arc<dyn HardwareTransport>>,
        native_transport: Option<Arc<dyn HardwareTransport>>,
    ) -> TxStateStream<SymDepositState> {
        let run_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let span = info_span!(
            "sym_deposit",
            %run_id,
            asset_chain = %request.asset_leg.chain,
            native_chain = %request.native_leg.chain
        );

        let driver = SymDepositDriver {
            dispatch: self.dispatch.clone(),
            pool_validator: self.pool_validator.clone(),
            config: self.config.clone(),
        };
        tokio::spawn(
            driver
                .drive(request, asset_transport, native_transport, SymEmitter::new(tx))
                .instrument(span),
        );

        TxStateStream::new(run_id, rx)
    }
}

struct SymDepositDriver {
    dispatch: Arc<DispatchTable>,
    pool_validator: Arc<dyn PoolValidator>,
    config: PipelineConfig,
}

impl SymDepositDriver {
    async fn drive(
        self,
        request: SymDepositRequest,
        asset_transport: Option<Arc<dyn HardwareTransport>>,
        native_transport: Option<Arc<dyn HardwareTransport>>,
        mut emitter: SymEmitter,
    ) {
        let asset_transport = asset_transport.as_deref();
        let native_transport = native_transport.as_deref();

        if emitter
            .tx
            .send(SymDepositState::initial())
            .await
            .is_err()
        {
            return;
        }

        // 1. 校验
        if !emitter.pending(1, VALIDATE_PROGRESS, false).await {
            return;
        }
        let (asset_leg, native_leg) = match self
            .validate(request, asset_transport, native_transport)
            .await
        {
            Ok(legs) => legs,
            Err(e) => {
                info!(code = %e.code, error = %e, "Symmetric deposit failed at validation");
                let failure = TxFailure::before_broadcast(1, e);
                emitter.finish(1, SymDepositStatus::Failure(failure)).await;
                return;
            }
        };

        // 2. 资产腿，硬件钱包需要用户在设备上确认
        let asset_waiting = asset_leg.wallet.is_hardware();
        if emitter.is_cancelled()
            || !emitter
                .pending(2, ASSET_BROADCAST_PROGRESS, asset_waiting)
                .await
        {
            debug!("Symmetric deposit cancelled before broadcast");
            return;
        }
        let asset_tx = match self
            .dispatch
            .dispatch(asset_leg.operation(), &asset_leg, asset_transport)
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                warn!(code = %e.code, error = %e, "Asset leg broadcast failed");
                let failure = TxFailure::during_broadcast(2, e);
                emitter.finish(2, SymDepositStatus::Failure(failure)).await;
                return;
            }
        };
        info!(tx_hash = %asset_tx, "Asset leg submitted");

        // 3. 原生腿
        let native_waiting = native_leg.wallet.is_hardware();
        if !emitter
            .pending(3, NATIVE_BROADCAST_PROGRESS, native_waiting)
            .await
        {
            warn!(tx_hash = %asset_tx, "Symmetric deposit cancelled after asset leg, native leg not sent");
            return;
        }
        let native_tx = match self
            .dispatch
            .dispatch(native_leg.operation(), &native_leg, native_transport)
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                warn!(code = %e.code, error = %e, "Native leg broadcast failed");
                let status = SymDepositStatus::PartialSuccess {
                    completed: CompletedLeg {
                        leg: DepositLeg::Asset,
                        tx_hash: asset_tx,
                    },
                    failed: TxFailure::during_broadcast(3, e),
                };
                emitter.finish(3, status).await;
                return;
            }
        };
        info!(tx_hash = %native_tx, "Native leg submitted");

        // 4. 确认资产腿
        if !emitter.pending(4, ASSET_CONFIRM_PROGRESS, false).await {
            return;
        }
        let asset_ticks = ProgressTicks::new(&mut emitter, 4, NATIVE_CONFIRM_PROGRESS - 1);
        let Some(asset_result) = self.confirm(&asset_leg, &asset_tx, asset_ticks).await else {
            return;
        };

        // 5. 确认原生腿
        if !emitter.pending(5, NATIVE_CONFIRM_PROGRESS, false).await {
            return;
        }
        let native_ticks = ProgressTicks::new(&mut emitter, 5, MAX_PENDING_PROGRESS);
        let Some(native_result) = self.confirm(&native_leg, &native_tx, native_ticks).await else {
            return;
        };

        let (step, status) = settle(asset_tx, asset_result, native_tx, native_result);
        emitter.finish(step, status).await;
    }

    async fn validate(
        &self,
        request: SymDepositRequest,
        asset_transport: Option<&dyn HardwareTransport>,
        native_transport: Option<&dyn HardwareTransport>,
    ) -> Result<(TransactionRequest, TransactionRequest), EngineError> {
        request.check_shape()?;

        let validator = self.pool_validator.as_ref();
        let asset_leg = resolve_pool(validator, request.asset_leg).await?;
        let native_leg = resolve_pool(validator, request.native_leg).await?;

        self.dispatch
            .validate(asset_leg.operation(), &asset_leg, asset_transport)?;
        self.dispatch
            .validate(native_leg.operation(), &native_leg, native_transport)?;

        Ok((asset_leg, native_leg))
    }

    /// None 表示调用方已取消
    async fn confirm(
        &self,
        request: &TransactionRequest,
        tx_hash: &str,
        ticks: ProgressTicks<'_, SymEmitter>,
    ) -> Option<Result<(), EngineError>> {
        match poll_until_final(&self.dispatch, &self.config, request, tx_hash, ticks).await {
            PollOutcome::Finalized => Some(Ok(())),
            PollOutcome::Failed(e) => Some(Err(e)),
            PollOutcome::Cancelled => None,
        }
    }
}

/// 根据两条腿的确认结果决定终态
fn settle(
    asset_tx: TxHash,
    asset_result: Result<(), EngineError>,
    native_tx: TxHash,
    native_result: Result<(), EngineError>,
) -> (u8, SymDepositStatus) {
    match (asset_result, native_result) {
        (Ok(()), Ok(())) => (
            5,
            SymDepositStatus::Success {
                asset_tx,
                native_tx,
            },
        ),
        (Ok(()), Err(e)) => (
            5,
            SymDepositStatus::PartialSuccess {
                completed: CompletedLeg {
                    leg: DepositLeg::Asset,
                    tx_hash: asset_tx,
                },
                failed: TxFailure::after_broadcast(5, e, native_tx),
            },
        ),
        (Err(e), Ok(())) => (
            4,
            SymDepositStatus::PartialSuccess {
                completed: CompletedLeg {
                    leg: DepositLeg::Native,
                    tx_hash: native_tx,
                },
                failed: TxFailure::after_broadcast(4, e, asset_tx),
            },
        ),
        (Err(e), Err(_)) => (
            4,
            SymDepositStatus::Failure(TxFailure::after_broadcast(4, e, asset_tx)),
        ),
    }
}

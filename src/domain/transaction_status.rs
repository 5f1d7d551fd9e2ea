//! 交易流水线状态定义
//!
//! 流水线每个挂起点对外发出一个状态快照（按值传递）。
//! 状态只能前进：进度不回退，终态之后不再发出任何快照。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{domain::request::TxHash, error::EngineError};

/// 终态失败
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxFailure {
    pub error: EngineError,
    /// 失败发生的步骤（1-based）
    pub step: u8,
    /// 资金未被动用，调用方可以直接重试
    pub retry_safe: bool,
    /// 已广播的交易哈希（广播之后的失败才会有）
    #[serde(default)]
    pub tx_hash: Option<TxHash>,
}

impl TxFailure {
    /// 广播前失败：资金未动，可以重试
    pub fn before_broadcast(step: u8, error: EngineError) -> Self {
        Self {
            error,
            step,
            retry_safe: true,
            tx_hash: None,
        }
    }

    /// 广播阶段失败：只有确定未提交的错误才允许重试，其余情况交易可能已经到达节点
    pub fn during_broadcast(step: u8, error: EngineError) -> Self {
        Self {
            retry_safe: error.code.is_pre_broadcast(),
            error,
            step,
            tx_hash: None,
        }
    }

    /// 广播后失败（确认阶段）
    pub fn after_broadcast(step: u8, error: EngineError, tx_hash: TxHash) -> Self {
        Self {
            error,
            step,
            retry_safe: false,
            tx_hash: Some(tx_hash),
        }
    }

    /// 可读错误信息："<kind>: <message>"
    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

/// 单笔交易状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum TxStatus {
    Initial,
    Pending { progress: u8 },
    Failure(TxFailure),
    Success { tx_hash: TxHash },
}

impl TxStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Failure(_) | Self::Success { .. })
    }

    pub fn progress(&self) -> u8 {
        match self {
            Self::Initial => 0,
            Self::Pending { progress } => *progress,
            Self::Failure(_) | Self::Success { .. } => 100,
        }
    }

    /// 状态机阶段序号，用于校验单调性
    fn rank(&self) -> u8 {
        match self {
            Self::Initial => 0,
            Self::Pending { .. } => 1,
            Self::Failure(_) | Self::Success { .. } => 2,
        }
    }

    /// 验证状态转换合法性
    pub fn can_transition_to(&self, target: &Self) -> bool {
        if self.is_final() {
            return false;
        }
        match (self, target) {
            (Self::Pending { progress: from }, Self::Pending { progress: to }) => to >= from,
            _ => target.rank() >= self.rank(),
        }
    }
}

/// 流水线状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionState {
    /// 当前步骤（1-based，Initial 时为 0）
    pub step: u8,
    pub steps_total: u8,
    pub status: TxStatus,
    pub updated_at: DateTime<Utc>,
}

impl TransactionState {
    pub fn initial(steps_total: u8) -> Self {
        Self {
            step: 0,
            steps_total,
            status: TxStatus::Initial,
            updated_at: Utc::now(),
        }
    }

    pub fn pending(step: u8, steps_total: u8, progress: u8) -> Self {
        Self {
            step,
            steps_total,
            status: TxStatus::Pending {
                progress: progress.min(100),
            },
            updated_at: Utc::now(),
        }
    }

    pub fn success(steps_total: u8, tx_hash: TxHash) -> Self {
        Self {
            step: steps_total,
            steps_total,
            status: TxStatus::Success { tx_hash },
            updated_at: Utc::now(),
        }
    }

    pub fn failure(steps_total: u8, failure: TxFailure) -> Self {
        Self {
            step: failure.step,
            steps_total,
            status: TxStatus::Failure(failure),
            updated_at: Utc::now(),
        }
    }

    pub fn is_final(&self) -> bool {
        self.status.is_final()
    }

    pub fn progress(&self) -> u8 {
        self.status.progress()
    }

    pub fn tx_hash(&self) -> Option<&str> {
        match &self.status {
            TxStatus::Success { tx_hash } => Some(tx_hash),
            TxStatus::Failure(failure) => failure.tx_hash.as_deref(),
            TxStatus::Initial | TxStatus::Pending { .. } => None,
        }
    }
}

/// 双腿存入中已完成的一腿
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedLeg {
    pub leg: DepositLeg,
    pub tx_hash: TxHash,
}

/// 双腿存入的腿
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositLeg {
    /// 外部链资产
    Asset,
    /// 协议原生资产 (RUNE / CACAO)
    Native,
}

/// 双腿（对称）存入状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum SymDepositStatus {
    Initial,
    Pending {
        progress: u8,
    },
    Failure(TxFailure),
    /// 一腿已转出资金，另一腿失败；不做补偿
    PartialSuccess {
        completed: CompletedLeg,
        failed: TxFailure,
    },
    Success {
        asset_tx: TxHash,
        native_tx: TxHash,
    },
}

impl SymDepositStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Initial | Self::Pending { .. })
    }

    pub fn progress(&self) -> u8 {
        match self {
            Self::Initial => 0,
            Self::Pending { progress } => *progress,
            _ => 100,
        }
    }
}

/// 双腿存入状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymDepositState {
    pub step: u8,
    pub steps_total: u8,
    /// 等待用户在设备 / 钱包上确认签名
    pub waiting_for_user: bool,
    pub status: SymDepositStatus,
    pub updated_at: DateTime<Utc>,
}

impl SymDepositState {
    pub const STEPS_TOTAL: u8 = 5;

    pub fn initial() -> Self {
        Self {
            step: 0,
            steps_total: Self::STEPS_TOTAL,
            waiting_for_user: false,
            status: SymDepositStatus::Initial,
            updated_at: Utc::now(),
        }
    }

    pub fn pending(step: u8, progress: u8, waiting_for_user: bool) -> Self {
        Self {
            step,
            steps_total: Self::STEPS_TOTAL,
            waiting_for_user,
            status: SymDepositStatus::Pending {
                progress: progress.min(100),
            },
            updated_at: Utc::now(),
        }
    }

    pub fn terminal(step: u8, status: SymDepositStatus) -> Self {
        Self {
            step,
            steps_total: Self::STEPS_TOTAL,
            waiting_for_user: false,
            status,
            updated_at: Utc::now(),
        }
    }

    pub fn is_final(&self) -> bool {
        self.status.is_final()
    }

    pub fn progress(&self) -> u8 {
        self.status.progress()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> TxFailure {
        TxFailure::before_broadcast(1, EngineError::validate_pool_failed("halted"))
    }

    #[test]
    fn test_status_transitions() {
        let initial = TxStatus::Initial;
        let p25 = TxStatus::Pending { progress: 25 };
        let p50 = TxStatus::Pending { progress: 50 };
        let done = TxStatus::Success {
            tx_hash: "0xabc".into(),
        };

        assert!(initial.can_transition_to(&p25));
        assert!(p25.can_transition_to(&p50));
        assert!(p50.can_transition_to(&done));
        assert!(initial.can_transition_to(&TxStatus::Failure(failure())));

        // 进度不回退
        assert!(!p50.can_transition_to(&p25));
        assert!(!p25.can_transition_to(&initial));

        // 终态不可转换
        assert!(!done.can_transition_to(&p50));
        assert!(!TxStatus::Failure(failure()).can_transition_to(&done));
    }

    #[test]
    fn test_failure_state_keeps_step() {
        let state = TransactionState::failure(3, failure());
        assert_eq!(state.step, 1);
        assert!(state.is_final());
        assert_eq!(state.tx_hash(), None);

        match &state.status {
            TxStatus::Failure(f) => {
                assert!(f.retry_safe);
                assert_eq!(f.message(), "Pool validation failed: halted");
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_after_broadcast_failure_is_not_retry_safe() {
        let f = TxFailure::after_broadcast(
            3,
            EngineError::tx_failed_on_chain("reverted"),
            "0xdead".into(),
        );
        assert!(!f.retry_safe);
        assert_eq!(
            TransactionState::failure(3, f).tx_hash(),
            Some("0xdead")
        );
    }

    #[test]
    fn test_pending_progress_is_clamped() {
        assert_eq!(TransactionState::pending(3, 3, 150).progress(), 100);
    }

    #[test]
    fn test_sym_deposit_terminals() {
        assert!(!SymDepositStatus::Pending { progress: 20 }.is_final());
        assert!(SymDepositStatus::PartialSuccess {
            completed: CompletedLeg {
                leg: DepositLeg::Asset,
                tx_hash: "0x1".into(),
            },
            failed: failure(),
        }
        .is_final());
        assert_eq!(SymDepositState::initial().steps_total, 5);
    }

    #[test]
    fn test_serialize_status_tag() {
        let json = serde_json::to_value(TransactionState::pending(2, 3, 40)).unwrap();
        assert_eq!(json["status"]["status"], "pending");
        assert_eq!(json["status"]["data"]["progress"], 40);
    }
}

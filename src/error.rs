use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::chain_config::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorCode {
    // 校验阶段（不会触达适配器）
    InvalidData,
    NotImplemented,

    // 适配器调用阶段
    GetAddressFailed,
    SendTxFailed,
    DepositTxFailed,
    InvalidResponse,

    // 流水线阶段
    ValidatePoolFailed,
    TxStatusFailed,
    TxFailedOnChain,

    // 硬件设备
    TransportFailed,
}

impl EngineErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidData => "invalid_data",
            Self::NotImplemented => "not_implemented",
            Self::GetAddressFailed => "get_address_failed",
            Self::SendTxFailed => "send_tx_failed",
            Self::DepositTxFailed => "deposit_tx_failed",
            Self::InvalidResponse => "invalid_response",
            Self::ValidatePoolFailed => "validate_pool_failed",
            Self::TxStatusFailed => "tx_status_failed",
            Self::TxFailedOnChain => "tx_failed_on_chain",
            Self::TransportFailed => "transport_failed",
        }
    }

    /// 面向用户的错误类别描述
    pub fn title(&self) -> &'static str {
        match self {
            Self::InvalidData => "Invalid transaction data",
            Self::NotImplemented => "Not supported",
            Self::GetAddressFailed => "Could not get sender address",
            Self::SendTxFailed => "Sending transaction failed",
            Self::DepositTxFailed => "Deposit transaction failed",
            Self::InvalidResponse => "Invalid response from chain client",
            Self::ValidatePoolFailed => "Pool validation failed",
            Self::TxStatusFailed => "Checking transaction status failed",
            Self::TxFailedOnChain => "Transaction failed on chain",
            Self::TransportFailed => "Hardware wallet connection failed",
        }
    }

    /// 错误一定发生在交易提交之前（资金未动）
    pub fn is_pre_broadcast(&self) -> bool {
        matches!(
            self,
            Self::InvalidData
                | Self::NotImplemented
                | Self::GetAddressFailed
                | Self::ValidatePoolFailed
                | Self::TransportFailed
        )
    }
}

impl fmt::Display for EngineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 引擎统一错误类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{}: {message}", .code.title())]
pub struct EngineError {
    pub code: EngineErrorCode,
    pub message: String,
}

impl EngineError {
    pub fn new(code: EngineErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
        }
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::InvalidData, msg)
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::NotImplemented, msg)
    }

    pub fn get_address_failed(msg: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::GetAddressFailed, msg)
    }

    pub fn send_tx_failed(msg: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::SendTxFailed, msg)
    }

    pub fn deposit_tx_failed(msg: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::DepositTxFailed, msg)
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::InvalidResponse, msg)
    }

    pub fn validate_pool_failed(msg: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::ValidatePoolFailed, msg)
    }

    pub fn tx_status_failed(msg: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::TxStatusFailed, msg)
    }

    pub fn tx_failed_on_chain(msg: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::TxFailedOnChain, msg)
    }

    pub fn transport_failed(msg: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::TransportFailed, msg)
    }

    /// 适配器调用失败，按派发表类型归类
    pub fn tx_failed(operation: Operation, msg: impl Into<String>) -> Self {
        match operation {
            Operation::Send => Self::send_tx_failed(msg),
            Operation::Deposit => Self::deposit_tx_failed(msg),
        }
    }

    /// 从适配器错误转换，保留底层错误链信息
    pub fn from_adapter(code: EngineErrorCode, err: &anyhow::Error) -> Self {
        Self::new(code, format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_human_readable() {
        let err = EngineError::invalid_data("Fee option needs to be set");
        assert_eq!(
            err.to_string(),
            "Invalid transaction data: Fee option needs to be set"
        );
    }

    #[test]
    fn test_tx_failed_by_operation() {
        assert_eq!(
            EngineError::tx_failed(Operation::Send, "x").code,
            EngineErrorCode::SendTxFailed
        );
        assert_eq!(
            EngineError::tx_failed(Operation::Deposit, "x").code,
            EngineErrorCode::DepositTxFailed
        );
    }

    #[test]
    fn test_from_adapter_keeps_context() {
        let err = anyhow::anyhow!("connection refused").context("broadcast failed");
        let mapped = EngineError::from_adapter(EngineErrorCode::SendTxFailed, &err);
        assert_eq!(mapped.message, "broadcast failed: connection refused");
    }

    #[test]
    fn test_serialize_code() {
        let json = serde_json::to_value(EngineError::not_implemented("SOL")).unwrap();
        assert_eq!(json["code"], "not_implemented");
    }
}

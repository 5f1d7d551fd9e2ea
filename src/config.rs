//! 配置管理模块
//! 支持从环境变量（含 .env）和配置文件加载配置

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{
    chain_config::Chain,
    request::{ApiKey, ChainParams, TransactionRequest},
};

/// 引擎配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub api_keys: ApiKeysConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// 交易流水线配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 确认阶段伪进度的刷新间隔
    pub tick_interval_ms: u64,
    /// 链上状态查询间隔
    pub poll_interval_ms: u64,
    /// 确认阶段最长等待时间
    pub confirmation_timeout_secs: u64,
    /// 状态通道容量
    pub channel_capacity: usize,
}

/// 硬件钱包配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub enabled: bool,
}

/// 数据提供方 API key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    #[serde(default)]
    pub btc: Option<ApiKey>,
    #[serde(default)]
    pub ltc: Option<ApiKey>,
    #[serde(default)]
    pub doge: Option<ApiKey>,
    #[serde(default)]
    pub dash: Option<ApiKey>,
    #[serde(default)]
    pub eth: Option<ApiKey>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: std::env::var("PIPELINE_TICK_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1500),
            poll_interval_ms: std::env::var("PIPELINE_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5000),
            confirmation_timeout_secs: std::env::var("PIPELINE_CONFIRMATION_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1800),
            channel_capacity: std::env::var("PIPELINE_CHANNEL_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(32),
        }
    }
}

impl PipelineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: std::env::var("LEDGER_ENABLED")
                .ok()
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
        }
    }
}

/// 开关值标准化："true"/"1"/"yes"/"on" 视为开启，其余关闭
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

impl ApiKeysConfig {
    pub fn from_env() -> Self {
        let key = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(ApiKey::new)
        };
        Self {
            btc: key("BTC_API_KEY"),
            ltc: key("LTC_API_KEY"),
            doge: key("DOGE_API_KEY"),
            dash: key("DASH_API_KEY"),
            eth: key("ETH_API_KEY"),
        }
    }

    /// 链对应的 API key
    pub fn for_chain(&self, chain: Chain) -> Option<&ApiKey> {
        match chain {
            Chain::Btc => self.btc.as_ref(),
            Chain::Ltc => self.ltc.as_ref(),
            Chain::Doge => self.doge.as_ref(),
            Chain::Dash => self.dash.as_ref(),
            Chain::Eth => self.eth.as_ref(),
            _ => None,
        }
    }

    /// 请求未携带 API key 时使用配置中的 key
    pub fn apply(&self, mut request: TransactionRequest) -> TransactionRequest {
        let Some(key) = self.for_chain(request.chain) else {
            return request;
        };
        match &mut request.params {
            ChainParams::Utxo(params) if params.api_key.is_none() => {
                params.api_key = Some(key.clone());
            }
            ChainParams::Evm(params) if params.api_key.is_none() => {
                params.api_key = Some(key.clone());
            }
            _ => {}
        }
        request
    }
}

impl Config {
    /// 从环境变量加载配置（先读取 .env）
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            logging: LoggingConfig::default(),
            pipeline: PipelineConfig::default(),
            ledger: LedgerConfig::default(),
            api_keys: ApiKeysConfig::from_env(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        if self.pipeline.tick_interval_ms == 0 || self.pipeline.poll_interval_ms == 0 {
            anyhow::bail!("Pipeline tick and poll intervals must be greater than zero");
        }

        if self.pipeline.channel_capacity == 0 {
            anyhow::bail!("PIPELINE_CHANNEL_CAPACITY must be greater than zero");
        }

        if self.pipeline.confirmation_timeout_secs == 0 {
            anyhow::bail!("PIPELINE_CONFIRMATION_TIMEOUT_SECS must be greater than zero");
        }

        Ok(())
    }
}

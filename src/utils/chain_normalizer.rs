//! 链标识符标准化模块
//!
//! 统一处理外部传入的链标识符（符号、全称、别名），映射到封闭的 `Chain` 枚举

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::domain::chain_config::Chain;

/// 链别名配置
struct ChainAliases {
    chain: Chain,
    aliases: &'static [&'static str],
}

/// 别名注册表（静态初始化，键均为小写）
static ALIAS_REGISTRY: Lazy<HashMap<String, Chain>> = Lazy::new(|| {
    let entries = [
        ChainAliases {
            chain: Chain::Btc,
            aliases: &["bitcoin"],
        },
        ChainAliases {
            chain: Chain::Bch,
            aliases: &["bitcoincash", "bitcoin cash"],
        },
        ChainAliases {
            chain: Chain::Ltc,
            aliases: &["litecoin"],
        },
        ChainAliases {
            chain: Chain::Doge,
            aliases: &["dogecoin"],
        },
        ChainAliases {
            chain: Chain::Dash,
            aliases: &[],
        },
        ChainAliases {
            chain: Chain::Zec,
            aliases: &["zcash"],
        },
        ChainAliases {
            chain: Chain::Eth,
            aliases: &["ethereum"],
        },
        ChainAliases {
            chain: Chain::Bsc,
            aliases: &["binance", "bnb"],
        },
        ChainAliases {
            chain: Chain::Avax,
            aliases: &["avalanche"],
        },
        ChainAliases {
            chain: Chain::Arb,
            aliases: &["arbitrum"],
        },
        ChainAliases {
            chain: Chain::Base,
            aliases: &[],
        },
        ChainAliases {
            chain: Chain::Gaia,
            aliases: &["cosmos", "atom"],
        },
        ChainAliases {
            chain: Chain::Thor,
            aliases: &["thorchain", "rune"],
        },
        ChainAliases {
            chain: Chain::Maya,
            aliases: &["mayachain", "cacao"],
        },
        ChainAliases {
            chain: Chain::Kuji,
            aliases: &["kujira"],
        },
        ChainAliases {
            chain: Chain::Xrp,
            aliases: &["ripple"],
        },
        ChainAliases {
            chain: Chain::Sol,
            aliases: &["solana"],
        },
        ChainAliases {
            chain: Chain::Tron,
            aliases: &["trx"],
        },
        ChainAliases {
            chain: Chain::Xrd,
            aliases: &["radix"],
        },
        ChainAliases {
            chain: Chain::Ada,
            aliases: &["cardano"],
        },
    ];

    let mut registry = HashMap::new();
    for entry in entries {
        // 注册规范标识符
        registry.insert(entry.chain.as_str().to_lowercase(), entry.chain);

        for alias in entry.aliases {
            registry.insert(alias.to_string(), entry.chain);
        }
    }

    registry
});

/// 标准化链标识符
///
/// # 示例
/// ```rust
/// # use txforge::utils::chain_normalizer::normalize_chain_identifier;
/// # use txforge::domain::Chain;
/// assert_eq!(normalize_chain_identifier("BTC").unwrap(), Chain::Btc);
/// assert_eq!(normalize_chain_identifier("Ethereum").unwrap(), Chain::Eth);
/// ```
pub fn normalize_chain_identifier(input: &str) -> anyhow::Result<Chain> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        anyhow::bail!("Chain identifier cannot be empty");
    }

    ALIAS_REGISTRY
        .get(&trimmed.to_lowercase())
        .copied()
        .ok_or_else(|| anyhow::anyhow!("Unsupported chain identifier: {}", trimmed))
}

//! 硬件钱包派生路径解析
//!
//! 根据 (链, 账户, 地址索引, 网络, HD 模式) 计算 Ledger 使用的派生路径和可读描述。
//! 纯函数，无缓存、无隐藏状态；未知链回落到默认 BIP44 路径。

use std::{fmt, str::FromStr};

use anyhow::Context;
use coins_bip32::path::DerivationPath;
use serde::{Deserialize, Serialize};

use crate::domain::chain_config::{Chain, ChainFamily, Network};

/// UTXO 链派生模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtxoHdMode {
    /// BIP84 native segwit
    P2wpkh,
    /// BIP86 taproot
    P2tr,
}

/// EVM 链派生模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvmHdMode {
    /// m/44'/60'/{account}'/0/{index}
    Ledgerlive,
    /// m/44'/60'/0'/{account}/{index}
    Legacy,
    /// m/44'/60'/0'/0/{index}
    Metamask,
}

/// HD 模式（字符串形式与前端/配置保持一致：`p2wpkh`、`ledgerlive`...）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HdMode {
    /// 未指定，由链自行选择默认方案
    Default,
    Utxo(UtxoHdMode),
    Evm(EvmHdMode),
}

impl HdMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Utxo(UtxoHdMode::P2wpkh) => "p2wpkh",
            Self::Utxo(UtxoHdMode::P2tr) => "p2tr",
            Self::Evm(EvmHdMode::Ledgerlive) => "ledgerlive",
            Self::Evm(EvmHdMode::Legacy) => "legacy",
            Self::Evm(EvmHdMode::Metamask) => "metamask",
        }
    }
}

impl fmt::Display for HdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HdMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "p2wpkh" => Ok(Self::Utxo(UtxoHdMode::P2wpkh)),
            "p2tr" => Ok(Self::Utxo(UtxoHdMode::P2tr)),
            "ledgerlive" => Ok(Self::Evm(EvmHdMode::Ledgerlive)),
            "legacy" => Ok(Self::Evm(EvmHdMode::Legacy)),
            "metamask" => Ok(Self::Evm(EvmHdMode::Metamask)),
            other => anyhow::bail!("Unknown HD mode: {}", other),
        }
    }
}

impl TryFrom<String> for HdMode {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HdMode> for String {
    fn from(mode: HdMode) -> Self {
        mode.as_str().to_string()
    }
}

/// 派生路径及可读描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationDescriptor {
    pub path: String,
    pub description: String,
}

impl DerivationDescriptor {
    fn new(path: String, label: &str) -> Self {
        let description = format!("{} ({})", label, path);
        Self { path, description }
    }

    /// 解析为 BIP32 派生路径，供设备 API 使用
    pub fn to_bip32(&self) -> anyhow::Result<DerivationPath> {
        self.path
            .parse::<DerivationPath>()
            .with_context(|| format!("Invalid derivation path: {}", self.path))
    }
}

/// 多方案链的一个可选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationOption {
    pub mode: Option<HdMode>,
    #[serde(flatten)]
    pub descriptor: DerivationDescriptor,
}

/// 默认 BIP44 路径（未知链仍需给设备一个可尝试的路径）
pub fn default_derivation_path(account: u32, index: u32) -> DerivationDescriptor {
    DerivationDescriptor::new(
        format!("m/44'/0'/{}'/0/{}", account, index),
        "Default BIP44",
    )
}

/// 解析派生路径
///
/// # Arguments
/// * `chain` - 链
/// * `account` - 账户索引
/// * `index` - 地址索引
/// * `network` - 网络，只影响区分主网/测试网的链的 coin type
/// * `mode` - HD 模式，单方案链忽略；多方案链缺省或无法识别时使用最常见方案
pub fn resolve_derivation_path(
    chain: Chain,
    account: u32,
    index: u32,
    network: Network,
    mode: Option<HdMode>,
) -> DerivationDescriptor {
    let bip44 = |coin_type: u32, label: &str| {
        DerivationDescriptor::new(
            format!("m/44'/{}'/{}'/0/{}", coin_type, account, index),
            label,
        )
    };

    match chain {
        Chain::Btc => {
            let coin_type = match network {
                Network::Testnet => 1,
                Network::Mainnet | Network::Stagenet => 0,
            };
            match mode {
                Some(HdMode::Utxo(UtxoHdMode::P2tr)) => DerivationDescriptor::new(
                    format!("m/86'/{}'/{}'/0/{}", coin_type, account, index),
                    "Taproot P2TR",
                ),
                // p2wpkh 兼容性最好，缺省和无法识别的模式都走这里
                _ => DerivationDescriptor::new(
                    format!("m/84'/{}'/{}'/0/{}", coin_type, account, index),
                    "Native Segwit P2WPKH",
                ),
            }
        }
        Chain::Bch => bip44(145, "BIP44"),
        Chain::Ltc => DerivationDescriptor::new(
            format!("m/84'/2'/{}'/0/{}", account, index),
            "P2WPKH",
        ),
        Chain::Dash => bip44(5, "BIP44"),
        Chain::Doge => bip44(3, "BIP44"),
        Chain::Zec => bip44(133, "Zcash"),

        Chain::Eth | Chain::Bsc | Chain::Avax | Chain::Arb | Chain::Base => {
            let evm_mode = match mode {
                Some(HdMode::Evm(evm_mode)) => evm_mode,
                _ => EvmHdMode::Ledgerlive,
            };
            match evm_mode {
                EvmHdMode::Ledgerlive => DerivationDescriptor::new(
                    format!("m/44'/60'/{}'/0/{}", account, index),
                    "Ledger Live",
                ),
                EvmHdMode::Legacy => DerivationDescriptor::new(
                    format!("m/44'/60'/0'/{}/{}", account, index),
                    "Legacy",
                ),
                EvmHdMode::Metamask => DerivationDescriptor::new(
                    format!("m/44'/60'/0'/0/{}", index),
                    "MetaMask",
                ),
            }
        }

        Chain::Gaia => bip44(118, "Cosmos"),
        Chain::Thor => bip44(931, "THORChain"),
        Chain::Maya => bip44(931, "MAYAChain"),
        Chain::Kuji => bip44(118, "Kujira"),

        Chain::Ada => bip44(1815, "Cardano"),
        Chain::Xrp => bip44(144, "Ripple"),
        Chain::Sol => bip44(501, "Solana"),
        Chain::Xrd => bip44(1022, "Radix"),
        Chain::Tron => bip44(195, "Tron"),
    }
}

/// 通过链标识符解析派生路径，无法识别的链回落到默认 BIP44 路径
pub fn resolve_derivation_path_for_id(
    chain_id: &str,
    account: u32,
    index: u32,
    network: Network,
    mode: Option<HdMode>,
) -> DerivationDescriptor {
    match chain_id.parse::<Chain>() {
        Ok(chain) => resolve_derivation_path(chain, account, index, network, mode),
        Err(e) => {
            tracing::debug!(chain_id = %chain_id, error = %e, "Unknown chain, using default BIP44 path");
            default_derivation_path(account, index)
        }
    }
}

/// 链是否支持多种派生方案
pub fn supports_multiple_derivation_paths(chain: Chain) -> bool {
    matches!(chain, Chain::Btc) || chain.family() == ChainFamily::Evm
}

/// 可选派生方案（按展示顺序，第一个为默认方案）
fn derivation_modes(chain: Chain) -> Vec<Option<HdMode>> {
    match chain {
        Chain::Btc => vec![
            Some(HdMode::Utxo(UtxoHdMode::P2wpkh)),
            Some(HdMode::Utxo(UtxoHdMode::P2tr)),
        ],
        c if c.family() == ChainFamily::Evm => vec![
            Some(HdMode::Evm(EvmHdMode::Ledgerlive)),
            Some(HdMode::Evm(EvmHdMode::Legacy)),
            Some(HdMode::Evm(EvmHdMode::Metamask)),
        ],
        _ => vec![None],
    }
}

/// 列出链支持的所有派生方案，单方案链返回一个元素
pub fn list_derivation_options(
    chain: Chain,
    account: u32,
    index: u32,
    network: Network,
) -> Vec<DerivationOption> {
    derivation_modes(chain)
        .into_iter()
        .map(|mode| DerivationOption {
            mode,
            descriptor: resolve_derivation_path(chain, account, index, network, mode),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_btc_modes() {
        let taproot = resolve_derivation_path(
            Chain::Btc,
            0,
            3,
            Network::Mainnet,
            Some(HdMode::Utxo(UtxoHdMode::P2tr)),
        );
        assert_eq!(taproot.path, "m/86'/0'/0'/0/3");
        assert!(taproot.description.contains("Taproot"));

        let segwit = resolve_derivation_path(
            Chain::Btc,
            0,
            3,
            Network::Mainnet,
            Some(HdMode::Utxo(UtxoHdMode::P2wpkh)),
        );
        assert_eq!(segwit.path, "m/84'/0'/0'/0/3");
        assert!(segwit.description.contains("Native Segwit"));
    }

    #[test]
    fn test_btc_default_and_foreign_mode() {
        let none = resolve_derivation_path(Chain::Btc, 1, 2, Network::Mainnet, None);
        let evm = resolve_derivation_path(
            Chain::Btc,
            1,
            2,
            Network::Mainnet,
            Some(HdMode::Evm(EvmHdMode::Legacy)),
        );
        assert_eq!(none.path, "m/84'/0'/1'/0/2");
        assert_eq!(none, evm);
    }

    #[test]
    fn test_network_only_changes_coin_type() {
        let testnet = resolve_derivation_path(
            Chain::Btc,
            0,
            0,
            Network::Testnet,
            Some(HdMode::Utxo(UtxoHdMode::P2tr)),
        );
        assert_eq!(testnet.path, "m/86'/1'/0'/0/0");

        let stagenet = resolve_derivation_path(Chain::Btc, 0, 0, Network::Stagenet, None);
        assert_eq!(stagenet.path, "m/84'/0'/0'/0/0");

        // 单方案链不受网络影响
        let thor_main = resolve_derivation_path(Chain::Thor, 0, 0, Network::Mainnet, None);
        let thor_test = resolve_derivation_path(Chain::Thor, 0, 0, Network::Testnet, None);
        assert_eq!(thor_main, thor_test);
    }

    #[test]
    fn test_evm_modes() {
        let chain = Chain::Eth;
        let live = resolve_derivation_path(chain, 2, 5, Network::Mainnet, None);
        assert_eq!(live.path, "m/44'/60'/2'/0/5");

        let legacy = resolve_derivation_path(
            chain,
            2,
            5,
            Network::Mainnet,
            Some(HdMode::Evm(EvmHdMode::Legacy)),
        );
        assert_eq!(legacy.path, "m/44'/60'/0'/2/5");

        let metamask = resolve_derivation_path(
            chain,
            2,
            5,
            Network::Mainnet,
            Some(HdMode::Evm(EvmHdMode::Metamask)),
        );
        assert_eq!(metamask.path, "m/44'/60'/0'/0/5");
    }

    #[test]
    fn test_single_scheme_ignores_mode() {
        let plain = resolve_derivation_path(Chain::Ltc, 0, 1, Network::Mainnet, None);
        let with_mode = resolve_derivation_path(
            Chain::Ltc,
            0,
            1,
            Network::Mainnet,
            Some(HdMode::Utxo(UtxoHdMode::P2tr)),
        );
        assert_eq!(plain, with_mode);
        assert_eq!(plain.path, "m/84'/2'/0'/0/1");
    }

    #[test]
    fn test_unknown_chain_falls_back() {
        let descriptor = resolve_derivation_path_for_id("FOO", 4, 7, Network::Mainnet, None);
        assert_eq!(descriptor.path, "m/44'/0'/4'/0/7");
        assert!(descriptor.description.starts_with("Default BIP44"));

        let known = resolve_derivation_path_for_id("thorchain", 0, 0, Network::Mainnet, None);
        assert_eq!(known.path, "m/44'/931'/0'/0/0");
    }

    #[test]
    fn test_options_are_reproducible() {
        for chain in Chain::ALL {
            let options = list_derivation_options(chain, 1, 9, Network::Mainnet);
            if supports_multiple_derivation_paths(chain) {
                assert!(options.len() >= 2, "{} should list several schemes", chain);
            } else {
                assert_eq!(options.len(), 1);
            }
            for option in options {
                let again = resolve_derivation_path(chain, 1, 9, Network::Mainnet, option.mode);
                assert_eq!(again, option.descriptor);
            }
        }
    }

    #[test]
    fn test_paths_parse_as_bip32() {
        for chain in Chain::ALL {
            for option in list_derivation_options(chain, 0, 0, Network::Mainnet) {
                let parsed = option.descriptor.to_bip32().unwrap();
                assert_eq!(parsed.len(), 5, "{}", option.descriptor.path);
            }
        }
    }

    #[test]
    fn test_hd_mode_parse() {
        assert_eq!(
            "P2TR".parse::<HdMode>().unwrap(),
            HdMode::Utxo(UtxoHdMode::P2tr)
        );
        assert_eq!(
            "ledgerlive".parse::<HdMode>().unwrap(),
            HdMode::Evm(EvmHdMode::Ledgerlive)
        );
        assert!("bip9000".parse::<HdMode>().is_err());

        let json = serde_json::to_string(&HdMode::Evm(EvmHdMode::Metamask)).unwrap();
        assert_eq!(json, "\"metamask\"");
        let mode: HdMode = serde_json::from_str("\"default\"").unwrap();
        assert_eq!(mode, HdMode::Default);
    }
}

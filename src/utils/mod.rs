pub mod chain_normalizer;

pub use chain_normalizer::normalize_chain_identifier;

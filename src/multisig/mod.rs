//! Threshold addresses: redeem-script registry and its rediscovery sweep

pub mod rediscovery;
pub mod registry;

pub use rediscovery::{rediscover, RediscoveryReport, RediscoverySweep};
pub use registry::{
    compute_threshold_address, parse_public_key, RedeemScriptRegistry, ThresholdAddress,
    ThresholdPolicy,
};

//! 客户端层错误定义

use std::io;

use thiserror::Error;

use ugo_driver::DriverError;
use ugo_wire::JointId;

/// 配置校验与加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    EmptyAddress { field: &'static str },

    #[error("{field} must not be port 0")]
    ZeroPort { field: &'static str },

    #[error("{side} joint id set is empty")]
    EmptyIdSet { side: &'static str },

    #[error("joint id {id} appears in both the left and right sets")]
    OverlappingIdSets { id: JointId },

    #[error("joint id {id} appears more than once")]
    DuplicateId { id: JointId },

    #[error("limit for joint {id}: lower {lower} must be strictly less than upper {upper}")]
    InvalidLimit { id: JointId, lower: f64, upper: f64 },

    #[error("limit entry references unknown joint id {id}")]
    UnknownLimitId { id: JointId },

    #[error("default limits: lower {lower} must be strictly less than upper {upper}")]
    InvalidDefaultLimits { lower: f64, upper: f64 },

    #[error("alias '{alias}' maps to unknown joint id {id}")]
    UnknownAliasTarget { alias: String, id: JointId },

    #[error("gain {gain} is outside [0, 1]")]
    InvalidGain { gain: f64 },

    #[error("{field} must be a non-negative finite number, got {value}")]
    InvalidRate { field: &'static str, value: f64 },

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// 桥接层错误
///
/// 下层错误通过 `#[from]` 透传，桥自身只新增连接状态类错误。
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("bridge is already connected")]
    AlreadyConnected,

    #[error("bridge is not connected")]
    NotConnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidLimit {
            id: 11,
            lower: 10.0,
            upper: -10.0,
        };
        assert_eq!(
            err.to_string(),
            "limit for joint 11: lower 10 must be strictly less than upper -10"
        );
    }

    #[test]
    fn test_bridge_error_from_config() {
        let err: BridgeError = ConfigError::InvalidGain { gain: 1.5 }.into();
        assert_eq!(err.to_string(), "gain 1.5 is outside [0, 1]");
    }

    #[test]
    fn test_bridge_error_from_driver() {
        let err: BridgeError = DriverError::InvalidInput("x".to_string()).into();
        assert!(matches!(err, BridgeError::Driver(_)));
    }
}

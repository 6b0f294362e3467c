//! Run configuration.
//!
//! Every field has a default, so a JSON document only needs the values it changes:
//!
//! ```
//! use parsa::config::{NeighborSetMode, PartitionConfig};
//!
//! let config = PartitionConfig::from_json_str(r#"{ "num_partitions": 4, "neighbor_set": "exact" }"#)
//!     .unwrap();
//! assert_eq!(config.num_partitions, 4);
//! assert_eq!(config.neighbor_set, NeighborSetMode::Exact);
//! assert_eq!(config.block_size, 100_000);
//! ```

use crate::error::{PartitionError, Result};
use crate::sync::MAX_PARTITIONS;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Representation of the per-partition neighbor sets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborSetMode {
    /// Hash sets: no false positives, memory grows with the key count.
    Exact,
    /// Bloom filters of `n * hash_count * 1.44 * bits_ratio` bits.
    Approximate {
        /// Number of hash functions (k).
        hash_count: u32,
        /// Bits-per-element safety margin.
        bits_ratio: f64,
    },
}

impl Default for NeighborSetMode {
    fn default() -> Self {
        NeighborSetMode::Approximate {
            hash_count: 4,
            bits_ratio: 1.0,
        }
    }
}

/// Configuration of one partitioning worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartitionConfig {
    /// Number of partitions K, at most [`MAX_PARTITIONS`].
    pub num_partitions: usize,
    /// Examples per block.
    pub block_size: usize,
    /// Byte budget of each pipeline's buffer.
    pub data_buffer_bytes: usize,
    /// Neighbor-set representation.
    pub neighbor_set: NeighborSetMode,
    /// Highest cost kept in a dense bucket by the cost trackers.
    pub cost_cache_limit: u32,
    /// Extra attempts for a pull or push that failed transiently.
    pub sync_retries: u32,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            num_partitions: 8,
            block_size: 100_000,
            data_buffer_bytes: 1 << 30,
            neighbor_set: NeighborSetMode::default(),
            cost_cache_limit: 64,
            sync_retries: 0,
        }
    }
}

impl PartitionConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks that the configuration can drive a run.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(PartitionError::InvalidConfig(reason));
        if self.num_partitions == 0 {
            return invalid("num_partitions must be at least 1".into());
        }
        if self.num_partitions > MAX_PARTITIONS {
            return invalid(format!(
                "num_partitions {} exceeds the partition mask width {MAX_PARTITIONS}",
                self.num_partitions
            ));
        }
        if self.block_size == 0 {
            return invalid("block_size must be at least 1".into());
        }
        if self.data_buffer_bytes == 0 {
            return invalid("data_buffer_bytes must be positive".into());
        }
        if let NeighborSetMode::Approximate {
            hash_count,
            bits_ratio,
        } = self.neighbor_set
        {
            if hash_count == 0 {
                return invalid("hash_count must be at least 1".into());
            }
            if !(bits_ratio.is_finite() && bits_ratio > 0.0) {
                return invalid(format!("bits_ratio must be positive and finite, got {bits_ratio}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        PartitionConfig::default().validate().unwrap();
    }

    #[test]
    fn test_json_round_trip_keeps_mode() {
        let config = PartitionConfig {
            num_partitions: 3,
            neighbor_set: NeighborSetMode::Approximate {
                hash_count: 6,
                bits_ratio: 2.5,
            },
            ..PartitionConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(PartitionConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            PartitionConfig {
                num_partitions: 0,
                ..PartitionConfig::default()
            },
            PartitionConfig {
                num_partitions: 65,
                ..PartitionConfig::default()
            },
            PartitionConfig {
                block_size: 0,
                ..PartitionConfig::default()
            },
            PartitionConfig {
                data_buffer_bytes: 0,
                ..PartitionConfig::default()
            },
            PartitionConfig {
                neighbor_set: NeighborSetMode::Approximate {
                    hash_count: 0,
                    bits_ratio: 1.0,
                },
                ..PartitionConfig::default()
            },
            PartitionConfig {
                neighbor_set: NeighborSetMode::Approximate {
                    hash_count: 4,
                    bits_ratio: f64::NAN,
                },
                ..PartitionConfig::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(PartitionError::InvalidConfig(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_unknown_field_is_a_json_error() {
        let err = PartitionConfig::from_json_str(r#"{ "partitions": 4 }"#).unwrap_err();
        assert!(matches!(err, PartitionError::Json(_)));
    }
}

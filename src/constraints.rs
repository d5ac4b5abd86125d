//! Constraint Table - Accepted Input Ranges
//!
//! Static bounds shared by the validator and the engine contract.

use serde::{Deserialize, Serialize};

pub const MIB: u64 = 1024 * 1024;

/// Inclusive numeric range with the value a fresh form starts from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub min: u32,
    pub max: u32,
    pub default: u32,
}

impl Bound {
    pub const fn new(min: u32, max: u32, default: u32) -> Self {
        Self { min, max, default }
    }

    /// True when `value` is a number inside `[min, max]`.
    pub fn admits(&self, value: f64) -> bool {
        !value.is_nan() && value >= f64::from(self.min) && value <= f64::from(self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintTable {
    pub max_upload_bytes: u64,
    pub accepted_media_types: Vec<String>,
    pub num_colors: Bound,
    pub max_width: Bound,
    pub min_region_size: Bound,
}

impl ConstraintTable {
    pub fn standard() -> Self {
        Self {
            max_upload_bytes: 15 * MIB,
            accepted_media_types: vec![
                "image/png".to_string(),
                "image/jpeg".to_string(),
                "image/jpg".to_string(),
            ],
            num_colors: Bound::new(3, 16, 10),
            max_width: Bound::new(400, 4000, 2550),
            min_region_size: Bound::new(50, 500, 300),
        }
    }

    pub fn accepts_media_type(&self, media_type: &str) -> bool {
        self.accepted_media_types.iter().any(|t| t == media_type)
    }

    /// Upload ceiling in whole megabytes, as shown to users.
    pub fn max_upload_mb(&self) -> u64 {
        (self.max_upload_bytes as f64 / MIB as f64).round() as u64
    }
}

impl Default for ConstraintTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_matches_engine_limits() {
        let table = ConstraintTable::standard();
        assert_eq!(table.max_upload_bytes, 15_728_640);
        assert_eq!(table.max_upload_mb(), 15);
        assert_eq!(table.num_colors, Bound::new(3, 16, 10));
        assert_eq!(table.max_width.default, 2550);
        assert_eq!(table.min_region_size.default, 300);
    }

    #[test]
    fn test_bound_is_inclusive_and_rejects_nan() {
        let b = Bound::new(3, 16, 10);
        assert!(b.admits(3.0));
        assert!(b.admits(16.0));
        assert!(!b.admits(2.0));
        assert!(!b.admits(17.0));
        assert!(!b.admits(f64::NAN));
        assert!(b.admits(4.5));
        assert!(!b.admits(16.5));
    }

    #[test]
    fn test_media_types() {
        let table = ConstraintTable::default();
        assert!(table.accepts_media_type("image/png"));
        assert!(table.accepts_media_type("image/jpeg"));
        assert!(table.accepts_media_type("image/jpg"));
        assert!(!table.accepts_media_type("image/gif"));
    }
}

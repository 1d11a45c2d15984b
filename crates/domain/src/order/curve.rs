//! Size curves: fixed per-size unit mixes sold as bundles.
//!
//! A curve is written as comma-separated `count/size` pairs, so `"1/37,2/38"`
//! is one unit of size 37 and two of size 38 per bundle.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::OrderError;

/// A parsed size curve: units per bundle for each size, ordered by size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveSpec {
    units: BTreeMap<i32, i32>,
}

impl CurveSpec {
    /// Parses a curve, summing repeated sizes.
    pub fn parse(spec: &str) -> Result<Self, OrderError> {
        let invalid = |reason: &str| OrderError::InvalidCurve {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        if spec.trim().is_empty() {
            return Err(invalid("empty curve"));
        }

        let mut units: BTreeMap<i32, i32> = BTreeMap::new();
        for pair in spec.split(',') {
            let pair = pair.trim();
            let (count, size) = pair
                .split_once('/')
                .ok_or_else(|| invalid(&format!("'{pair}' is not a count/size pair")))?;
            let count: i32 = count
                .trim()
                .parse()
                .map_err(|_| invalid(&format!("count in '{pair}' is not an integer")))?;
            let size: i32 = size
                .trim()
                .parse()
                .map_err(|_| invalid(&format!("size in '{pair}' is not an integer")))?;
            if count <= 0 {
                return Err(invalid(&format!("count in '{pair}' must be positive")));
            }
            if size <= 0 {
                return Err(invalid(&format!("size in '{pair}' must be positive")));
            }
            let entry = units.entry(size).or_default();
            *entry = entry
                .checked_add(count)
                .ok_or_else(|| invalid("count overflow"))?;
        }

        Ok(Self { units })
    }

    /// Units per bundle for each size, ordered by size.
    pub fn sizes(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.units.iter().map(|(&size, &count)| (size, count))
    }

    /// Units in one bundle.
    pub fn units_per_bundle(&self) -> i64 {
        self.units.values().map(|&count| i64::from(count)).sum()
    }

    /// Expands `bundles` bundles into (size, quantity) pairs.
    pub fn expand(&self, bundles: i32) -> Result<Vec<(i32, i32)>, OrderError> {
        if bundles <= 0 {
            return Err(OrderError::InvalidQuantity { quantity: bundles });
        }
        self.sizes()
            .map(|(size, count)| {
                count
                    .checked_mul(bundles)
                    .map(|quantity| (size, quantity))
                    .ok_or_else(|| OrderError::InvalidCurve {
                        spec: self.to_string(),
                        reason: format!("{bundles} bundles overflow the quantity of size {size}"),
                    })
            })
            .collect()
    }
}

impl FromStr for CurveSpec {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CurveSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .sizes()
            .map(|(size, count)| format!("{count}/{size}"))
            .collect();
        write!(f, "{}", pairs.join(","))
    }
}

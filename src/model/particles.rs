//! Particle occurrence bounds
//!
//! Occurrence constraints (minOccurs, maxOccurs) for elements, groups and
//! wildcards.
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#p

use crate::error::{Result, SchemaStructureError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Occurrence bounds for a particle (minOccurs, maxOccurs)
/// None for max means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occurs {
    /// Minimum number of occurrences (default 1)
    pub min: u32,
    /// Maximum number of occurrences (None = unbounded, default 1)
    pub max: Option<u32>,
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Default occurrence (1, 1)
    pub fn once() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Optional occurrence (0, 1)
    pub fn optional() -> Self {
        Self { min: 0, max: Some(1) }
    }

    /// Zero or more (0, unbounded)
    pub fn zero_or_more() -> Self {
        Self { min: 0, max: None }
    }

    /// One or more (1, unbounded)
    pub fn one_or_more() -> Self {
        Self { min: 1, max: None }
    }

    /// Check if this particle can be absent (minOccurs == 0)
    pub fn is_emptiable(&self) -> bool {
        self.min == 0
    }

    /// Check if this particle can never occur (maxOccurs == 0)
    pub fn is_prohibited(&self) -> bool {
        self.max == Some(0)
    }

    /// Check if occurrence count is under the minimum
    pub fn is_missing(&self, count: u64) -> bool {
        count < u64::from(self.min)
    }

    /// Check if occurrence count is at or over the maximum
    pub fn is_over(&self, count: u64) -> bool {
        match self.max {
            Some(max) => count >= u64::from(max),
            None => false,
        }
    }
}

impl Default for Occurs {
    fn default() -> Self {
        Self::once()
    }
}

impl fmt::Display for Occurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "[{}..{}]", self.min, max),
            None => write!(f, "[{}..*]", self.min),
        }
    }
}

/// Parse minOccurs/maxOccurs from XML attribute values
pub fn parse_occurs(min_occurs: Option<&str>, max_occurs: Option<&str>) -> Result<Occurs> {
    let mut occurs = Occurs::once();

    if let Some(min_str) = min_occurs {
        occurs.min = min_str.trim().parse::<u32>().map_err(|_| {
            SchemaStructureError::new("minOccurs value is not a valid non-negative integer")
                .with_component(min_str)
        })?;
    }

    match max_occurs.map(str::trim) {
        Some("unbounded") => occurs.max = None,
        Some(max_str) => {
            let max = max_str.parse::<u32>().map_err(|_| {
                SchemaStructureError::new(
                    "maxOccurs value must be a non-negative integer or 'unbounded'",
                )
                .with_component(max_str)
            })?;
            if occurs.min > max {
                return Err(SchemaStructureError::new(
                    "maxOccurs must be 'unbounded' or greater than minOccurs",
                )
                .into());
            }
            occurs.max = Some(max);
        }
        None => {
            // Default maxOccurs is 1, but must be >= minOccurs
            if occurs.min > 1 {
                return Err(SchemaStructureError::new(
                    "minOccurs must be lesser or equal than maxOccurs",
                )
                .into());
            }
        }
    }

    Ok(occurs)
}

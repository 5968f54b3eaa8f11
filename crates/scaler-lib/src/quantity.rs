//! Kubernetes resource quantity parsing
//!
//! Splits a quantity string such as `250m`, `1.5Gi` or `128e6` into its
//! magnitude and suffix, then converts it to the canonical units used by the
//! scaler: millicores for cpu and mebibytes for memory.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Errors raised while parsing a quantity string
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,
    #[error("invalid number in quantity '{0}'")]
    InvalidNumber(String),
    #[error("unknown suffix '{suffix}' in quantity '{input}'")]
    UnknownSuffix { input: String, suffix: String },
    #[error("quantity '{0}' must not be negative")]
    Negative(String),
    #[error("quantity '{0}' is not finite")]
    NotFinite(String),
}

/// Unit suffix of a quantity
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Suffix {
    /// Decimal SI suffix, stored as a power of ten (`m` is -3, `k` is 3)
    Decimal(i32),
    /// Binary suffix, stored as a power of 1024 (`Ki` is 1, `Mi` is 2)
    Binary(i32),
    /// Decimal exponent notation (`e3`, `E-2`)
    Exponent(i32),
}

impl Suffix {
    fn parse(input: &str, suffix: &str) -> Result<Self, QuantityError> {
        let parsed = match suffix {
            "n" => Suffix::Decimal(-9),
            "u" => Suffix::Decimal(-6),
            "m" => Suffix::Decimal(-3),
            "" => Suffix::Decimal(0),
            "k" => Suffix::Decimal(3),
            "M" => Suffix::Decimal(6),
            "G" => Suffix::Decimal(9),
            "T" => Suffix::Decimal(12),
            "P" => Suffix::Decimal(15),
            "E" => Suffix::Decimal(18),
            "Ki" => Suffix::Binary(1),
            "Mi" => Suffix::Binary(2),
            "Gi" => Suffix::Binary(3),
            "Ti" => Suffix::Binary(4),
            "Pi" => Suffix::Binary(5),
            "Ei" => Suffix::Binary(6),
            other => {
                let exponent = other
                    .strip_prefix('e')
                    .or_else(|| other.strip_prefix('E'))
                    .and_then(|exp| exp.parse::<i32>().ok());
                match exponent {
                    Some(exp) => Suffix::Exponent(exp),
                    None => {
                        return Err(QuantityError::UnknownSuffix {
                            input: input.to_string(),
                            suffix: other.to_string(),
                        })
                    }
                }
            }
        };
        Ok(parsed)
    }

    /// Multiplier from the magnitude to base units
    pub fn multiplier(&self) -> f64 {
        match self {
            Suffix::Decimal(exp) | Suffix::Exponent(exp) => 10f64.powi(*exp),
            Suffix::Binary(exp) => KIB.powi(*exp),
        }
    }
}

/// A quantity split into magnitude and suffix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedQuantity {
    pub magnitude: f64,
    pub suffix: Suffix,
}

impl ParsedQuantity {
    /// Value in base units (cores for cpu, bytes for memory)
    pub fn base_value(&self) -> f64 {
        self.magnitude * self.suffix.multiplier()
    }
}

impl FromStr for ParsedQuantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Parse a quantity string into magnitude and suffix
pub fn parse(input: &str) -> Result<ParsedQuantity, QuantityError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(QuantityError::Empty);
    }

    let split = trimmed
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == '+' || *c == '-'))
        .map(|(idx, _)| idx)
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);

    if number.starts_with('-') {
        return Err(QuantityError::Negative(input.to_string()));
    }

    let magnitude: f64 = number
        .parse()
        .map_err(|_| QuantityError::InvalidNumber(input.to_string()))?;
    if !magnitude.is_finite() {
        return Err(QuantityError::NotFinite(input.to_string()));
    }

    let suffix = Suffix::parse(input, suffix)?;
    let parsed = ParsedQuantity { magnitude, suffix };
    if !parsed.base_value().is_finite() {
        return Err(QuantityError::NotFinite(input.to_string()));
    }

    Ok(parsed)
}

/// Resource dimension a profile catalog is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Cpu,
    Memory,
}

impl ResourceType {
    /// Resource name as used in container resource maps
    pub fn resource_name(&self) -> &'static str {
        match self {
            ResourceType::Cpu => "cpu",
            ResourceType::Memory => "memory",
        }
    }

    /// The other resource dimension
    pub fn complement(&self) -> ResourceType {
        match self {
            ResourceType::Cpu => ResourceType::Memory,
            ResourceType::Memory => ResourceType::Cpu,
        }
    }

    /// Canonical unit label used in logs and tables
    pub fn unit(&self) -> &'static str {
        match self {
            ResourceType::Cpu => "millicores",
            ResourceType::Memory => "MiB",
        }
    }

    /// Convert a quantity string to canonical units
    pub fn canonical_value(&self, quantity: &str) -> Result<f64, QuantityError> {
        let base = parse(quantity)?.base_value();
        Ok(self.from_base(base))
    }

    fn from_base(&self, base: f64) -> f64 {
        match self {
            ResourceType::Cpu => base * 1000.0,
            ResourceType::Memory => base / MIB,
        }
    }

    /// Render a canonical value as a quantity string
    pub fn format(&self, value: f64) -> String {
        match self {
            ResourceType::Cpu => format!("{}m", value.round() as u64),
            ResourceType::Memory => {
                if is_integral(value) {
                    format!("{}Mi", value.round() as u64)
                } else {
                    format!("{}Ki", (value * KIB).round() as u64)
                }
            }
        }
    }

    /// Whether two canonical values describe the same deployed quantity
    pub fn same_value(&self, a: f64, b: f64) -> bool {
        self.format(a) == self.format(b)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_name())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(ResourceType::Cpu),
            "memory" => Ok(ResourceType::Memory),
            other => Err(format!("unknown resource type '{}'", other)),
        }
    }
}

fn is_integral(value: f64) -> bool {
    (value - value.round()).abs() < 1e-9
}

/// Render a concurrency target the way Knative annotations carry it
pub fn format_concurrency(value: f64) -> String {
    if is_integral(value) {
        format!("{}", value.round() as u64)
    } else {
        format!("{}", value)
    }
}

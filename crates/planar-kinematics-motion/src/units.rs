use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length unit of world-plane output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnit {
    #[default]
    Millimeter,
    Centimeter,
    Meter,
}

impl LengthUnit {
    pub fn meters(self) -> f64 {
        match self {
            LengthUnit::Millimeter => 1e-3,
            LengthUnit::Centimeter => 1e-2,
            LengthUnit::Meter => 1.0,
        }
    }

    /// Convert `value` expressed in `self` into `to`.
    pub fn convert(self, value: f64, to: LengthUnit) -> f64 {
        if self == to {
            value
        } else {
            value * self.meters() / to.meters()
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            LengthUnit::Millimeter => "mm",
            LengthUnit::Centimeter => "cm",
            LengthUnit::Meter => "m",
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown length unit `{0}` (expected mm, cm or m)")]
pub struct UnknownUnit(pub String);

impl FromStr for LengthUnit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mm" | "millimeter" | "millimeters" => Ok(LengthUnit::Millimeter),
            "cm" | "centimeter" | "centimeters" => Ok(LengthUnit::Centimeter),
            "m" | "meter" | "meters" => Ok(LengthUnit::Meter),
            _ => Err(UnknownUnit(s.to_string())),
        }
    }
}

/// Conversion from grid units (one chessboard square) to output lengths.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    /// Physical side of one square, in `square_unit`.
    pub square_size: f64,
    #[serde(default)]
    pub square_unit: LengthUnit,
    #[serde(default)]
    pub output_unit: LengthUnit,
}

impl Scale {
    pub fn new(square_size: f64, square_unit: LengthUnit, output_unit: LengthUnit) -> Self {
        Self {
            square_size,
            square_unit,
            output_unit,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.square_size.is_finite() && self.square_size > 0.0
    }

    /// Output-unit length of one grid unit.
    pub fn factor(&self) -> f64 {
        self.square_unit.convert(self.square_size, self.output_unit)
    }

    #[inline]
    pub fn grid_to_output(&self, grid: f64) -> f64 {
        grid * self.factor()
    }
}

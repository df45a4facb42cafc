//! Reduction of a [`TrafficSample`] to the single value that gets published.

use std::fmt;
use std::str::FromStr;

use crate::TrafficSample;

/// Unit the published value is expressed in.
///
/// Prefixes are decimal (1 kilo = 10^3) and a byte unit is eight times the
/// matching bit unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unit {
    Bit,
    Byte,
    Kilobit,
    Kilobyte,
    Megabit,
    Megabyte,
    Gigabit,
    #[default]
    Gigabyte,
}

impl Unit {
    pub const ALL: [Unit; 8] = [
        Unit::Bit,
        Unit::Byte,
        Unit::Kilobit,
        Unit::Kilobyte,
        Unit::Megabit,
        Unit::Megabyte,
        Unit::Gigabit,
        Unit::Gigabyte,
    ];

    pub fn divisor(self) -> f64 {
        match self {
            Unit::Bit => 1.0,
            Unit::Byte => 8.0,
            Unit::Kilobit => 1e3,
            Unit::Kilobyte => 1e3 * 8.0,
            Unit::Megabit => 1e6,
            Unit::Megabyte => 1e6 * 8.0,
            Unit::Gigabit => 1e9,
            Unit::Gigabyte => 1e9 * 8.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Unit::Bit => "bit",
            Unit::Byte => "byte",
            Unit::Kilobit => "kbit",
            Unit::Kilobyte => "kbyte",
            Unit::Megabit => "mbit",
            Unit::Megabyte => "mbyte",
            Unit::Gigabit => "gbit",
            Unit::Gigabyte => "gbyte",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownUnit(pub String);

impl fmt::Display for UnknownUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown unit '{}' (expected one of bit, byte, kbit, kbyte, mbit, mbyte, gbit, gbyte)",
            self.0
        )
    }
}

impl std::error::Error for UnknownUnit {}

impl FromStr for Unit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s.trim().to_ascii_lowercase().as_str() {
            "bit" => Unit::Bit,
            "byte" | "b" => Unit::Byte,
            "kbit" => Unit::Kilobit,
            "kbyte" | "kb" => Unit::Kilobyte,
            "mbit" => Unit::Megabit,
            "mbyte" | "mb" => Unit::Megabyte,
            "gbit" => Unit::Gigabit,
            "gbyte" | "gb" => Unit::Gigabyte,
            _ => return Err(UnknownUnit(s.to_string())),
        };
        Ok(unit)
    }
}

/// Total traffic of `sample` expressed in `unit`.
///
/// Both counters are widened to `f64` before summing so large counters
/// cannot overflow.
pub fn extract(sample: &TrafficSample, unit: Unit) -> f64 {
    (sample.rx as f64 + sample.tx as f64) / unit.divisor()
}

/// Renders a metric as the wire payload: right aligned in an 18 character
/// field with six decimals.
pub fn format_payload(value: f64) -> String {
    format!("{value:18.6}")
}

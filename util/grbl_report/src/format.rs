use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

pub const N_DECIMAL_COORDVALUE_MM: usize = 3;
pub const N_DECIMAL_COORDVALUE_INCH: usize = 4;
pub const N_DECIMAL_RATEVALUE_MM: usize = 0;
pub const N_DECIMAL_RATEVALUE_INCH: usize = 1;
pub const N_DECIMAL_SETTINGVALUE: usize = 3;
pub const N_DECIMAL_RPMVALUE: usize = 0;
pub const N_DECIMAL_PIDVALUE: usize = 3;

pub const INCH_PER_MM: f32 = 0.0393701;

/// Fixed-point rendering of a float.
///
/// Negative zero prints as `0`, matching the firmware's own float printer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fixed(pub f32, pub usize);

impl Display for Fixed {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Fixed(value, decimals) = *self;
        let value = if value == 0.0 { 0.0 } else { value };
        write!(f, "{:.*}", decimals, value)
    }
}

/// Unit system used for coordinate and rate values (setting `$13`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReportUnits {
    #[default]
    Millimeters,
    Inches,
}

impl ReportUnits {
    pub fn from_report_inches(report_inches: bool) -> Self {
        if report_inches {
            ReportUnits::Inches
        } else {
            ReportUnits::Millimeters
        }
    }
    pub fn coord(self, value: f32) -> Fixed {
        match self {
            ReportUnits::Millimeters => Fixed(value, N_DECIMAL_COORDVALUE_MM),
            ReportUnits::Inches => Fixed(value * INCH_PER_MM, N_DECIMAL_COORDVALUE_INCH),
        }
    }
    pub fn rate(self, value: f32) -> Fixed {
        match self {
            ReportUnits::Millimeters => Fixed(value, N_DECIMAL_RATEVALUE_MM),
            ReportUnits::Inches => Fixed(value * INCH_PER_MM, N_DECIMAL_RATEVALUE_INCH),
        }
    }
}

/// Comma separated coordinate list, e.g. `1.000,-2.500,0.000`.
pub struct AxisValues<'a>(pub ReportUnits, pub &'a [f32]);

impl<'a> Display for AxisValues<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut needs_separator = false;
        for value in self.1 {
            if needs_separator {
                write!(f, ",")?;
            }
            needs_separator = true;
            write!(f, "{}", self.0.coord(*value))?;
        }
        Ok(())
    }
}

/// Comma separated list of floats at one precision, unconverted.
pub struct FixedList<'a>(pub usize, pub &'a [f32]);

impl<'a> Display for FixedList<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut needs_separator = false;
        for value in self.1 {
            if needs_separator {
                write!(f, ",")?;
            }
            needs_separator = true;
            write!(f, "{}", Fixed(*value, self.0))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_rounds_and_hides_negative_zero() {
        assert_eq!(Fixed(1.23456, 3).to_string(), "1.235");
        assert_eq!(Fixed(-0.0, 3).to_string(), "0.000");
        assert_eq!(Fixed(-12.5, 1).to_string(), "-12.5");
        assert_eq!(Fixed(24000.0, 0).to_string(), "24000");
    }

    #[test]
    fn axis_values_have_no_trailing_comma() {
        let values = [1.0, -2.5, 0.0];
        assert_eq!(
            AxisValues(ReportUnits::Millimeters, &values).to_string(),
            "1.000,-2.500,0.000"
        );
        assert_eq!(AxisValues(ReportUnits::Millimeters, &values[..1]).to_string(), "1.000");
    }

    #[test]
    fn inches_convert_and_widen_precision() {
        let values = [25.4];
        assert_eq!(AxisValues(ReportUnits::Inches, &values).to_string(), "1.0000");
        assert_eq!(ReportUnits::Inches.rate(254.0).to_string(), "10.0");
        assert_eq!(ReportUnits::Millimeters.rate(1000.4).to_string(), "1000");
    }
}

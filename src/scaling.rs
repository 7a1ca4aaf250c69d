//! Linear ADC scaling: raw voltage → calibrated engineering unit.
//!
//! Pure and hardware-free. The voltage itself is acquired elsewhere,
//! under the ADC resource lock.

use crate::config::AdcConfig;

/// Two-point linear calibration with clamping on both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcScale {
    pub volts_min: f64,
    pub volts_max: f64,
    pub units_min: f64,
    pub units_max: f64,
    /// Map `volts_min` to `units_max` instead of `units_min`.
    pub inverse: bool,
}

impl AdcScale {
    pub fn from_config(adc: &AdcConfig) -> Self {
        Self {
            volts_min: adc.volts_min,
            volts_max: adc.volts_max,
            units_min: adc.units_min,
            units_max: adc.units_max,
            inverse: adc.inverse,
        }
    }

    /// Scale a raw voltage into `[units_min, units_max]`.
    ///
    /// Voltages outside the calibration window saturate at the matching
    /// boundary unit. A zero-width window yields `units_min`.
    pub fn apply(&self, volts: f64) -> f64 {
        let v_span = self.volts_max - self.volts_min;
        if v_span == 0.0 {
            return self.units_min;
        }
        let v = volts.clamp(self.volts_min, self.volts_max);
        let percent = (v - self.volts_min) / v_span;

        let u_span = self.units_max - self.units_min;
        let units = if self.inverse {
            self.units_max - u_span * percent
        } else {
            self.units_min + u_span * percent
        };
        units.clamp(self.units_min, self.units_max)
    }
}

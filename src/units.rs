//! Temperature unit conversions.
//!
//! Absolute temperatures and temperature increments convert differently: a
//! trend of 1 °F/yr is 5/9 °C/yr, with no 32 degree offset.

const KELVIN_OFFSET: f64 = 273.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempUnit {
    Kelvin,
    Celsius,
    Fahrenheit,
}

/// Whether a value is a point on the scale or a difference between two points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Degree,
    Increment,
}

pub fn kelvin_to_fahrenheit(kelvin: f64) -> f64 {
    (kelvin - KELVIN_OFFSET) * 9.0 / 5.0 + 32.0
}

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

pub fn fahrenheit_to_kelvin(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0 + KELVIN_OFFSET
}

/// Convert between units. Returns `None` for NaN or infinite input.
pub fn convert(value: f64, from: TempUnit, to: TempUnit, quantity: Quantity) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }

    let degree = quantity == Quantity::Degree;
    let k_offset = if degree { KELVIN_OFFSET } else { 0.0 };
    let f_offset = if degree { 32.0 } else { 0.0 };

    // Route everything through Celsius.
    let celsius = match from {
        TempUnit::Celsius => value,
        TempUnit::Kelvin => value - k_offset,
        TempUnit::Fahrenheit => (value - f_offset) * 5.0 / 9.0,
    };

    Some(match to {
        TempUnit::Celsius => celsius,
        TempUnit::Kelvin => celsius + k_offset,
        TempUnit::Fahrenheit => celsius * 9.0 / 5.0 + f_offset,
    })
}

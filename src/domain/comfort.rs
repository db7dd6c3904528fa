// Comfort score - composite 0-100 rating of room conditions

const TEMPERATURE_BAND: (f64, f64) = (20.0, 24.0);
const TEMPERATURE_PENALTY: f64 = 12.0;

const HUMIDITY_BAND: (f64, f64) = (30.0, 60.0);
const HUMIDITY_PENALTY: f64 = 2.5;

const CO2_CEILING: f64 = 1000.0;
const CO2_PENALTY: f64 = 0.15;

const TEMPERATURE_WEIGHT: f64 = 0.4;
const HUMIDITY_WEIGHT: f64 = 0.3;
const CO2_WEIGHT: f64 = 0.3;

/// Compute the composite comfort score for a set of conditions.
///
/// Each input gets a sub-score of 100 inside its optimal band, dropping
/// linearly with the distance outside it (floored at 0). The sub-scores are
/// then weighted 40/30/30 for temperature, humidity and CO2.
pub fn score(temperature: f64, humidity: f64, co2: f64) -> f64 {
    let temperature_score = band_score(temperature, TEMPERATURE_BAND, TEMPERATURE_PENALTY);
    let humidity_score = band_score(humidity, HUMIDITY_BAND, HUMIDITY_PENALTY);
    let co2_score = band_score(co2, (f64::NEG_INFINITY, CO2_CEILING), CO2_PENALTY);

    let composite = TEMPERATURE_WEIGHT * temperature_score
        + HUMIDITY_WEIGHT * humidity_score
        + CO2_WEIGHT * co2_score;

    composite.clamp(0.0, 100.0)
}

fn band_score(value: f64, (low, high): (f64, f64), penalty: f64) -> f64 {
    let deviation = if value < low {
        low - value
    } else if value > high {
        value - high
    } else {
        0.0
    };

    (100.0 - deviation * penalty).max(0.0)
}

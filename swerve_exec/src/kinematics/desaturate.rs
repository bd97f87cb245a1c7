//! Wheel speed desaturation

use crate::wheel_module::{ModuleState, NUM_MODULES};

/// The largest absolute speed in a set of module states.
pub fn peak_speed_ms(states: &[ModuleState; NUM_MODULES]) -> f64 {
    states.iter().fold(0.0, |acc, s| acc.max(s.speed_ms.abs()))
}

/// Uniformly scale the module speeds so none exceeds `max_speed_ms`.
///
/// Angles are untouched, and the sign and ratio of every pair of speeds is
/// preserved. If no module exceeds the limit the states are returned as is.
pub fn desaturate(
    states: &[ModuleState; NUM_MODULES], 
    max_speed_ms: f64
) -> [ModuleState; NUM_MODULES] {
    let peak = peak_speed_ms(states);

    if peak <= max_speed_ms {
        return *states;
    }

    let scale = max_speed_ms / peak;
    states.map(|s| ModuleState {
        speed_ms: s.speed_ms * scale,
        angle_rad: s.angle_rad,
    })
}

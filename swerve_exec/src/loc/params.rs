//! Parameters structure for the pose estimator

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use super::PoseEstimatorError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the pose estimator and vision fusion.
#[derive(Debug, Clone, Deserialize)]
pub struct PoseEstimatorParams {

    // ---- ESTIMATOR ----

    /// Standard deviations of the odometry state in x, y and heading.
    ///
    /// Units: meters, meters, radians
    pub state_std_devs: [f64; 3],

    /// Length of the odometry history kept for latency compensation. Vision
    /// measurements older than this are dropped.
    ///
    /// Units: seconds
    pub history_window_s: f64,

    // ---- VISION FUSION ----

    /// Fuse readings from the primary (fiducial) camera.
    pub primary_fusion_enabled: bool,

    /// Fuse readings from the secondary (tracking) camera.
    pub secondary_fusion_enabled: bool,

    /// Fixed standard deviations of secondary readings in x, y and heading.
    pub secondary_std_devs: [f64; 3],

    /// Distance-banded trust of primary readings. Readings beyond the last
    /// band are not fused.
    pub primary_trust_bands: Vec<TrustBand>,
}

/// One band of the primary source's trust table.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
pub struct TrustBand {
    /// Readings with a target distance strictly below this fall in the band
    /// (if they are not in an earlier band).
    ///
    /// Units: meters
    pub max_distance_m: f64,

    /// Standard deviation applied to x, y and heading.
    pub std_dev: f64,

    /// A reading in this band re-seeds the secondary source.
    pub reseed_secondary: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PoseEstimatorParams {
    /// Check the parameters are usable.
    pub fn validate(&self) -> Result<(), PoseEstimatorError> {
        check_std_devs("state", &self.state_std_devs)?;
        check_std_devs("secondary", &self.secondary_std_devs)?;

        if !(self.history_window_s > 0.0) {
            return Err(PoseEstimatorError::InvalidHistoryWindow(self.history_window_s));
        }

        Ok(())
    }
}

impl Default for PoseEstimatorParams {
    fn default() -> Self {
        Self {
            state_std_devs: [0.1, 0.1, 0.1],
            history_window_s: 1.5,
            primary_fusion_enabled: true,
            secondary_fusion_enabled: true,
            secondary_std_devs: [0.007, 0.007, 0.1],
            primary_trust_bands: vec![
                TrustBand { max_distance_m: 0.6, std_dev: 0.001, reseed_secondary: true },
                TrustBand { max_distance_m: 0.75, std_dev: 0.0025, reseed_secondary: true },
                TrustBand { max_distance_m: 1.0, std_dev: 0.005, reseed_secondary: true },
                TrustBand { max_distance_m: 1.5, std_dev: 0.006, reseed_secondary: true },
                TrustBand { max_distance_m: 1.75, std_dev: 0.006, reseed_secondary: false },
                TrustBand { max_distance_m: 2.0, std_dev: 0.0065, reseed_secondary: false },
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn check_std_devs(name: &'static str, std_devs: &[f64; 3]) -> Result<(), PoseEstimatorError> {
    if std_devs.iter().all(|s| s.is_finite() && *s >= 0.0) {
        Ok(())
    } else {
        Err(PoseEstimatorError::InvalidStdDevs(name, *std_devs))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_match_param_file() {
        let file: PoseEstimatorParams = util::params::from_toml_str(
            include_str!("../../../params/pose_est.toml")
        ).unwrap();
        let def = PoseEstimatorParams::default();

        assert_eq!(file.state_std_devs, def.state_std_devs);
        assert_eq!(file.secondary_std_devs, def.secondary_std_devs);
        assert_eq!(file.primary_trust_bands, def.primary_trust_bands);
        assert!(file.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let mut p = PoseEstimatorParams::default();
        p.state_std_devs[1] = -0.1;
        assert!(matches!(p.validate(), Err(PoseEstimatorError::InvalidStdDevs("state", _))));

        let mut p = PoseEstimatorParams::default();
        p.history_window_s = 0.0;
        assert!(matches!(p.validate(), Err(PoseEstimatorError::InvalidHistoryWindow(_))));
    }
}

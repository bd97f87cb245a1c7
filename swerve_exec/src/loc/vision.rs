//! # Vision fusion
//!
//! Turns raw vision readings into weighted measurements for the
//! [`PoseEstimator`].
//!
//! The two sources are not treated symmetrically. The primary (fiducial)
//! camera's trust depends on how far it is from its target, following the
//! [`TrustTable`]. When a primary reading falls in a band marked
//! `reseed_secondary` the secondary (tracking) camera is re-seeded onto the
//! primary's pose as well as the reading being fused.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::mpsc::{channel, Receiver, Sender};

// Internal
use comms_if::eqpt::vision::{VisionReading, VisionSourceId};
use super::{
    Pose, PoseEstimator, PoseEstimatorError, PoseEstimatorParams, TrustBand, VisionMeasurement,
    VisionOutcome,
};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A vision pose source, such as a network-attached camera.
///
/// Implementations must return immediately, reporting the latest cached
/// reading rather than waiting on the camera.
pub trait VisionSource: Send {
    /// `false` if the source has lost contact with its camera.
    fn connected(&self) -> bool;

    /// The most recent reading.
    fn latest_reading(&self) -> VisionReading;

    /// Re-seed the source's own pose estimate.
    fn reset_pose(&mut self, pose: &Pose);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The vision sources fitted to the robot.
#[derive(Default)]
pub struct VisionSources {
    pub primary: Option<Box<dyn VisionSource>>,
    pub secondary: Option<Box<dyn VisionSource>>,
}

/// Ordered distance bands giving the trust of primary readings.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustTable {
    bands: Vec<TrustBand>,
}

/// A reading tagged with the source it came from.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SourcedReading {
    pub source: VisionSourceId,
    pub reading: VisionReading,
}

/// An append-only queue of readings from producers outside the control loop.
///
/// Producers push through a cloned [`Sender`], the control loop drains the
/// queue once per tick so the estimator is only ever touched from one thread.
pub struct VisionInbox {
    tx: Sender<SourcedReading>,
    rx: Receiver<SourcedReading>,
}

/// The fusion policy between the vision sources and the estimator.
#[derive(Debug, Clone)]
pub struct VisionFusion {
    primary_enabled: bool,
    secondary_enabled: bool,
    secondary_std_devs: [f64; 3],
    trust_table: TrustTable,

    /// Connection state seen on the previous poll, indexed by source.
    was_connected: [bool; 2],
}

/// Per-tick report of vision fusion.
#[derive(Debug, Copy, Clone, Default, Serialize)]
pub struct VisionReport {
    /// The source is enabled and fitted but not connected. Fusion for it is
    /// running on odometry alone.
    pub primary_disconnected: bool,
    pub secondary_disconnected: bool,

    /// Number of measurements applied this tick, per source.
    pub num_applied: [u32; 2],

    /// The secondary source was re-seeded by the primary this tick.
    pub secondary_reseeded: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrustTable {
    /// Build the table, bands must be in increasing distance with trust
    /// never increasing.
    pub fn new(bands: Vec<TrustBand>) -> Result<Self, PoseEstimatorError> {
        if bands.is_empty() {
            return Err(PoseEstimatorError::EmptyTrustTable);
        }

        for (i, b) in bands.iter().enumerate() {
            if !(b.max_distance_m.is_finite() && b.max_distance_m > 0.0)
                || !(b.std_dev.is_finite() && b.std_dev >= 0.0)
            {
                return Err(PoseEstimatorError::InvalidTrustBand(i));
            }
        }

        for (i, pair) in bands.windows(2).enumerate() {
            if pair[1].max_distance_m <= pair[0].max_distance_m
                || pair[1].std_dev < pair[0].std_dev
            {
                return Err(PoseEstimatorError::TrustTableOrder(i + 1));
            }
        }

        Ok(Self { bands })
    }

    /// The band a reading at `distance_m` falls in, or `None` if it is beyond
    /// the last band (or not a valid distance).
    pub fn lookup(&self, distance_m: f64) -> Option<&TrustBand> {
        if !(distance_m >= 0.0) {
            return None;
        }

        self.bands.iter().find(|b| distance_m < b.max_distance_m)
    }

    pub fn bands(&self) -> &[TrustBand] {
        &self.bands
    }
}

impl VisionInbox {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self { tx, rx }
    }

    /// A handle for pushing readings from another thread.
    pub fn sender(&self) -> Sender<SourcedReading> {
        self.tx.clone()
    }

    /// Take every reading queued so far, in arrival order.
    pub fn drain(&self) -> Vec<SourcedReading> {
        self.rx.try_iter().collect()
    }
}

impl Default for VisionInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl VisionFusion {
    pub fn new(params: &PoseEstimatorParams) -> Result<Self, PoseEstimatorError> {
        Ok(Self {
            primary_enabled: params.primary_fusion_enabled,
            secondary_enabled: params.secondary_fusion_enabled,
            secondary_std_devs: params.secondary_std_devs,
            trust_table: TrustTable::new(params.primary_trust_bands.clone())?,
            was_connected: [true; 2],
        })
    }

    /// Poll both sources and fuse their latest readings.
    pub fn poll(
        &mut self,
        estimator: &mut PoseEstimator,
        sources: &mut VisionSources,
        report: &mut VisionReport,
    ) {
        if self.primary_enabled {
            if let Some(reading) = self.read(VisionSourceId::Primary, &sources.primary, report) {
                self.ingest(estimator, VisionSourceId::Primary, &reading, &mut sources.secondary, report);
            }
        }

        if self.secondary_enabled {
            if let Some(reading) = self.read(VisionSourceId::Secondary, &sources.secondary, report) {
                self.ingest(estimator, VisionSourceId::Secondary, &reading, &mut sources.secondary, report);
            }
        }
    }

    /// Fuse one reading, re-seeding the secondary source if the reading
    /// calls for it.
    ///
    /// Returns `None` if the reading was not turned into a measurement
    /// (no target, beyond the trust table, or fusion disabled).
    pub fn ingest(
        &mut self,
        estimator: &mut PoseEstimator,
        source: VisionSourceId,
        reading: &VisionReading,
        secondary: &mut Option<Box<dyn VisionSource>>,
        report: &mut VisionReport,
    ) -> Option<VisionOutcome> {
        let (measurement, reseed) = self.to_measurement(source, reading)?;

        let outcome = estimator.add_vision_measurement(&measurement);

        if outcome == VisionOutcome::Applied {
            report.num_applied[source.index()] += 1;

            if reseed {
                if let Some(s) = secondary.as_mut() {
                    debug!("Re-seeding the secondary vision source to {:?}", measurement.pose);
                    s.reset_pose(&measurement.pose);
                    report.secondary_reseeded = true;
                }
            }
        }

        Some(outcome)
    }

    /// Convert a reading into a measurement, plus whether it should re-seed
    /// the secondary source.
    pub fn to_measurement(
        &self,
        source: VisionSourceId,
        reading: &VisionReading,
    ) -> Option<(VisionMeasurement, bool)> {
        if !reading.exists {
            return None;
        }

        let finite = [reading.x_m, reading.y_m, reading.heading_rad, reading.timestamp_s, reading.distance_m]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            warn!("Dropping non-finite {} reading {:?}", source, reading);
            return None;
        }

        let pose = Pose::new(reading.x_m, reading.y_m, reading.heading_rad);

        let (std_devs, reseed) = match source {
            VisionSourceId::Primary => {
                if !self.primary_enabled {
                    return None;
                }
                let band = self.trust_table.lookup(reading.distance_m)?;
                ([band.std_dev; 3], band.reseed_secondary)
            },
            VisionSourceId::Secondary => {
                if !self.secondary_enabled {
                    return None;
                }
                (self.secondary_std_devs, false)
            }
        };

        Some((
            VisionMeasurement {
                source,
                pose,
                timestamp_s: reading.timestamp_s,
                std_devs,
            },
            reseed,
        ))
    }

    /// Get the latest reading from a source if it is fitted and connected,
    /// reporting a loss of connection.
    fn read(
        &mut self,
        id: VisionSourceId,
        source: &Option<Box<dyn VisionSource>>,
        report: &mut VisionReport,
    ) -> Option<VisionReading> {
        let source = source.as_ref()?;
        let connected = source.connected();

        let was = &mut self.was_connected[id.index()];
        if *was && !connected {
            warn!("The {} vision source is not connected, continuing on odometry", id);
        }
        else if !*was && connected {
            info!("The {} vision source has reconnected", id);
        }
        *was = connected;

        if !connected {
            match id {
                VisionSourceId::Primary => report.primary_disconnected = true,
                VisionSourceId::Secondary => report.secondary_disconnected = true,
            }
            return None;
        }

        Some(source.latest_reading())
    }
}

use nalgebra::UnitQuaternion;

// ---------------------------------------------------------------------------
// Gains & Correction
// ---------------------------------------------------------------------------

/// Gain triple for one axis of the feed-forward correction.
///
/// The corrective angle for a measured attitude angle `theta` is
/// `alpha * theta^2 + beta * theta + gamma`. All three default to zero,
/// which makes the axis a pass-through (no correction).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisGains {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl AxisGains {
    pub const fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self { alpha, beta, gamma }
    }

    /// Evaluate the corrective polynomial at the measured angle (radians).
    pub fn correct(&self, theta: f64) -> f64 {
        self.alpha * theta * theta + self.beta * theta + self.gamma
    }
}

/// Corrective angles in radians, one per axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AttitudeCorrection {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Feed-forward attitude controller.
///
/// Turns the vessel's instantaneous orientation into three corrective
/// angles used to adjust the calibrated camera pose for wave and turn
/// disturbance. The gains are public and may be retuned between updates;
/// each `update` is a pure function of the current orientation and the
/// current gains (no integration, no history).
///
/// Euler angles are extracted in the extrinsic x-y-z (roll, pitch, yaw)
/// convention of [`UnitQuaternion::euler_angles`]. The calibration that
/// produced the baseline pose must use the same convention.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeedforwardController {
    pub yaw: AxisGains,
    pub pitch: AxisGains,
    pub roll: AxisGains,
    correction: AttitudeCorrection,
}

impl FeedforwardController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the corrective angles from an orientation sample.
    ///
    /// Any finite orientation yields a finite correction.
    pub fn update(&mut self, orientation: &UnitQuaternion<f64>) -> AttitudeCorrection {
        let (roll, pitch, yaw) = orientation.euler_angles();
        self.correction = AttitudeCorrection {
            yaw: self.yaw.correct(yaw),
            pitch: self.pitch.correct(pitch),
            roll: self.roll.correct(roll),
        };
        self.correction
    }

    /// Corrective angles from the most recent update (zero before the first).
    pub fn correction(&self) -> AttitudeCorrection {
        self.correction
    }
}

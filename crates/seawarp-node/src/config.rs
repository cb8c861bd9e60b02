//! Parameter storage and the typed per-cycle configuration snapshots.
//!
//! The engine never reads configuration keys directly; each cycle it takes a
//! fresh [`Calibration`] and [`ControllerGains`] snapshot from a
//! [`ParamProvider`], so every parameter is live-tunable between cycles.

use seawarp_core::AxisGains;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Parameter keys understood by the engine.
pub mod keys {
    pub const RADAR_IMG_W: &str = "radar_img_w";
    pub const RADAR_RANGE: &str = "radar_range";
    pub const YAW: &str = "yaw";
    pub const PITCH: &str = "pitch";
    pub const ROLL: &str = "roll";
    pub const FOVY: &str = "fovy";
    pub const TX: &str = "tx";
    pub const TY: &str = "ty";
    pub const TZ: &str = "tz";
    pub const RGB_FRAME_ID: &str = "rgb_frame_id";
    pub const RADARIMG_FRAME_ID: &str = "radarimg_frame_id";
    pub const RADAR_FRAME_ID: &str = "radar_frame_id";

    pub const IMU_YAW_ALPHA: &str = "imu_yaw_alpha";
    pub const IMU_YAW_BETA: &str = "imu_yaw_beta";
    pub const IMU_YAW_GAMMA: &str = "imu_yaw_gamma";
    pub const IMU_PITCH_ALPHA: &str = "imu_pitch_alpha";
    pub const IMU_PITCH_BETA: &str = "imu_pitch_beta";
    pub const IMU_PITCH_GAMMA: &str = "imu_pitch_gamma";
    pub const IMU_ROLL_ALPHA: &str = "imu_roll_alpha";
    pub const IMU_ROLL_BETA: &str = "imu_roll_beta";
    pub const IMU_ROLL_GAMMA: &str = "imu_roll_gamma";
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required parameter `{0}`")]
    Missing(&'static str),
    #[error("parameter `{0}` has the wrong type")]
    WrongType(&'static str),
}

/// Parameter value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Float(f64),
    Text(String),
}

/// Read access to the live parameter set.
///
/// The contract is `get(key) -> value or nothing`; defaults are the
/// caller's business ([`ControllerGains`] defaults to zero, [`Calibration`]
/// treats absence as an error).
pub trait ParamProvider {
    fn get(&self, key: &str) -> Option<ParamValue>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-memory parameter store.
///
/// Writable at any time between cycles, which is what makes the gains and
/// calibration live-tunable.
#[derive(Debug, Clone, Default)]
pub struct ParamStore {
    values: HashMap<String, ParamValue>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_f64(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), ParamValue::Float(value));
    }

    pub fn set_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), ParamValue::Text(value.into()));
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.values.remove(key)
    }

    /// Merge parameters from a JSON object, e.g. `{"fovy": 52.0,
    /// "rgb_frame_id": "camera0"}`. Existing keys are overwritten.
    pub fn merge_json(&mut self, json: &str) -> Result<(), serde_json::Error> {
        let parsed: HashMap<String, ParamValue> = serde_json::from_str(json)?;
        self.values.extend(parsed);
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.values).unwrap_or(serde_json::Value::Null)
    }
}

impl ParamProvider for ParamStore {
    fn get(&self, key: &str) -> Option<ParamValue> {
        self.values.get(key).cloned()
    }
}

// ---------------------------------------------------------------------------
// Typed snapshots
// ---------------------------------------------------------------------------

fn required_f64(p: &impl ParamProvider, key: &'static str) -> Result<f64, ConfigError> {
    match p.get(key) {
        Some(ParamValue::Float(v)) => Ok(v),
        Some(_) => Err(ConfigError::WrongType(key)),
        None => Err(ConfigError::Missing(key)),
    }
}

fn required_text(p: &impl ParamProvider, key: &'static str) -> Result<String, ConfigError> {
    match p.get(key) {
        Some(ParamValue::Text(v)) => Ok(v),
        Some(_) => Err(ConfigError::WrongType(key)),
        None => Err(ConfigError::Missing(key)),
    }
}

fn gain_or_zero(p: &impl ParamProvider, key: &'static str) -> f64 {
    match p.get(key) {
        Some(ParamValue::Float(v)) => v,
        _ => 0.0,
    }
}

/// Static calibration pose and geometry. Every field is required: the engine
/// refuses to run a cycle on a partially configured node rather than guess.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    /// Side length of the square rendered radar image, pixels.
    pub radar_img_w: f64,
    /// Radar range setting, meters (radius; the radar image spans twice this).
    pub radar_range: f64,
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    pub fovy_deg: f64,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
    pub rgb_frame_id: String,
    pub radarimg_frame_id: String,
    pub radar_frame_id: String,
}

impl Calibration {
    pub fn from_provider(p: &impl ParamProvider) -> Result<Self, ConfigError> {
        Ok(Self {
            radar_img_w: required_f64(p, keys::RADAR_IMG_W)?,
            radar_range: required_f64(p, keys::RADAR_RANGE)?,
            yaw_deg: required_f64(p, keys::YAW)?,
            pitch_deg: required_f64(p, keys::PITCH)?,
            roll_deg: required_f64(p, keys::ROLL)?,
            fovy_deg: required_f64(p, keys::FOVY)?,
            tx: required_f64(p, keys::TX)?,
            ty: required_f64(p, keys::TY)?,
            tz: required_f64(p, keys::TZ)?,
            rgb_frame_id: required_text(p, keys::RGB_FRAME_ID)?,
            radarimg_frame_id: required_text(p, keys::RADARIMG_FRAME_ID)?,
            radar_frame_id: required_text(p, keys::RADAR_FRAME_ID)?,
        })
    }
}

/// The nine controller gains. Unset keys read as zero, which leaves the
/// controller a pass-through until tuned.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerGains {
    pub yaw: AxisGains,
    pub pitch: AxisGains,
    pub roll: AxisGains,
}

impl ControllerGains {
    pub fn from_provider(p: &impl ParamProvider) -> Self {
        Self {
            yaw: AxisGains::new(
                gain_or_zero(p, keys::IMU_YAW_ALPHA),
                gain_or_zero(p, keys::IMU_YAW_BETA),
                gain_or_zero(p, keys::IMU_YAW_GAMMA),
            ),
            pitch: AxisGains::new(
                gain_or_zero(p, keys::IMU_PITCH_ALPHA),
                gain_or_zero(p, keys::IMU_PITCH_BETA),
                gain_or_zero(p, keys::IMU_PITCH_GAMMA),
            ),
            roll: AxisGains::new(
                gain_or_zero(p, keys::IMU_ROLL_ALPHA),
                gain_or_zero(p, keys::IMU_ROLL_BETA),
                gain_or_zero(p, keys::IMU_ROLL_GAMMA),
            ),
        }
    }
}

//! Homography composition and publication engine.
//!
//! One publish cycle turns the current calibration, the current controller
//! gains and the last known orientation into three frame-tagged matrices:
//! camera -> radar image, radar image -> radar, and their composition
//! camera -> radar. Cycles are triggered by orientation samples or by an
//! explicit refresh signal; nothing runs between triggers.

use nalgebra::{Matrix3, UnitQuaternion};
use seawarp_core::{CameraWarp, FeedforwardController, Homography, WarpBuilder};
use tokio::sync::watch;

use crate::channel::LatchedOutput;
use crate::clock::Clock;
use crate::config::{Calibration, ConfigError, ControllerGains, ParamProvider};

/// A timestamped orientation sample from the vessel's IMU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    pub quat: UnitQuaternion<f64>,
    pub stamp_us: u64,
}

impl OrientationSample {
    pub fn new(quat: UnitQuaternion<f64>, stamp_us: u64) -> Self {
        Self { quat, stamp_us }
    }
}

/// Outcome of a single publish cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    /// All three homographies were published.
    Published,
    /// An initial publish already happened and nothing is listening;
    /// the cycle did no work.
    SkippedIdle,
    /// The camera warp was singular or non-finite; nothing was published
    /// this cycle. The next trigger retries from fresh inputs.
    SingularWarp,
}

/// The engine. Owns all mutable node state: the retained orientation
/// sample, the controller, the has-published flag and the three output
/// channels. `publish_cycle` is the sole mutating entry point; `&mut self`
/// serializes cycles, and a threaded dispatcher wraps the engine in a
/// `Mutex`.
pub struct HomographyEngine<P, B, C> {
    params: P,
    builder: B,
    clock: C,
    ctrl: FeedforwardController,
    last_sample: Option<OrientationSample>,
    has_published: bool,
    rgb_radarimg: LatchedOutput,
    radarimg_radar: LatchedOutput,
    rgb_radar: LatchedOutput,
}

impl<P, B, C> HomographyEngine<P, B, C>
where
    P: ParamProvider,
    B: WarpBuilder,
    C: Clock,
{
    pub fn new(params: P, builder: B, clock: C) -> Self {
        Self {
            params,
            builder,
            clock,
            ctrl: FeedforwardController::new(),
            last_sample: None,
            has_published: false,
            rgb_radarimg: LatchedOutput::new(),
            radarimg_radar: LatchedOutput::new(),
            rgb_radar: LatchedOutput::new(),
        }
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    /// Live-tuning access to the parameter set between cycles.
    pub fn params_mut(&mut self) -> &mut P {
        &mut self.params
    }

    pub fn subscribe_rgb_radarimg(&self) -> watch::Receiver<Option<Homography>> {
        self.rgb_radarimg.subscribe()
    }

    pub fn subscribe_radarimg_radar(&self) -> watch::Receiver<Option<Homography>> {
        self.radarimg_radar.subscribe()
    }

    pub fn subscribe_rgb_radar(&self) -> watch::Receiver<Option<Homography>> {
        self.rgb_radar.subscribe()
    }

    /// New orientation sample: replace the retained one (last writer wins,
    /// no queueing) and run a cycle.
    pub fn on_imu(&mut self, sample: OrientationSample) {
        self.last_sample = Some(sample);
        self.run_cycle_logged();
    }

    /// Explicit refresh: run a cycle with the existing retained sample, if
    /// any. Useful when a calibration tool wants updated warps while the
    /// sensor feed is paused.
    pub fn on_refresh(&mut self) {
        self.run_cycle_logged();
    }

    fn run_cycle_logged(&mut self) {
        match self.publish_cycle() {
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "publish cycle failed"),
        }
    }

    /// Run one full publish cycle.
    ///
    /// Configuration errors are fatal to the cycle and surfaced to the
    /// caller; a singular camera warp is recoverable and reported through
    /// [`CycleStatus`]. Nothing is ever partially published.
    pub fn publish_cycle(&mut self) -> Result<CycleStatus, ConfigError> {
        // once the latched channels hold an initial message, idle cycles
        // (nothing attached downstream) cost nothing
        if self.has_published
            && self.rgb_radarimg.consumer_count() == 0
            && self.radarimg_radar.consumer_count() == 0
            && self.rgb_radar.consumer_count() == 0
        {
            return Ok(CycleStatus::SkippedIdle);
        }

        // one stamp shared by all three outputs of this cycle
        let stamp_us = self.clock.now_us();

        let gains = ControllerGains::from_provider(&self.params);
        self.ctrl.yaw = gains.yaw;
        self.ctrl.pitch = gains.pitch;
        self.ctrl.roll = gains.roll;

        if let Some(sample) = &self.last_sample {
            self.ctrl.update(&sample.quat);
        }
        let corr = self.ctrl.correction();

        let cal = Calibration::from_provider(&self.params)?;

        // the builder produces radarimg -> rgb; we publish the inverse
        let radarimg_to_rgb = self.builder.camera_warp(&CameraWarp {
            width: cal.radar_img_w,
            height: cal.radar_img_w,
            yaw_deg: cal.yaw_deg - corr.yaw.to_degrees(),
            pitch_deg: cal.pitch_deg - corr.pitch.to_degrees(),
            roll_deg: cal.roll_deg - corr.roll.to_degrees(),
            scale: 1.0,
            fovy_deg: cal.fovy_deg,
            tx: cal.tx,
            ty: cal.ty,
            tz: cal.tz,
        });
        let rgb_to_radarimg = match finite_inverse(&radarimg_to_rgb) {
            Some(m) => m,
            None => {
                tracing::warn!("camera warp not invertible, skipping cycle");
                return Ok(CycleStatus::SingularWarp);
            }
        };

        // radar range is a radius; the image spans the full diameter
        let radarimg_to_radar = self
            .builder
            .radar_frame_warp(cal.radar_img_w, 2.0 * cal.radar_range);

        // point in rgb -> radar image -> radar frame
        let rgb_to_radar = radarimg_to_radar * rgb_to_radarimg;

        self.rgb_radarimg.publish(Homography::new(
            stamp_us,
            cal.rgb_frame_id.clone(),
            cal.radarimg_frame_id.clone(),
            rgb_to_radarimg,
        ));
        self.radarimg_radar.publish(Homography::new(
            stamp_us,
            cal.radarimg_frame_id.clone(),
            cal.radar_frame_id.clone(),
            radarimg_to_radar,
        ));
        self.rgb_radar.publish(Homography::new(
            stamp_us,
            cal.rgb_frame_id,
            cal.radar_frame_id,
            rgb_to_radar,
        ));
        self.has_published = true;

        Ok(CycleStatus::Published)
    }
}

/// Inverse of a 3x3 warp, or `None` when the matrix is singular or carries
/// non-finite entries (degenerate fovy and zero-size images produce inf/NaN
/// rather than exact singularity).
fn finite_inverse(m: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    if !m.iter().all(|v| v.is_finite()) {
        return None;
    }
    m.try_inverse()
        .filter(|inv| inv.iter().all(|v| v.is_finite()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{keys, ParamStore};
    use approx::assert_relative_eq;
    use seawarp_core::PerspectiveWarp;
    use std::sync::{Arc, Mutex};

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    #[derive(Clone, Copy)]
    struct ManualClock(u64);

    impl Clock for ManualClock {
        fn now_us(&self) -> u64 {
            self.0
        }
    }

    /// Warp builder that records every invocation and returns scripted
    /// matrices.
    struct ScriptedWarp {
        camera_calls: Mutex<Vec<CameraWarp>>,
        radar_calls: Mutex<Vec<(f64, f64)>>,
        camera_result: Mutex<Matrix3<f64>>,
    }

    impl Default for ScriptedWarp {
        fn default() -> Self {
            Self {
                camera_calls: Mutex::new(Vec::new()),
                radar_calls: Mutex::new(Vec::new()),
                camera_result: Mutex::new(Matrix3::new(
                    2.0, 0.0, 0.0, //
                    0.0, 4.0, 0.0, //
                    0.0, 0.0, 1.0,
                )),
            }
        }
    }

    impl ScriptedWarp {
        fn camera_call_count(&self) -> usize {
            self.camera_calls.lock().unwrap().len()
        }

        fn last_camera_call(&self) -> CameraWarp {
            *self.camera_calls.lock().unwrap().last().unwrap()
        }

        fn last_radar_call(&self) -> (f64, f64) {
            *self.radar_calls.lock().unwrap().last().unwrap()
        }

        fn set_camera_result(&self, m: Matrix3<f64>) {
            *self.camera_result.lock().unwrap() = m;
        }
    }

    impl WarpBuilder for ScriptedWarp {
        fn camera_warp(&self, params: &CameraWarp) -> Matrix3<f64> {
            self.camera_calls.lock().unwrap().push(*params);
            *self.camera_result.lock().unwrap()
        }

        fn radar_frame_warp(&self, radar_img_w: f64, diameter: f64) -> Matrix3<f64> {
            self.radar_calls.lock().unwrap().push((radar_img_w, diameter));
            Matrix3::new(
                0.0, -0.2, 50.0, //
                -0.2, 0.0, 50.0, //
                0.0, 0.0, 1.0,
            )
        }
    }

    fn full_store() -> ParamStore {
        let mut s = ParamStore::new();
        s.set_f64(keys::RADAR_IMG_W, 500.0);
        s.set_f64(keys::RADAR_RANGE, 50.0);
        s.set_f64(keys::YAW, 10.0);
        s.set_f64(keys::PITCH, 20.0);
        s.set_f64(keys::ROLL, 30.0);
        s.set_f64(keys::FOVY, 52.0);
        s.set_f64(keys::TX, 1.0);
        s.set_f64(keys::TY, 2.0);
        s.set_f64(keys::TZ, 3.0);
        s.set_text(keys::RGB_FRAME_ID, "rgb");
        s.set_text(keys::RADARIMG_FRAME_ID, "radarimg");
        s.set_text(keys::RADAR_FRAME_ID, "radar");
        s
    }

    fn scripted_engine(
        store: ParamStore,
    ) -> (
        HomographyEngine<ParamStore, Arc<ScriptedWarp>, ManualClock>,
        Arc<ScriptedWarp>,
    ) {
        let builder = Arc::new(ScriptedWarp::default());
        let engine = HomographyEngine::new(store, Arc::clone(&builder), ManualClock(42_000_000));
        (engine, builder)
    }

    fn sample(roll: f64, pitch: f64, yaw: f64, stamp_us: u64) -> OrientationSample {
        OrientationSample::new(UnitQuaternion::from_euler_angles(roll, pitch, yaw), stamp_us)
    }

    // -----------------------------------------------------------------------
    // Cycle behavior
    // -----------------------------------------------------------------------

    #[test]
    fn first_cycle_publishes_all_three_with_shared_stamp() {
        let (mut engine, _builder) = scripted_engine(full_store());

        // no consumers attached: the latching guarantee still requires the
        // first cycle to publish
        assert_eq!(engine.publish_cycle().unwrap(), CycleStatus::Published);

        let a = engine.rgb_radarimg.latched().unwrap();
        let b = engine.radarimg_radar.latched().unwrap();
        let c = engine.rgb_radar.latched().unwrap();

        assert_eq!(a.stamp_us, 42_000_000);
        assert_eq!(b.stamp_us, 42_000_000);
        assert_eq!(c.stamp_us, 42_000_000);

        assert_eq!((a.frame_id.as_str(), a.child_frame_id.as_str()), ("rgb", "radarimg"));
        assert_eq!((b.frame_id.as_str(), b.child_frame_id.as_str()), ("radarimg", "radar"));
        assert_eq!((c.frame_id.as_str(), c.child_frame_id.as_str()), ("rgb", "radar"));
    }

    #[test]
    fn late_subscriber_receives_latched_matrices() {
        let (mut engine, _builder) = scripted_engine(full_store());
        engine.publish_cycle().unwrap();

        let rx = engine.subscribe_rgb_radar();
        assert!(rx.borrow().is_some());
    }

    #[test]
    fn idle_cycles_do_no_work_after_first_publish() {
        let (mut engine, builder) = scripted_engine(full_store());

        engine.publish_cycle().unwrap();
        assert_eq!(builder.camera_call_count(), 1);

        // nobody listening: no computation at all
        assert_eq!(engine.publish_cycle().unwrap(), CycleStatus::SkippedIdle);
        assert_eq!(engine.publish_cycle().unwrap(), CycleStatus::SkippedIdle);
        assert_eq!(builder.camera_call_count(), 1);
    }

    #[test]
    fn one_consumer_on_any_channel_keeps_cycles_running() {
        let (mut engine, builder) = scripted_engine(full_store());
        engine.publish_cycle().unwrap();

        let _rx = engine.subscribe_radarimg_radar();
        assert_eq!(engine.publish_cycle().unwrap(), CycleStatus::Published);
        assert_eq!(builder.camera_call_count(), 2);
    }

    #[test]
    fn radar_range_is_doubled_to_a_diameter() {
        let (mut engine, builder) = scripted_engine(full_store());
        engine.publish_cycle().unwrap();
        assert_eq!(builder.last_radar_call(), (500.0, 100.0));
    }

    #[test]
    fn zero_gains_pass_baseline_angles_through() {
        let (mut engine, builder) = scripted_engine(full_store());
        engine.on_imu(sample(0.2, -0.1, 0.4, 1));

        let call = builder.last_camera_call();
        assert_eq!(call.yaw_deg, 10.0);
        assert_eq!(call.pitch_deg, 20.0);
        assert_eq!(call.roll_deg, 30.0);
        assert_eq!(call.scale, 1.0);
        assert_eq!((call.width, call.height), (500.0, 500.0));
    }

    #[test]
    fn gains_subtract_the_correction_in_degrees() {
        let mut store = full_store();
        store.set_f64(keys::IMU_PITCH_BETA, 1.0);
        let (mut engine, builder) = scripted_engine(store);

        engine.on_imu(sample(0.0, 0.1, 0.0, 1));

        let call = builder.last_camera_call();
        assert_relative_eq!(call.pitch_deg, 20.0 - 0.1_f64.to_degrees(), epsilon = 1e-9);
        assert_eq!(call.yaw_deg, 10.0);
        assert_eq!(call.roll_deg, 30.0);
    }

    #[test]
    fn last_sample_wins_before_the_correction_is_read() {
        let mut store = full_store();
        store.set_f64(keys::IMU_YAW_BETA, 1.0);
        let (mut engine, builder) = scripted_engine(store);

        engine.on_imu(sample(0.0, 0.0, 0.3, 1));
        engine.on_imu(sample(0.0, 0.0, 0.6, 2));

        let call = builder.last_camera_call();
        assert_relative_eq!(call.yaw_deg, 10.0 - 0.6_f64.to_degrees(), epsilon = 1e-9);
    }

    #[test]
    fn refresh_reuses_the_retained_sample() {
        let mut store = full_store();
        store.set_f64(keys::IMU_ROLL_BETA, 1.0);
        let (mut engine, builder) = scripted_engine(store);

        engine.on_imu(sample(0.25, 0.0, 0.0, 1));
        let after_imu = builder.last_camera_call();

        engine.on_refresh();
        assert_eq!(builder.last_camera_call(), after_imu);
        assert_eq!(builder.camera_call_count(), 2);
    }

    #[test]
    fn refresh_without_any_sample_publishes_baseline() {
        let (mut engine, builder) = scripted_engine(full_store());
        engine.on_refresh();

        assert!(engine.rgb_radar.latched().is_some());
        let call = builder.last_camera_call();
        assert_eq!(call.yaw_deg, 10.0);
    }

    #[test]
    fn singular_camera_warp_publishes_nothing_and_recovers() {
        let (mut engine, builder) = scripted_engine(full_store());
        builder.set_camera_result(Matrix3::zeros());

        assert_eq!(engine.publish_cycle().unwrap(), CycleStatus::SingularWarp);
        assert!(engine.rgb_radarimg.latched().is_none());
        assert!(engine.radarimg_radar.latched().is_none());
        assert!(engine.rgb_radar.latched().is_none());

        builder.set_camera_result(Matrix3::identity());
        assert_eq!(engine.publish_cycle().unwrap(), CycleStatus::Published);
        assert!(engine.rgb_radar.latched().is_some());
    }

    #[test]
    fn non_finite_camera_warp_is_treated_as_singular() {
        let (mut engine, builder) = scripted_engine(full_store());
        builder.set_camera_result(Matrix3::identity() * f64::INFINITY);
        assert_eq!(engine.publish_cycle().unwrap(), CycleStatus::SingularWarp);
    }

    #[test]
    fn missing_parameter_fails_the_cycle_with_nothing_published() {
        let mut store = full_store();
        store.remove(keys::RADAR_RANGE);
        let (mut engine, _builder) = scripted_engine(store);

        let err = engine.publish_cycle().unwrap_err();
        assert_eq!(err, ConfigError::Missing(keys::RADAR_RANGE));
        assert!(engine.rgb_radarimg.latched().is_none());
        assert!(engine.rgb_radar.latched().is_none());

        // on_imu swallows and logs the same failure instead of panicking
        engine.on_imu(sample(0.0, 0.0, 0.0, 1));
        assert!(engine.rgb_radar.latched().is_none());
    }

    #[test]
    fn published_matrix_is_the_inverse_of_the_built_warp() {
        let (mut engine, _builder) = scripted_engine(full_store());
        engine.publish_cycle().unwrap();

        let m = engine.rgb_radarimg.latched().unwrap().matrix;
        // scripted camera result is diag(2, 4, 1)
        assert_relative_eq!(m[(0, 0)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(m[(1, 1)], 0.25, epsilon = 1e-12);
        assert_relative_eq!(m[(2, 2)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn live_retuning_applies_on_the_next_cycle() {
        let (mut engine, builder) = scripted_engine(full_store());
        let _rx = engine.subscribe_rgb_radar();

        engine.on_imu(sample(0.0, 0.0, 0.5, 1));
        assert_eq!(builder.last_camera_call().yaw_deg, 10.0);

        engine.params_mut().set_f64(keys::IMU_YAW_BETA, 1.0);
        engine.on_refresh();
        assert_relative_eq!(
            builder.last_camera_call().yaw_deg,
            10.0 - 0.5_f64.to_degrees(),
            epsilon = 1e-9
        );
    }

    // -----------------------------------------------------------------------
    // Composition invariant with the real builder
    // -----------------------------------------------------------------------

    #[test]
    fn degenerate_fovy_with_the_real_builder_skips_the_cycle() {
        let mut store = full_store();
        store.set_f64(keys::FOVY, 0.0);
        let mut engine = HomographyEngine::new(store, PerspectiveWarp, ManualClock(1));

        assert_eq!(engine.publish_cycle().unwrap(), CycleStatus::SingularWarp);
        assert!(engine.rgb_radar.latched().is_none());

        // restoring the calibration recovers on the next trigger
        engine.params_mut().set_f64(keys::FOVY, 52.0);
        assert_eq!(engine.publish_cycle().unwrap(), CycleStatus::Published);
    }

    #[test]
    fn composed_warp_equals_the_product_of_its_parts() {
        let mut engine = HomographyEngine::new(full_store(), PerspectiveWarp, ManualClock(1));
        assert_eq!(engine.publish_cycle().unwrap(), CycleStatus::Published);

        let rgb_radarimg = engine.rgb_radarimg.latched().unwrap().matrix;
        let radarimg_radar = engine.radarimg_radar.latched().unwrap().matrix;
        let rgb_radar = engine.rgb_radar.latched().unwrap().matrix;

        let product = radarimg_radar * rgb_radarimg;
        for r in 0..3 {
            for c in 0..3 {
                assert_relative_eq!(rgb_radar[(r, c)], product[(r, c)], epsilon = 1e-9);
            }
        }
    }
}

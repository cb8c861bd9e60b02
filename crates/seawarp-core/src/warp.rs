use nalgebra::{Matrix3, Matrix4, Rotation3};

// ---------------------------------------------------------------------------
// Builder interface
// ---------------------------------------------------------------------------

/// Inputs for the camera perspective warp. Angles are in degrees,
/// translations in the units of the calibration (meters).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraWarp {
    pub width: f64,
    pub height: f64,
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    pub scale: f64,
    pub fovy_deg: f64,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
}

/// Constructs the two warp matrices the engine composes each cycle.
///
/// Implementations must not panic: degenerate inputs (zero width, zero
/// field of view) may produce singular or non-finite matrices, which the
/// caller is expected to detect when inverting.
pub trait WarpBuilder {
    /// Warp from the top-down radar image to the camera image.
    fn camera_warp(&self, params: &CameraWarp) -> Matrix3<f64>;

    /// Warp from the top-down radar image to the physical radar frame, for
    /// a square radar image spanning `diameter` meters edge to edge.
    fn radar_frame_warp(&self, radar_img_w: f64, diameter: f64) -> Matrix3<f64>;
}

impl<B: WarpBuilder> WarpBuilder for std::sync::Arc<B> {
    fn camera_warp(&self, params: &CameraWarp) -> Matrix3<f64> {
        (**self).camera_warp(params)
    }

    fn radar_frame_warp(&self, radar_img_w: f64, diameter: f64) -> Matrix3<f64> {
        (**self).radar_frame_warp(radar_img_w, diameter)
    }
}

// ---------------------------------------------------------------------------
// Perspective implementation
// ---------------------------------------------------------------------------

/// Perspective-projection warp builder.
///
/// The source image is centered on the origin of the z=0 plane, rotated by
/// the attitude angles, translated, pushed back to the distance at which its
/// diagonal fills the vertical field of view, then projected and mapped back
/// to pixel coordinates. Built in homogeneous 4x4 form and collapsed to the
/// 3x3 planar homography by dropping the depth row and column (source points
/// all lie in the z=0 plane).
#[derive(Debug, Clone, Copy, Default)]
pub struct PerspectiveWarp;

impl WarpBuilder for PerspectiveWarp {
    fn camera_warp(&self, p: &CameraWarp) -> Matrix3<f64> {
        let half_fovy = 0.5 * p.fovy_deg.to_radians();
        let diag = p.width.hypot(p.height);
        // output side length and camera distance; degenerate fovy or size
        // propagate as inf/NaN rather than panicking
        let side = p.scale * diag / half_fovy.cos();
        let dist = diag / (2.0 * half_fovy.sin());
        let near = dist - 0.5 * diag;
        let far = dist + 0.5 * diag;

        let center = translation(-0.5 * p.width, -0.5 * p.height, 0.0);

        let rot = Rotation3::from_euler_angles(
            p.roll_deg.to_radians(),
            p.pitch_deg.to_radians(),
            p.yaw_deg.to_radians(),
        )
        .to_homogeneous();

        let offset = translation(p.tx, p.ty, p.tz - dist);

        let f_cot = 1.0 / half_fovy.tan();
        #[rustfmt::skip]
        let project = Matrix4::new(
            f_cot, 0.0, 0.0, 0.0,
            0.0, f_cot, 0.0, 0.0,
            0.0, 0.0, (far + near) / (near - far), 2.0 * far * near / (near - far),
            0.0, 0.0, -1.0, 0.0,
        );

        // NDC -> output pixels
        #[rustfmt::skip]
        let viewport = Matrix4::new(
            0.5 * side, 0.0, 0.0, 0.5 * side,
            0.0, 0.5 * side, 0.0, 0.5 * side,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        collapse(&(viewport * project * offset * rot * center))
    }

    fn radar_frame_warp(&self, radar_img_w: f64, diameter: f64) -> Matrix3<f64> {
        // Radar sits at the image center; image up is +x (forward), image
        // left is +y. Pixel (u right, v down) -> meters.
        let s = diameter / radar_img_w;
        let c = 0.5 * radar_img_w * s;
        #[rustfmt::skip]
        let m = Matrix3::new(
            0.0, -s, c,
            -s, 0.0, c,
            0.0, 0.0, 1.0,
        );
        m
    }
}

fn translation(x: f64, y: f64, z: f64) -> Matrix4<f64> {
    #[rustfmt::skip]
    let m = Matrix4::new(
        1.0, 0.0, 0.0, x,
        0.0, 1.0, 0.0, y,
        0.0, 0.0, 1.0, z,
        0.0, 0.0, 0.0, 1.0,
    );
    m
}

/// Drop the depth row and column of a z=0-plane transform.
fn collapse(m: &Matrix4<f64>) -> Matrix3<f64> {
    #[rustfmt::skip]
    let h = Matrix3::new(
        m[(0, 0)], m[(0, 1)], m[(0, 3)],
        m[(1, 0)], m[(1, 1)], m[(1, 3)],
        m[(3, 0)], m[(3, 1)], m[(3, 3)],
    );
    h
}

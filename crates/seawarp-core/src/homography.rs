use nalgebra::Matrix3;

/// A planar projective transform between two named frames, stamped with the
/// publish time of the cycle that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Homography {
    /// Publish time, microseconds since the Unix epoch. All matrices from
    /// one cycle carry the same stamp.
    pub stamp_us: u64,
    /// Source frame.
    pub frame_id: String,
    /// Destination frame.
    pub child_frame_id: String,
    pub matrix: Matrix3<f64>,
}

impl Homography {
    pub fn new(
        stamp_us: u64,
        frame_id: impl Into<String>,
        child_frame_id: impl Into<String>,
        matrix: Matrix3<f64>,
    ) -> Self {
        Self {
            stamp_us,
            frame_id: frame_id.into(),
            child_frame_id: child_frame_id.into(),
            matrix,
        }
    }

    /// Matrix values flattened row-major, the wire layout of the message.
    pub fn values(&self) -> [f64; 9] {
        let m = &self.matrix;
        [
            m[(0, 0)],
            m[(0, 1)],
            m[(0, 2)],
            m[(1, 0)],
            m[(1, 1)],
            m[(1, 2)],
            m[(2, 0)],
            m[(2, 1)],
            m[(2, 2)],
        ]
    }
}

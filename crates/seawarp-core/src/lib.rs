//! # Seawarp Core
//!
//! Pure geometry for camera/radar frame alignment on a moving vessel:
//! - Feed-forward attitude controller (IMU orientation -> corrective angles)
//! - Perspective warp construction between the camera image, the rendered
//!   top-down radar image, and the physical radar frame
//! - Frame-tagged homography messages
//!
//! This crate does no I/O; triggering, configuration and publication live in
//! `seawarp-node`.

pub mod feedforward;
pub mod homography;
pub mod warp;

// Re-export core types
pub use feedforward::{AttitudeCorrection, AxisGains, FeedforwardController};
pub use homography::Homography;
pub use warp::{CameraWarp, PerspectiveWarp, WarpBuilder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

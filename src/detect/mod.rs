//! Face detection capability.
//!
//! The scan core treats detection as an opaque function from a frame to a set
//! of bounding boxes. Backends live under `backends`; `grouping` holds the
//! neighbour-merge and minimum-size filtering shared by backends that produce
//! raw, overlapping hits.

mod backend;
pub mod backends;
pub mod grouping;
mod result;

pub use backend::{DetectParams, FaceDetector};
pub use backends::{detector_from_settings, ScriptedBackend, StubBackend};
pub use result::{BoundingBox, DetectionResult};

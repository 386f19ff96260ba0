//! Ad/video detection over a noisy, partially-observable media page.
//!
//! The [`Detector`] polls the page through the opaque locator seam, derives
//! the current video/ad identifiers through first-success-wins cascades,
//! tracks consecutive-ad sequences against a fixed host-video reference
//! point, estimates ad duration through a priority-ordered strategy list and
//! classifies each ad's temporal position. Events leave the detector only on
//! meaningful change, already filtered through the outbound gate.

pub mod classify;
pub mod debounce;
pub mod detector;
pub mod duration;
pub mod sample;
pub mod tuning;

pub use classify::{classify, derive_ad_type};
pub use debounce::Debouncer;
pub use detector::{Detector, SampleOutput, SequenceContext};
pub use duration::{estimate_duration, CountdownReading, DurationEstimate, DurationEvidence};
pub use sample::{resolve_ad_id, resolve_video_id, PageSample};
pub use tuning::DetectorTuning;

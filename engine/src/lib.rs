//! EyeQ interaction engine: hands-free gaze and voice control for a study
//! app.
//!
//! Gaze smoothing and snapping, dwell activation, multi-round calibration,
//! a first-run tour, and a global/field voice state machine, all driven by
//! one `InteractionEngine`. The binary entry point lives in `main.rs`.

pub mod calibration;
pub mod clock;
pub mod config;
pub mod dwell;
pub mod engine;
pub mod error;
pub mod gaze;
pub mod geometry;
pub mod input_source;
pub mod persist;
pub mod runtime;
pub mod scheduler;
pub mod screen;
pub mod tour;
pub mod voice;

//! Headless client core: local prediction, remote interpolation and a
//! reconnecting WebSocket connection
//!
//! Rendering is someone else's job; these types produce the smoothed state
//! a renderer would draw and the transition signals a HUD would react to.

pub mod interp;
pub mod net;
pub mod predictor;

pub use interp::Interpolator;
pub use net::{ClientEvent, Connection, ConnectionState, IntentCell};
pub use predictor::{LocalEvent, Predictor};

//! HTTP Routes

pub mod alerts;
pub mod mode;
pub mod webhook;

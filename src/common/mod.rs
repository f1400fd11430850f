//! Low-level algorithms shared by the tracking components.

pub mod hungarian;

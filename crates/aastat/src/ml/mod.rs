//! Linear algebra and nonlinear least squares for peak fitting

pub mod gauss;
pub mod gaussian;
pub mod matrix;

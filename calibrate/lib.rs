pub mod diagnostics;
pub mod fit;
pub mod grid;
pub mod schools;
pub mod validation;

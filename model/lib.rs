#![deny(unused_variables)]

pub mod basis;
pub mod catalog;
pub mod competitiveness;
pub mod demographics;
pub mod experience;
pub mod fixtures;
pub mod link;
pub mod two_stage;
pub mod types;

#[path = "../simulate/mod.rs"]
pub mod simulate;

#[path = "../calibrate/lib.rs"]
pub mod calibrate;

pub mod adaptation;
pub mod body;
pub mod config;
pub mod dynamics;
pub mod error;
pub mod fields;
pub mod grid;
pub mod kernel;
pub mod level_set;
pub mod materials;
pub mod math;
pub mod neighborhood;
pub mod particle;
pub mod shapes;
pub mod solver;
pub mod time_step;

pub use error::{Result, SphError};

//! Common value types shared across the simulator.

pub mod reg;

pub use reg::{RegisterClass, RegisterDependency};

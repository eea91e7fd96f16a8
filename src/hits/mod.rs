pub mod marker;
pub mod record;
pub mod signature;
pub mod index;
pub mod detector;
pub mod batch;
pub mod reactor;
pub mod controller;

pub use marker::*;
pub use record::*;
pub use signature::*;
pub use index::*;
pub use detector::*;
pub use batch::*;
pub use reactor::*;
pub use controller::*;

#[cfg(test)]
mod tests;

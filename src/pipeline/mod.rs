//! Pipeline module - per-example coordinator and batch runner.

mod batch;
mod coordinator;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::*;
pub use coordinator::*;

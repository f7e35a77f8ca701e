//! Background consumer loops.

pub mod mutator_worker;

pub use mutator_worker::{Disposition, MutatorWorker, WorkerHandle};

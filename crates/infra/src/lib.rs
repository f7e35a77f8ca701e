//! Infrastructure layer: Postgres stores, Redis streams, the HTTP validator
//! client and the balance mutator worker.

pub mod dead_letter;
pub mod event_bus;
pub mod http_validator;
pub mod postgres;
pub mod retry;
pub mod workers;


pub use dead_letter::{DeadLetter, DeadLetterError, DeadLetterSink, InMemoryDeadLetterSink};
pub use http_validator::HttpValidatorClient;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use workers::{Disposition, MutatorWorker, WorkerHandle};

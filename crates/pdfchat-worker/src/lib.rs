// PDF chat Q&A history worker
//
// Consumes Q&A events from RabbitMQ, mirrors them into the Redis recency
// cache, buffers them in memory and commits them to Postgres in timed batches.

pub mod config;
pub mod consumer;
pub mod worker;

pub use config::WorkerConfig;
pub use consumer::QueueConsumer;
pub use worker::{Backends, IngestWorker, ShutdownHandle};

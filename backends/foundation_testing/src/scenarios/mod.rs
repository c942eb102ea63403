//! Common synchronization patterns and scenarios.
//!
//! Provides reusable implementations of classic concurrency patterns on top
//! of `FiberCond`:
//! - Producer-consumer queues

pub mod producer_consumer;

pub use producer_consumer::ProducerConsumerQueue;

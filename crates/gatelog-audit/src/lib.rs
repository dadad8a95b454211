//! Append-only audit log for gatelog.
//!
//! Audit events arrive on a queue with at-least-once delivery. Each one is
//! translated into a single text line and appended to a shared log object
//! in the object store. The store has no append primitive, so every append
//! is a read-modify-write guarded by the object's generation: concurrent
//! writers, in this process or any other, can lose a race but never each
//! other's lines.
//!
//! # Components
//!
//! - [`AppendLog`]: bounded-retry conditional append of one line
//! - [`LogLine`]: event payload to canonical line, tolerant of garbage
//! - [`Consumer`]: pull, translate, append, then ack or nack
//!
//! Duplicate lines are an accepted outcome: a message whose append landed
//! but whose ack was lost will be appended again on redelivery.

pub mod config;
pub mod consumer;
pub mod error;
pub mod line;
pub mod writer;

pub use config::{ConsumerConfig, RetryPolicy};
pub use consumer::{Consumer, ConsumerStats, Disposition, StatsSnapshot};
pub use error::{AuditError, AuditResult};
pub use line::LogLine;
pub use writer::{AppendLog, AppendReceipt};

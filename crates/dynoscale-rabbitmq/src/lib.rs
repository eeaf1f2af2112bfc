//! dynoscale-rabbitmq — queue backlog from the RabbitMQ management API.
//!
//! | Method | Path | Used for |
//! |---|---|---|
//! | GET | `/api/queues` | Backlog of every queue |
//! | GET | `/api/queues/{vhost}` | Backlog of every queue in one vhost |
//! | GET | `/api/whoami` | Startup credential check |
//!
//! Requests use HTTP basic auth and a per-request timeout.

pub mod client;
pub mod error;

pub use client::RabbitMqClient;
pub use error::RabbitMqError;

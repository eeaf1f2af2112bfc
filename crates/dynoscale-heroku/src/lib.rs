//! dynoscale-heroku — process formation via the Heroku Platform API.
//!
//! | Method | Path | Used for |
//! |---|---|---|
//! | GET | `/apps/{app}/formation` | Current quantity per process type |
//! | PATCH | `/apps/{app}/formation/{type}` | Set a process type's quantity |
//! | GET | `/apps/{app}/dynos` | Startup check: credentials valid, app exists |
//!
//! Every request carries the API key as a bearer token and the
//! version 3 `Accept` header.

pub mod client;
pub mod error;

pub use client::{DEFAULT_BASE_URL, HerokuClient};
pub use error::HerokuError;

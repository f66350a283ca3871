//! Core of the calshare calendar-sharing service.
//!
//! This crate holds everything below the HTTP layer:
//! - domain records (`user`, `calendar`, `event`, `membership`, `role`)
//! - the SQLite `store`
//! - `account` registration and sessions, `authz` role checks and the
//!   `invitation` share/confirm workflow
//! - signed `token`s, `password` hashing, the `mailer` and `holiday` clients

pub mod account;
pub mod authz;
pub mod calendar;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod holiday;
pub mod invitation;
pub mod mailer;
pub mod membership;
pub mod password;
pub mod role;
pub mod store;
pub mod token;
pub mod user;
pub mod validation;

pub use error::{CalShareError, CalShareResult};
pub use membership::ResourceKind;
pub use role::{Action, Role};
pub use store::Store;

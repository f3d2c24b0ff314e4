//! MFA-backed AWS session credentials: cache lookup, a race between typed and
//! hardware-key codes, STS token exchange and environment injection.

pub mod acquire;
pub mod aws;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod mfa;

pub use acquire::CredentialAcquirer;
pub use error::{MfaError, Result};

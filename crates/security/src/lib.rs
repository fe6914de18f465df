//! Request signing for Foreman.
//!
//! Provides:
//! - **SigV4**: AWS Signature Version 4 signing for the IAM-authenticated
//!   gateway transport and the knowledge-base retrieval tool
//! - **Credentials**: static credentials read from the standard `AWS_*`
//!   environment variables

pub mod sigv4;

pub use sigv4::{Credentials, SigV4Signer, SigningError};

//! # auth-adapters
//!
//! `TokenVerifier` implementations. Token issuance (login) lives in the
//! identity service; this crate only checks what it receives.

#[cfg(feature = "auth-jwt")]
pub mod jwt;

#[cfg(feature = "auth-jwt")]
pub use jwt::{Claims, JwtIssuer, JwtVerifier};

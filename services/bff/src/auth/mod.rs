//! Edge authentication and authorization building blocks.
//!
//! # Purpose and responsibility
//! Houses the verification side of the auth plane: the signing-key-set cache,
//! the bearer-token validator, and the object-level authorizer.
//!
//! # Where it fits
//! The auth interceptor in `crate::middleware` composes these pieces per
//! request; proxy handlers consult the authorizer before forwarding.
//!
//! # Key invariants and assumptions
//! - Tokens are RS256 only; every other algorithm is rejected outright.
//! - Key material comes exclusively from the configured identity-provider
//!   JWKS endpoint; nothing here mints or stores private keys.
//! - Validation failures are a closed set so callers can categorize without
//!   string matching.
pub mod authorizer;
pub mod jwks;
pub mod validator;

pub use authorizer::{Authorizer, SCOPE_ADMIN};
pub use jwks::{KeySetCache, KeySetConfig, KeySetError};
pub use validator::{AuthError, TokenValidator, ValidatedClaims, ValidatorConfig};

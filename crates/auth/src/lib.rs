//! Identity primitives: principals and the provider that reports who is acting.

pub mod identity;
pub mod principal;

pub use identity::{Anonymous, IdentityProvider, SessionIdentity};
pub use principal::Principal;

//! Identity collaborator: who is performing the current operation.
//!
//! Sign-in itself happens outside the stockroom. The ledger only asks for the
//! acting user's identifier so it can stamp movements with a `responsible`.

use std::sync::{Arc, RwLock};

use stockroom_core::ActorId;

use crate::principal::Principal;

/// Supplies the principal that is currently signed in, if any.
pub trait IdentityProvider: Send + Sync + core::fmt::Debug {
    fn current_principal(&self) -> Option<Principal>;

    fn current_actor(&self) -> Option<ActorId> {
        self.current_principal().map(|p| p.id)
    }
}

impl<P> IdentityProvider for Arc<P>
where
    P: IdentityProvider + ?Sized,
{
    fn current_principal(&self) -> Option<Principal> {
        (**self).current_principal()
    }
}

/// Nobody is signed in (background jobs, anonymous kiosks).
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

impl IdentityProvider for Anonymous {
    fn current_principal(&self) -> Option<Principal> {
        None
    }
}

/// Session-backed identity that follows sign-in and sign-out.
#[derive(Debug, Default)]
pub struct SessionIdentity {
    principal: RwLock<Option<Principal>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(principal: Principal) -> Self {
        Self {
            principal: RwLock::new(Some(principal)),
        }
    }

    pub fn sign_in(&self, principal: Principal) {
        match self.principal.write() {
            Ok(mut slot) => {
                tracing::debug!(actor = %principal.id, "principal signed in");
                *slot = Some(principal);
            }
            Err(_) => tracing::warn!("identity lock poisoned; sign-in ignored"),
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut slot) = self.principal.write() {
            *slot = None;
        }
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_principal(&self) -> Option<Principal> {
        self.principal.read().ok().and_then(|p| p.clone())
    }
}

use stockroom_core::ActorId;

/// Who is acting on this request, taken from the `X-Actor-Id` header.
///
/// Always present on routed requests; `actor` is `None` for anonymous callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorContext {
    actor: Option<ActorId>,
}

impl ActorContext {
    pub fn new(actor: Option<ActorId>) -> Self {
        Self { actor }
    }

    pub fn actor(&self) -> Option<&ActorId> {
        self.actor.as_ref()
    }

    pub fn into_actor(self) -> Option<ActorId> {
        self.actor
    }
}

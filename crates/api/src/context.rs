use ledgerflow_core::PrincipalId;

/// Principal context for a request.
///
/// The identity is established upstream by the auth collaborator; this service
/// only carries it into the ownership checks.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId) -> Self {
        Self { principal_id }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }
}

use fleamarket_core::UserId;

/// Acting user for a request, taken from the `X-User-Id` header.
///
/// Identity only: nothing here proves the caller is that user.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ActorContext {
    user_id: Option<UserId>,
}

impl ActorContext {
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }
}

//! Identity context and session-scoped state
//!
//! The session/auth infrastructure is an external collaborator: it hands
//! us an opaque session token and, when the visitor is logged in, a user
//! id. Cart ownership is one or the other, never both.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who a cart belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Owner {
    Session(String),
    User(Uuid),
}

impl Owner {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Owner::User(id) => Some(*id),
            Owner::Session(_) => None,
        }
    }
}

/// Per-visitor mutable state held by the session store.
///
/// Passed into and out of the cart/checkout operations explicitly; the
/// engines never reach into ambient session state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub cart_id: Option<Uuid>,
    pub checkout_order_id: Option<Uuid>,
    pub order_history: Vec<Uuid>,
}

impl SessionData {
    /// Remember a freshly created order, keeping at most `max` past
    /// order ids. Oldest dropped first.
    pub fn remember_order(&mut self, order_id: Uuid, max: usize) {
        self.checkout_order_id = Some(order_id);
        self.order_history.retain(|id| *id != order_id);
        self.order_history.push(order_id);
        while self.order_history.len() > max {
            self.order_history.remove(0);
        }
    }

    /// Forget the in-flight checkout pointer. The order id stays in the
    /// history list.
    pub fn forget_checkout_order(&mut self) {
        self.checkout_order_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_user_id() {
        assert_eq!(Owner::Session("tok".into()).user_id(), None);
        let id = Uuid::new_v4();
        assert_eq!(Owner::User(id).user_id(), Some(id));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut data = SessionData::default();
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            data.remember_order(*id, 3);
        }
        assert_eq!(data.checkout_order_id, Some(ids[4]));
        assert_eq!(data.order_history, ids[2..].to_vec());
    }

    #[test]
    fn test_remember_same_order_twice() {
        let mut data = SessionData::default();
        let id = Uuid::new_v4();
        data.remember_order(id, 3);
        data.remember_order(id, 3);
        assert_eq!(data.order_history, vec![id]);
    }

    #[test]
    fn test_forget_keeps_history() {
        let mut data = SessionData::default();
        let id = Uuid::new_v4();
        data.remember_order(id, 3);
        data.forget_checkout_order();
        assert_eq!(data.checkout_order_id, None);
        assert_eq!(data.order_history, vec![id]);
    }
}

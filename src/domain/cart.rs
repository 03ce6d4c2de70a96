//! Cart aggregate
//!
//! Holds the in-memory view of a cart's lines and the rules for mutating
//! them. Persistence loads a [`Cart`], applies an operation, and writes
//! back whatever the outcome dictates inside one transaction.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::identity::Owner;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Clone, Debug)]
pub struct Cart {
    pub id: Uuid,
    pub owner: Owner,
    pub lines: Vec<CartLine>,
    pub updated_at: DateTime<Utc>,
}

/// What `add_product` decided, so the storage layer knows what to write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// Line upserted; persist this quantity for the product.
    Upserted(i32),
    /// Non-positive quantity with `set_quantity`; nothing changes.
    /// Zero is not removal. An explicit remove operation exists and
    /// callers must distinguish the two intents.
    Ignored,
}

/// What `remove_product` decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Last line went away; the cart itself must be deleted.
    CartEmptied,
    /// Line deleted, cart still has others; refresh its timestamp.
    LineRemoved,
    NotPresent,
}

impl Cart {
    pub fn new(id: Uuid, owner: Owner) -> Self {
        Self {
            id,
            owner,
            lines: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line_for(&self, product_id: Uuid) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Upsert a line for `product_id`. With `set_quantity` the given
    /// quantity overwrites, otherwise it is added to any existing line.
    pub fn add_product(&mut self, product_id: Uuid, quantity: i32, set_quantity: bool) -> AddOutcome {
        if quantity <= 0 {
            return AddOutcome::Ignored;
        }
        // TODO: check stock availability before accepting the quantity
        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product_id) {
            line.quantity = if set_quantity { quantity } else { line.quantity + quantity };
            let updated = line.quantity;
            self.touch();
            AddOutcome::Upserted(updated)
        } else {
            self.lines.push(CartLine { product_id, quantity });
            self.touch();
            AddOutcome::Upserted(quantity)
        }
    }

    pub fn remove_product(&mut self, product_id: Uuid) -> RemoveOutcome {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        if self.lines.len() == before {
            return RemoveOutcome::NotPresent;
        }
        self.touch();
        if self.lines.is_empty() {
            RemoveOutcome::CartEmptied
        } else {
            RemoveOutcome::LineRemoved
        }
    }

    /// Absorb `source` into this cart: shared products sum quantities,
    /// the rest move over. The caller deletes the source cart row in the
    /// same transaction that persists the merged lines.
    pub fn merge_from(&mut self, source: Cart) {
        for incoming in source.lines {
            if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == incoming.product_id) {
                line.quantity += incoming.quantity;
            } else {
                self.lines.push(incoming);
            }
        }
        self.touch();
    }

    /// Session cart adopted by a user at login, no merge needed.
    pub fn assign_to_user(&mut self, user_id: Uuid) {
        self.owner = Owner::User(user_id);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cart(lines: &[(Uuid, i32)]) -> Cart {
        let mut c = Cart::new(Uuid::new_v4(), Owner::Session("tok".into()));
        c.lines = lines
            .iter()
            .map(|(p, q)| CartLine { product_id: *p, quantity: *q })
            .collect();
        c
    }

    #[test]
    fn test_add_twice_accumulates() {
        let p = Uuid::new_v4();
        let mut c = cart(&[]);
        assert_eq!(c.add_product(p, 1, false), AddOutcome::Upserted(1));
        assert_eq!(c.add_product(p, 1, false), AddOutcome::Upserted(2));
        assert_eq!(c.line_for(p).unwrap().quantity, 2);
        assert_eq!(c.lines.len(), 1);
    }

    #[test]
    fn test_set_quantity_overwrites() {
        let p = Uuid::new_v4();
        let mut c = cart(&[(p, 2)]);
        assert_eq!(c.add_product(p, 15, true), AddOutcome::Upserted(15));
        assert_eq!(c.line_for(p).unwrap().quantity, 15);
    }

    #[test]
    fn test_set_quantity_zero_leaves_line_untouched() {
        let p = Uuid::new_v4();
        let mut c = cart(&[(p, 2)]);
        assert_eq!(c.add_product(p, 0, true), AddOutcome::Ignored);
        assert_eq!(c.add_product(p, -3, true), AddOutcome::Ignored);
        assert_eq!(c.line_for(p).unwrap().quantity, 2);
    }

    #[test]
    fn test_remove_last_line_empties_cart() {
        let p = Uuid::new_v4();
        let mut c = cart(&[(p, 2)]);
        assert_eq!(c.remove_product(p), RemoveOutcome::CartEmptied);
        assert!(c.is_empty());
    }

    #[test]
    fn test_remove_one_of_several() {
        let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
        let mut c = cart(&[(p1, 2), (p2, 1)]);
        assert_eq!(c.remove_product(p1), RemoveOutcome::LineRemoved);
        assert_eq!(c.lines.len(), 1);
        assert_eq!(c.remove_product(p1), RemoveOutcome::NotPresent);
    }

    #[test]
    fn test_merge_disjoint_is_union() {
        let (p1, p2, p3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut target = cart(&[(p1, 2)]);
        let source = cart(&[(p2, 3), (p3, 1)]);
        target.merge_from(source);
        assert_eq!(target.lines.len(), 3);
        assert_eq!(target.line_for(p1).unwrap().quantity, 2);
        assert_eq!(target.line_for(p2).unwrap().quantity, 3);
        assert_eq!(target.line_for(p3).unwrap().quantity, 1);
    }

    #[test]
    fn test_merge_shared_product_sums() {
        let (px, py) = (Uuid::new_v4(), Uuid::new_v4());
        // user cart has X qty 2; session independently added X qty 3, Y qty 1
        let mut user_cart = cart(&[(px, 2)]);
        let session_cart = cart(&[(px, 3), (py, 1)]);
        user_cart.merge_from(session_cart);
        assert_eq!(user_cart.line_for(px).unwrap().quantity, 5);
        assert_eq!(user_cart.line_for(py).unwrap().quantity, 1);
        assert_eq!(user_cart.lines.len(), 2);
    }

    #[test]
    fn test_merge_empty_source_is_noop() {
        let p = Uuid::new_v4();
        let mut target = cart(&[(p, 2)]);
        target.merge_from(cart(&[]));
        assert_eq!(target.lines, vec![CartLine { product_id: p, quantity: 2 }]);
    }

    #[test]
    fn test_adopt_session_cart_on_login() {
        let p = Uuid::new_v4();
        let user = Uuid::new_v4();
        let mut c = cart(&[(p, 1)]);
        c.assign_to_user(user);
        assert_eq!(c.owner, Owner::User(user));
        assert_eq!(c.line_for(p).unwrap().quantity, 1);
    }
}

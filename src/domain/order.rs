//! Order state machine and cart snapshots
//!
//! An order pins a payment intent to an immutable priced copy of the
//! cart. The snapshot is superseded, never mutated, when the live cart
//! diverges before payment completes.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// `Created → Pending → Success`, with `Created → Canceled` as the only
/// alternate edge. Success and Canceled are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderStatus {
    Created,
    Pending,
    Success,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Pending => "pending",
            OrderStatus::Success => "success",
            OrderStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(OrderStatus::Created),
            "pending" => Some(OrderStatus::Pending),
            "success" => Some(OrderStatus::Success),
            "canceled" => Some(OrderStatus::Canceled),
            _ => None,
        }
    }

    pub fn can_transition(self, to: OrderStatus) -> bool {
        matches!(
            (self, to),
            (OrderStatus::Created, OrderStatus::Pending)
                | (OrderStatus::Created, OrderStatus::Canceled)
                | (OrderStatus::Pending, OrderStatus::Success)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Success | OrderStatus::Canceled)
    }
}

/// A live cart line joined with its product's current catalog data, the
/// input to snapshotting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub name: String,
    pub description: String,
    pub unit_price_cents: i64,
    pub quantity: i32,
}

impl PricedLine {
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}

/// Captured copy of a cart line; survives later catalog edits and
/// deletions unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrozenLine {
    pub product_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub unit_price_cents: i64,
    pub quantity: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub lines: Vec<FrozenLine>,
    pub total_cents: i64,
    /// The live cart's `updated_at` at capture time, used as the cheap
    /// unchanged check when resuming checkout.
    pub cart_updated_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn capture(lines: &[PricedLine], cart_updated_at: DateTime<Utc>) -> Self {
        Self {
            lines: lines
                .iter()
                .map(|l| FrozenLine {
                    product_id: Some(l.product_id),
                    name: l.name.clone(),
                    description: l.description.clone(),
                    unit_price_cents: l.unit_price_cents,
                    quantity: l.quantity,
                })
                .collect(),
            total_cents: total_cents(lines),
            cart_updated_at,
        }
    }

    /// Order-independent equality on (product, quantity) pairs. A
    /// superset is not equal: line counts must match exactly.
    pub fn has_same_items(&self, live: &[PricedLine]) -> bool {
        if self.lines.len() != live.len() {
            return false;
        }
        self.lines.iter().all(|frozen| {
            frozen.product_id.is_some_and(|pid| {
                live.iter()
                    .any(|l| l.product_id == pid && l.quantity == frozen.quantity)
            })
        })
    }
}

pub fn total_cents(lines: &[PricedLine]) -> i64 {
    lines.iter().map(PricedLine::line_total_cents).sum()
}

/// Decision for resuming an order whose status is still Created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResumePlan {
    /// Live cart matches the snapshot; reuse it and the intent as-is.
    Reuse,
    /// Cart diverged; capture a new snapshot, and modify the payment
    /// intent amount when the total moved.
    Replace { new_total_cents: i64, amount_changed: bool },
}

pub fn plan_resume(
    snapshot: &Snapshot,
    live: &[PricedLine],
    cart_updated_at: DateTime<Utc>,
) -> ResumePlan {
    if cart_updated_at == snapshot.cart_updated_at || snapshot.has_same_items(live) {
        return ResumePlan::Reuse;
    }
    let new_total_cents = total_cents(live);
    ResumePlan::Replace {
        new_total_cents,
        amount_changed: new_total_cents != snapshot.total_cents,
    }
}

/// Anti-tamper gate for the details form: the order must still be
/// Created and the submitted client secret must match the recorded one.
/// One boolean out, so callers can only surface a generic stale-state
/// error.
pub fn details_update_allowed(status: OrderStatus, recorded_secret: &str, submitted: &str) -> bool {
    status == OrderStatus::Created && secrets_match(recorded_secret, submitted)
}

/// Constant-time comparison; secrets appear in guessable success URLs.
pub fn secrets_match(recorded: &str, submitted: &str) -> bool {
    let (a, b) = (recorded.as_bytes(), submitted.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Webhook transition for a succeeded payment. `None` means the order
/// was already Success and the event is a replay with nothing to apply.
pub fn mark_paid(status: OrderStatus) -> Option<OrderStatus> {
    if status == OrderStatus::Success {
        None
    } else {
        Some(OrderStatus::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: Uuid, price: i64, qty: i32) -> PricedLine {
        PricedLine {
            product_id,
            name: "The best oolong tea".into(),
            description: "Sooo fragrant".into(),
            unit_price_cents: price,
            quantity: qty,
        }
    }

    #[test]
    fn test_status_edges() {
        use OrderStatus::*;
        assert!(Created.can_transition(Pending));
        assert!(Created.can_transition(Canceled));
        assert!(Pending.can_transition(Success));
        assert!(!Pending.can_transition(Canceled));
        assert!(!Success.can_transition(Pending));
        assert!(!Canceled.can_transition(Pending));
        assert!(Success.is_terminal());
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            OrderStatus::Created,
            OrderStatus::Pending,
            OrderStatus::Success,
            OrderStatus::Canceled,
        ] {
            assert_eq!(OrderStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(OrderStatus::parse("refunded"), None);
    }

    #[test]
    fn test_snapshot_twice_is_equal() {
        let at = Utc::now();
        let lines = vec![line(Uuid::new_v4(), 500, 1), line(Uuid::new_v4(), 700, 2)];
        let a = Snapshot::capture(&lines, at);
        let b = Snapshot::capture(&lines, at);
        assert!(a.has_same_items(&lines));
        assert_eq!(a.total_cents, b.total_cents);
        assert_eq!(a.total_cents, 1900);
    }

    #[test]
    fn test_superset_is_not_equal() {
        let p = Uuid::new_v4();
        let snap = Snapshot::capture(&[line(p, 500, 1)], Utc::now());
        let superset = vec![line(p, 500, 1), line(Uuid::new_v4(), 700, 1)];
        assert!(!snap.has_same_items(&superset));
    }

    #[test]
    fn test_quantity_change_is_not_equal() {
        let p = Uuid::new_v4();
        let snap = Snapshot::capture(&[line(p, 500, 1)], Utc::now());
        assert!(!snap.has_same_items(&[line(p, 500, 2)]));
    }

    #[test]
    fn test_resume_unchanged_reuses() {
        let at = Utc::now();
        let lines = vec![line(Uuid::new_v4(), 500, 1)];
        let snap = Snapshot::capture(&lines, at);
        assert_eq!(plan_resume(&snap, &lines, at), ResumePlan::Reuse);
    }

    #[test]
    fn test_resume_after_adding_line_grows_total_by_line() {
        let at = Utc::now();
        let p = Uuid::new_v4();
        let snap = Snapshot::capture(&[line(p, 500, 1)], at);
        let mut live = vec![line(p, 500, 1)];
        live.push(line(Uuid::new_v4(), 700, 3));
        let later = at + chrono::Duration::seconds(5);
        match plan_resume(&snap, &live, later) {
            ResumePlan::Replace { new_total_cents, amount_changed } => {
                assert_eq!(new_total_cents - snap.total_cents, 700 * 3);
                assert!(amount_changed);
            }
            ResumePlan::Reuse => panic!("expected replacement"),
        }
    }

    #[test]
    fn test_resume_same_items_later_timestamp_reuses() {
        // timestamp moved (cart was saved) but contents are identical
        let at = Utc::now();
        let lines = vec![line(Uuid::new_v4(), 500, 2)];
        let snap = Snapshot::capture(&lines, at);
        let later = at + chrono::Duration::seconds(30);
        assert_eq!(plan_resume(&snap, &lines, later), ResumePlan::Reuse);
    }

    #[test]
    fn test_details_gate() {
        assert!(details_update_allowed(OrderStatus::Created, "pi_secret", "pi_secret"));
        assert!(!details_update_allowed(OrderStatus::Created, "pi_secret", "pi_wrong!"));
        assert!(!details_update_allowed(OrderStatus::Pending, "pi_secret", "pi_secret"));
    }

    #[test]
    fn test_mark_paid_is_idempotent() {
        assert_eq!(mark_paid(OrderStatus::Pending), Some(OrderStatus::Success));
        assert_eq!(mark_paid(OrderStatus::Success), None);
    }
}

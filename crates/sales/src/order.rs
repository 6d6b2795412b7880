use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pos_core::{CustomerId, DomainError, DomainResult, Money, OrderId, ProductId, Quantity};

use crate::error::OrderError;

/// Order line: product, quantity, and the unit price captured at sale time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// Snapshot of the product price when the line was reserved.
    pub unit_price: Money,
}

impl OrderLine {
    pub fn subtotal(&self) -> DomainResult<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// A committed order.
///
/// The total is fixed when the order is assembled and is never recomputed from
/// the catalog; it always equals the sum of its lines' subtotals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    id: OrderId,
    customer_id: CustomerId,
    lines: Vec<OrderLine>,
    total: Money,
    created_at: DateTime<Utc>,
}

impl Order {
    /// Rebuild an order read back from storage, checking its stored total.
    pub fn restore(
        id: OrderId,
        customer_id: CustomerId,
        lines: Vec<OrderLine>,
        total: Money,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::invariant("order has no lines"));
        }
        let computed = sum_lines(&lines)?;
        if computed != total {
            return Err(DomainError::invariant(format!(
                "stored total {total} does not match line sum {computed}"
            )));
        }
        Ok(Self {
            id,
            customer_id,
            lines,
            total,
            created_at,
        })
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Units of `product_id` sold on this order, across all its lines.
    pub fn quantity_of(&self, product_id: ProductId) -> i64 {
        self.lines
            .iter()
            .filter(|l| l.product_id == product_id)
            .map(|l| l.quantity.get())
            .sum()
    }
}

fn sum_lines(lines: &[OrderLine]) -> DomainResult<Money> {
    lines
        .iter()
        .try_fold(Money::ZERO, |acc, line| acc.checked_add(line.subtotal()?))
}

/// One requested line of a `CreateOrder` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: Quantity,
}

/// Command: CreateOrder.
///
/// Lines are processed in the order given; two lines may name the same product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub customer_id: CustomerId,
    pub items: Vec<LineRequest>,
}

impl CreateOrder {
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::invalid("order must contain at least one line"));
        }
        Ok(())
    }
}

/// Accumulates reserved lines and the running total while an order is
/// assembled inside its transaction scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    id: OrderId,
    customer_id: CustomerId,
    lines: Vec<OrderLine>,
    total: Money,
}

impl OrderDraft {
    pub fn new(id: OrderId, customer_id: CustomerId) -> Self {
        Self {
            id,
            customer_id,
            lines: Vec::new(),
            total: Money::ZERO,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn total(&self) -> Money {
        self.total
    }

    /// Append a reserved line priced at `unit_price`.
    ///
    /// On overflow the draft is left unchanged.
    pub fn add_line(
        &mut self,
        product_id: ProductId,
        quantity: Quantity,
        unit_price: Money,
    ) -> Result<&OrderLine, OrderError> {
        let line = OrderLine {
            product_id,
            quantity,
            unit_price,
        };
        let total = self.total.checked_add(line.subtotal()?)?;
        self.total = total;
        self.lines.push(line);
        Ok(&self.lines[self.lines.len() - 1])
    }

    pub fn finish(self, created_at: DateTime<Utc>) -> Result<Order, OrderError> {
        if self.lines.is_empty() {
            return Err(OrderError::invalid("order must contain at least one line"));
        }
        Ok(Order {
            id: self.id,
            customer_id: self.customer_id,
            lines: self.lines,
            total: self.total,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(cents: i64) -> Money {
        Money::from_cents(cents).unwrap()
    }

    fn qty(n: i64) -> Quantity {
        Quantity::new(n).unwrap()
    }

    #[test]
    fn draft_accumulates_lines_in_order() {
        let p1 = ProductId::new();
        let p2 = ProductId::new();
        let mut draft = OrderDraft::new(OrderId::new(), CustomerId::new());

        draft.add_line(p1, qty(3), money(1000)).unwrap();
        draft.add_line(p2, qty(1), money(250)).unwrap();

        assert_eq!(draft.total(), money(3250));
        let order = draft.finish(Utc::now()).unwrap();
        assert_eq!(order.lines()[0].product_id, p1);
        assert_eq!(order.lines()[1].product_id, p2);
        assert_eq!(order.total(), money(3250));
    }

    #[test]
    fn empty_draft_cannot_finish() {
        let draft = OrderDraft::new(OrderId::new(), CustomerId::new());
        assert!(matches!(draft.finish(Utc::now()), Err(OrderError::InvalidRequest(_))));
    }

    #[test]
    fn overflowing_line_leaves_draft_unchanged() {
        let mut draft = OrderDraft::new(OrderId::new(), CustomerId::new());
        draft.add_line(ProductId::new(), qty(1), money(5)).unwrap();
        let before = draft.clone();

        let err = draft
            .add_line(ProductId::new(), qty(2), money(i64::MAX))
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidRequest(_)));
        assert_eq!(draft, before);
    }

    #[test]
    fn create_order_requires_lines() {
        let cmd = CreateOrder {
            customer_id: CustomerId::new(),
            items: vec![],
        };
        assert!(matches!(cmd.validate(), Err(OrderError::InvalidRequest(_))));
    }

    #[test]
    fn create_order_rejects_zero_quantity_on_deserialize() {
        let json = format!(
            r#"{{"customer_id":"{}","items":[{{"product_id":"{}","quantity":0}}]}}"#,
            CustomerId::new(),
            ProductId::new()
        );
        assert!(serde_json::from_str::<CreateOrder>(&json).is_err());
    }

    #[test]
    fn restore_rejects_mismatched_total() {
        let lines = vec![OrderLine {
            product_id: ProductId::new(),
            quantity: qty(2),
            unit_price: money(100),
        }];
        let err = Order::restore(OrderId::new(), CustomerId::new(), lines.clone(), money(150), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let ok = Order::restore(OrderId::new(), CustomerId::new(), lines, money(200), Utc::now()).unwrap();
        assert_eq!(ok.total(), money(200));
    }

    #[test]
    fn same_product_lines_are_kept_separately() {
        let p = ProductId::new();
        let mut draft = OrderDraft::new(OrderId::new(), CustomerId::new());
        draft.add_line(p, qty(2), money(100)).unwrap();
        draft.add_line(p, qty(3), money(100)).unwrap();
        let order = draft.finish(Utc::now()).unwrap();
        assert_eq!(order.lines().len(), 2);
        assert_eq!(order.quantity_of(p), 5);
    }

    #[test]
    fn serialized_order_exposes_lines_and_total() {
        let mut draft = OrderDraft::new(OrderId::new(), CustomerId::new());
        draft.add_line(ProductId::new(), qty(3), money(1000)).unwrap();
        let order = draft.finish(Utc::now()).unwrap();
        let v = serde_json::to_value(&order).unwrap();
        assert_eq!(v["total"], 3000);
        assert_eq!(v["lines"][0]["quantity"], 3);
        assert_eq!(v["lines"][0]["unit_price"], 1000);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 512,
                ..ProptestConfig::default()
            })]

            /// Property: a finished order's total is exactly the sum of quantity * unit_price.
            #[test]
            fn total_equals_sum_of_line_subtotals(
                lines in prop::collection::vec((1i64..1_000i64, 0i64..1_000_000i64), 1..20)
            ) {
                let mut draft = OrderDraft::new(OrderId::new(), CustomerId::new());
                for (q, price) in &lines {
                    draft.add_line(ProductId::new(), qty(*q), money(*price)).unwrap();
                }
                let order = draft.finish(Utc::now()).unwrap();

                let expected: i64 = lines.iter().map(|(q, p)| q * p).sum();
                prop_assert_eq!(order.total().cents(), expected);
                prop_assert_eq!(order.lines().len(), lines.len());

                let restored = Order::restore(
                    order.id(),
                    order.customer_id(),
                    order.lines().to_vec(),
                    order.total(),
                    order.created_at(),
                );
                prop_assert!(restored.is_ok());
            }
        }
    }
}

use core::fmt;

/// Lifecycle of a single order-creation attempt.
///
/// ```text
/// Started -> ValidatingCustomer -> CustomerInvalid
///                               -> ReservingLines -> LineFailed
///                                                 -> LineReserved -> ReservingLines (next line)
///                                                                 -> AllReserved -> Persisting -> Committed
///                                                                                              -> PersistFailed
/// ```
///
/// A store fault while checking the customer ends in `PersistFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderPhase {
    Started,
    ValidatingCustomer,
    CustomerInvalid,
    ReservingLines,
    LineReserved,
    LineFailed,
    AllReserved,
    Persisting,
    Committed,
    PersistFailed,
}

impl OrderPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderPhase::CustomerInvalid
                | OrderPhase::LineFailed
                | OrderPhase::Committed
                | OrderPhase::PersistFailed
        )
    }

    /// Terminal phases that require the scope's reservations to be undone.
    pub fn requires_rollback(self) -> bool {
        matches!(self, OrderPhase::LineFailed | OrderPhase::PersistFailed)
    }

    pub fn can_transition_to(self, next: OrderPhase) -> bool {
        use OrderPhase::*;
        matches!(
            (self, next),
            (Started, ValidatingCustomer)
                | (ValidatingCustomer, CustomerInvalid)
                | (ValidatingCustomer, ReservingLines)
                | (ValidatingCustomer, PersistFailed)
                | (ReservingLines, LineReserved)
                | (ReservingLines, LineFailed)
                | (LineReserved, ReservingLines)
                | (LineReserved, AllReserved)
                | (AllReserved, Persisting)
                | (Persisting, Committed)
                | (Persisting, PersistFailed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderPhase::Started => "started",
            OrderPhase::ValidatingCustomer => "validating_customer",
            OrderPhase::CustomerInvalid => "customer_invalid",
            OrderPhase::ReservingLines => "reserving_lines",
            OrderPhase::LineReserved => "line_reserved",
            OrderPhase::LineFailed => "line_failed",
            OrderPhase::AllReserved => "all_reserved",
            OrderPhase::Persisting => "persisting",
            OrderPhase::Committed => "committed",
            OrderPhase::PersistFailed => "persist_failed",
        }
    }
}

impl fmt::Display for OrderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

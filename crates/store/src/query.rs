use chrono::{DateTime, Utc};
use common::{ModelId, Money, OrderId, OrderState, Role};

use crate::entities::{Order, PriceTiers};

/// Filter for the read-side order queries used by reporting.
///
/// An empty `states` list matches every state.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Orders created at or after this instant.
    pub from: Option<DateTime<Utc>>,

    /// Orders created before this instant.
    pub to: Option<DateTime<Utc>>,

    /// Orders in any of these states.
    pub states: Vec<OrderState>,
}

impl OrderQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query matching the states that count as sales.
    pub fn sales() -> Self {
        Self {
            states: OrderState::ALL
                .into_iter()
                .filter(OrderState::counts_as_sale)
                .collect(),
            ..Default::default()
        }
    }

    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn states(mut self, states: Vec<OrderState>) -> Self {
        self.states = states;
        self
    }

    /// Returns true if an order with this state and creation time matches.
    pub fn matches(&self, state: OrderState, created_at: DateTime<Utc>) -> bool {
        if let Some(from) = self.from
            && created_at < from
        {
            return false;
        }
        if let Some(to) = self.to
            && created_at >= to
        {
            return false;
        }
        self.states.is_empty() || self.states.contains(&state)
    }

    pub(crate) fn state_names(&self) -> Vec<String> {
        self.states.iter().map(|s| s.as_str().to_string()).collect()
    }
}

/// One sold order item joined with what reporting needs to price it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesLine {
    pub order_id: OrderId,
    pub model_id: ModelId,
    pub model_name: String,
    pub quantity: i32,
    pub captured_price: Option<Money>,
    pub prices: PriceTiers,
    pub on_promotion: bool,
    /// Role of the order's owner; `None` for guest orders.
    pub buyer_role: Option<Role>,
}

/// Orders and their sold lines, read from one consistent snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SalesSnapshot {
    pub orders: Vec<Order>,
    pub lines: Vec<SalesLine>,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn sales_query_matches_confirmed_states_only() {
        let q = OrderQuery::sales();
        let now = Utc::now();
        assert!(q.matches(OrderState::Confirmed, now));
        assert!(q.matches(OrderState::Delivered, now));
        assert!(!q.matches(OrderState::Created, now));
    }

    #[test]
    fn date_range_is_half_open() {
        let from = Utc::now();
        let to = from + Duration::days(1);
        let q = OrderQuery::new().from(from).to(to);
        assert!(q.matches(OrderState::Created, from));
        assert!(!q.matches(OrderState::Created, to));
        assert!(!q.matches(OrderState::Created, from - Duration::seconds(1)));
    }
}

//! Report types and the aggregation over orders and sold lines.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{ModelId, Money, OrderState};
use serde::Serialize;
use store::{Order, OrderQuery, SalesLine};

use crate::{ReportError, Result};

/// Date range and state filter of a sales report.
///
/// With no states the report covers the states that count as sales
/// (`Confirmed` and `Delivered`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub states: Vec<OrderState>,
}

impl ReportQuery {
    pub fn new() -> Self {
        Self::default()
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

    /// Validates the range and builds the store query.
    pub fn order_query(&self) -> Result<OrderQuery> {
        if let (Some(from), Some(to)) = (self.from, self.to)
            && from > to
        {
            return Err(ReportError::InvalidRange { from, to });
        }
        let mut query = if self.states.is_empty() {
            OrderQuery::sales()
        } else {
            OrderQuery::new().states(self.states.clone())
        };
        query.from = self.from;
        query.to = self.to;
        Ok(query)
    }
}

/// The model that sold the most units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BestSeller {
    pub model_id: ModelId,
    pub model_name: String,
    pub units: i64,
}

/// Units, revenue and profit of one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSales {
    pub model_id: ModelId,
    pub model_name: String,
    pub units: i64,
    pub revenue: Money,
    pub profit: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesReport {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub states: Vec<OrderState>,
    pub order_count: u64,
    /// Sum of the stored order totals, discounts included.
    pub total_sales: Money,
    pub units_sold: i64,
    pub best_seller: Option<BestSeller>,
    /// Sum of resolved unit price × quantity over every sold item.
    pub gross_revenue: Money,
    /// Sum of (resolved unit price − cost) × quantity over every sold item.
    pub net_profit: Money,
    /// Per-model breakdown, best sellers first.
    pub models: Vec<ModelSales>,
}

/// The unit price a sold line counts at.
///
/// A model on promotion counts at its promotional price. Otherwise the price
/// captured on the item wins, falling back to the buyer's tier column for
/// items placed before prices were captured.
pub fn line_price(line: &SalesLine) -> Money {
    if line.on_promotion {
        return line.prices.promotional;
    }
    line.captured_price
        .unwrap_or_else(|| line.prices.for_role(line.buyer_role))
}

/// Folds matching orders and their sold lines into a report.
pub fn aggregate(query: &OrderQuery, orders: &[Order], lines: &[SalesLine]) -> SalesReport {
    let mut per_model: BTreeMap<ModelId, ModelSales> = BTreeMap::new();
    let mut gross_revenue = Money::zero();
    let mut net_profit = Money::zero();
    let mut units_sold = 0i64;

    for line in lines {
        let units = line.quantity.max(0).unsigned_abs();
        let price = line_price(line);
        let revenue = price.multiply(units);
        let profit = (price - line.prices.cost).multiply(units);

        units_sold += i64::from(units);
        gross_revenue += revenue;
        net_profit += profit;

        let entry = per_model.entry(line.model_id).or_insert_with(|| ModelSales {
            model_id: line.model_id,
            model_name: line.model_name.clone(),
            units: 0,
            revenue: Money::zero(),
            profit: Money::zero(),
        });
        entry.units += i64::from(units);
        entry.revenue += revenue;
        entry.profit += profit;
    }

    // Stable sort over id order keeps ties deterministic.
    let mut models: Vec<ModelSales> = per_model.into_values().collect();
    models.sort_by(|a, b| b.units.cmp(&a.units));

    let best_seller = models
        .first()
        .filter(|m| m.units > 0)
        .map(|m| BestSeller {
            model_id: m.model_id,
            model_name: m.model_name.clone(),
            units: m.units,
        });

    SalesReport {
        from: query.from,
        to: query.to,
        states: query.states.clone(),
        order_count: orders.len() as u64,
        total_sales: orders.iter().map(|o| o.total).sum(),
        units_sold,
        best_seller,
        gross_revenue,
        net_profit,
        models,
    }
}

#[cfg(test)]
mod tests {
    use common::{OrderId, Role};
    use store::PriceTiers;

    use super::*;

    fn prices() -> PriceTiers {
        PriceTiers {
            cost: Money::from_cents(1000),
            retail: Money::from_cents(3000),
            reseller: Money::from_cents(2500),
            allied: Money::from_cents(2200),
            promotional: Money::from_cents(2000),
        }
    }

    fn line(model_id: ModelId, quantity: i32, captured: Option<i64>) -> SalesLine {
        SalesLine {
            order_id: OrderId::new(),
            model_id,
            model_name: "Runner".to_string(),
            quantity,
            captured_price: captured.map(Money::from_cents),
            prices: prices(),
            on_promotion: false,
            buyer_role: Some(Role::Reseller),
        }
    }

    #[test]
    fn test_price_resolution_order() {
        let m = ModelId::new();
        assert_eq!(line_price(&line(m, 1, Some(2800))).cents(), 2800);
        assert_eq!(line_price(&line(m, 1, None)).cents(), 2500);

        let mut promo = line(m, 1, Some(2800));
        promo.on_promotion = true;
        assert_eq!(line_price(&promo).cents(), 2000);

        let mut guest = line(m, 1, None);
        guest.buyer_role = None;
        assert_eq!(line_price(&guest).cents(), 3000);
    }

    #[test]
    fn test_aggregate_sums_and_profit() {
        let a = ModelId::new();
        let b = ModelId::new();
        let lines = vec![line(a, 2, Some(3000)), line(b, 3, Some(2500)), line(a, 1, None)];

        let report = aggregate(&OrderQuery::sales(), &[], &lines);
        assert_eq!(report.units_sold, 6);
        assert_eq!(report.gross_revenue.cents(), 2 * 3000 + 3 * 2500 + 2500);
        assert_eq!(report.net_profit.cents(), 2 * 2000 + 3 * 1500 + 1500);
        assert_eq!(report.models.len(), 2);
    }

    #[test]
    fn test_best_seller_ties_break_by_model_id() {
        let a = ModelId::new();
        let b = ModelId::new();
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let lines = vec![line(high, 2, None), line(low, 2, None)];

        let report = aggregate(&OrderQuery::sales(), &[], &lines);
        assert_eq!(report.best_seller.unwrap().model_id, low);
    }

    #[test]
    fn test_empty_report() {
        let report = aggregate(&OrderQuery::sales(), &[], &[]);
        assert_eq!(report.order_count, 0);
        assert_eq!(report.units_sold, 0);
        assert!(report.best_seller.is_none());
        assert_eq!(report.gross_revenue, Money::zero());
    }

    #[test]
    fn test_query_defaults_to_sale_states() {
        let query = ReportQuery::new().order_query().unwrap();
        assert_eq!(query.states, vec![OrderState::Confirmed, OrderState::Delivered]);

        let query = ReportQuery::new()
            .states(vec![OrderState::Created])
            .order_query()
            .unwrap();
        assert_eq!(query.states, vec![OrderState::Created]);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let now = Utc::now();
        let err = ReportQuery::new()
            .from(now)
            .to(now - chrono::Duration::days(1))
            .order_query()
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidRange { .. }));
    }
}

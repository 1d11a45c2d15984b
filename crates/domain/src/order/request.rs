use std::collections::BTreeMap;

use common::{ModelId, Money, UserId};
use serde::{Deserialize, Serialize};
use store::OrderKind;

use super::{CurveSpec, OrderError};

/// A line asking for units of one model in one size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalLine {
    pub model_id: ModelId,
    pub size: i32,
    pub quantity: i32,
}

/// A line asking for bundles of one model following a size curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveLine {
    pub model_id: ModelId,
    /// Curve in `count/size` notation, e.g. `"1/37,2/38"`.
    pub curve: String,
    pub bundles: i32,
}

/// The lines of an order request. A request is either all normal lines or
/// all curve lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "lines", rename_all = "snake_case")]
pub enum OrderLines {
    Normal(Vec<NormalLine>),
    Curve(Vec<CurveLine>),
}

/// Units needed from one stock row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub model_id: ModelId,
    pub size: i32,
    pub quantity: i32,
}

impl OrderLines {
    pub fn kind(&self) -> OrderKind {
        match self {
            OrderLines::Normal(_) => OrderKind::Normal,
            OrderLines::Curve(_) => OrderKind::Curve,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            OrderLines::Normal(lines) => lines.is_empty(),
            OrderLines::Curve(lines) => lines.is_empty(),
        }
    }

    /// Validates the lines and flattens them into one requirement per
    /// (model, size), ordered by model then size.
    pub fn requirements(&self) -> Result<Vec<Requirement>, OrderError> {
        if self.is_empty() {
            return Err(OrderError::NoItems);
        }

        let mut flat: Vec<(ModelId, i32, i32)> = Vec::new();
        match self {
            OrderLines::Normal(lines) => {
                for line in lines {
                    if line.quantity <= 0 {
                        return Err(OrderError::InvalidQuantity {
                            quantity: line.quantity,
                        });
                    }
                    flat.push((line.model_id, line.size, line.quantity));
                }
            }
            OrderLines::Curve(lines) => {
                for line in lines {
                    let curve = CurveSpec::parse(&line.curve)?;
                    for (size, quantity) in curve.expand(line.bundles)? {
                        flat.push((line.model_id, size, quantity));
                    }
                }
            }
        }

        let mut merged: BTreeMap<(ModelId, i32), i32> = BTreeMap::new();
        for (model_id, size, quantity) in flat {
            let entry = merged.entry((model_id, size)).or_default();
            *entry = entry
                .checked_add(quantity)
                .ok_or(OrderError::InvalidQuantity { quantity })?;
        }

        Ok(merged
            .into_iter()
            .map(|((model_id, size), quantity)| Requirement {
                model_id,
                size,
                quantity,
            })
            .collect())
    }
}

/// A request to place an order.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    /// Owner of the order; `None` for guest orders.
    pub user_id: Option<UserId>,
    pub comments: Option<String>,
    pub lines: OrderLines,
    /// Total computed by the client. Only compared, never stored.
    pub client_total: Option<Money>,
}

impl PlaceOrder {
    pub fn new(user_id: Option<UserId>, lines: OrderLines) -> Self {
        Self {
            user_id,
            comments: None,
            lines,
            client_total: None,
        }
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    pub fn with_client_total(mut self, total: Money) -> Self {
        self.client_total = Some(total);
        self
    }
}

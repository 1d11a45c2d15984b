use std::collections::HashMap;

use common::{ModelId, Money, Role};
use store::{Model, NewOrderItem};

use super::{OrderError, Requirement};

/// Captures a unit price on every requirement.
///
/// A model on promotion sells at its promotional price to everyone; otherwise
/// the buyer's role picks the price column.
pub fn price_requirements(
    requirements: &[Requirement],
    models: &HashMap<ModelId, Model>,
    role: Option<Role>,
) -> Result<Vec<NewOrderItem>, OrderError> {
    requirements
        .iter()
        .map(|req| {
            let model = models
                .get(&req.model_id)
                .ok_or(OrderError::ModelNotFound {
                    model_id: req.model_id,
                })?;
            Ok(NewOrderItem {
                model_id: req.model_id,
                size: req.size,
                quantity: req.quantity,
                unit_price: model.unit_price_for(role),
            })
        })
        .collect()
}

/// Sum of unit price × quantity.
pub fn priced_total(items: &[NewOrderItem]) -> Money {
    items
        .iter()
        .map(|item| item.unit_price.multiply(item.quantity.max(0).unsigned_abs()))
        .sum()
}

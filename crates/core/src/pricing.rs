use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::domain::customization::{GroupId, OptionId, Selections};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLine {
    pub group_id: GroupId,
    pub option_id: OptionId,
    pub name: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base_price: Decimal,
    pub lines: Vec<PriceLine>,
    pub options_total: Decimal,
    pub total: Decimal,
}

/// Base price plus the sum of every selected option's price.
pub fn total_price(base_price: Decimal, selections: &Selections, catalog: &Catalog) -> Decimal {
    base_price
        + selections
            .all()
            .filter_map(|selection| catalog.option(&selection.group_id, &selection.option_id))
            .map(|option| option.price)
            .sum::<Decimal>()
}

/// Same total as [`total_price`], with one line per priced selection. Options
/// the catalog does not know contribute nothing.
pub fn price_with_breakdown(
    base_price: Decimal,
    selections: &Selections,
    catalog: &Catalog,
) -> PriceBreakdown {
    let lines: Vec<PriceLine> = selections
        .all()
        .filter_map(|selection| {
            catalog.option(&selection.group_id, &selection.option_id).map(|option| PriceLine {
                group_id: selection.group_id.clone(),
                option_id: option.id.clone(),
                name: option.name.clone(),
                amount: option.price,
            })
        })
        .collect();
    let options_total = lines.iter().map(|line| line.amount).sum::<Decimal>();

    PriceBreakdown { base_price, lines, options_total, total: base_price + options_total }
}

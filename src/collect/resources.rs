use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use super::quantity::{ParsedQuantity, QuantityError};

pub type ResourceList = BTreeMap<String, Quantity>;

/// Sums quantities per resource category across all inputs. Categories
/// missing on an input count as zero; `cpu` and `memory` are always present
/// in the result, zero-valued when no input carried them.
pub fn aggregate<'a, I>(lists: I) -> Result<ResourceList, QuantityError>
where
    I: IntoIterator<Item = &'a ResourceList>,
{
    let mut totals: BTreeMap<String, ParsedQuantity> = BTreeMap::new();
    totals.insert("cpu".to_string(), ParsedQuantity::zero());
    totals.insert("memory".to_string(), ParsedQuantity::zero());

    for list in lists {
        for (category, quantity) in list {
            let parsed = ParsedQuantity::try_from(quantity)?;
            let total = totals
                .entry(category.clone())
                .or_insert_with(ParsedQuantity::zero);
            *total = total.add(parsed)?;
        }
    }

    Ok(totals
        .into_iter()
        .map(|(category, total)| (category, total.into()))
        .collect())
}

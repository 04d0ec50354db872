//! Read-side views over the ledger: per-item summaries and audit replay.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use stockroom_core::{CategoryId, DomainError, ItemId};

use crate::catalog::{Category, Item};
use crate::lot::{Lot, total_remaining};
use crate::transaction::{StockTransaction, TransactionKind};

/// One row of the item overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSummary {
    pub id: ItemId,
    pub name: String,
    pub category_id: CategoryId,
    pub category: Option<String>,
    pub unit: String,
    pub on_hand: i64,
    pub reorder_threshold: i64,
    pub below_reorder: bool,
    /// Earliest expiry among lots that still hold stock.
    pub next_expiry: Option<NaiveDate>,
    pub last_receive_at: Option<DateTime<Utc>>,
    pub last_issue_at: Option<DateTime<Utc>>,
}

/// An item whose lots disagree with its replayed audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub item_id: ItemId,
    pub lots_on_hand: i64,
    pub replayed_on_hand: i64,
}

/// Build summaries for `items`, in the order given.
pub fn summarize_all(
    items: &[Item],
    categories: &[Category],
    lots: &[Lot],
    transactions: &[StockTransaction],
) -> Result<Vec<ItemSummary>, DomainError> {
    let category_names: HashMap<CategoryId, &str> =
        categories.iter().map(|c| (c.id, c.name.as_str())).collect();

    let mut lots_by_item: HashMap<ItemId, Vec<&Lot>> = HashMap::new();
    for lot in lots {
        lots_by_item.entry(lot.item_id()).or_default().push(lot);
    }

    let mut last_seen: HashMap<(ItemId, TransactionKind), DateTime<Utc>> = HashMap::new();
    for tx in transactions {
        last_seen
            .entry((tx.item_id, tx.kind))
            .and_modify(|at| *at = (*at).max(tx.occurred_at))
            .or_insert(tx.occurred_at);
    }

    items
        .iter()
        .map(|item| -> Result<ItemSummary, DomainError> {
            let item_lots = lots_by_item.get(&item.id).map(Vec::as_slice).unwrap_or(&[]);
            let on_hand = total_remaining(item_lots.iter().copied())?;
            let next_expiry = item_lots
                .iter()
                .filter(|l| l.is_available())
                .filter_map(|l| l.expiry())
                .min();

            Ok(ItemSummary {
                id: item.id,
                name: item.name.clone(),
                category_id: item.category_id,
                category: category_names.get(&item.category_id).map(|n| n.to_string()),
                unit: item.unit.clone(),
                on_hand,
                reorder_threshold: item.reorder_threshold,
                below_reorder: item.reorder_threshold > 0 && on_hand <= item.reorder_threshold,
                next_expiry,
                last_receive_at: last_seen.get(&(item.id, TransactionKind::Receive)).copied(),
                last_issue_at: last_seen.get(&(item.id, TransactionKind::Issue)).copied(),
            })
        })
        .collect()
}

/// Sum signed transaction quantities per item.
///
/// History may add up to more than `i64::MAX` along the way (receipts that
/// were later issued), so sums run in `i128`; only the final balance must fit.
pub fn replay_on_hand(transactions: &[StockTransaction]) -> Result<BTreeMap<ItemId, i64>, DomainError> {
    let mut totals: BTreeMap<ItemId, i128> = BTreeMap::new();
    for tx in transactions {
        *totals.entry(tx.item_id).or_insert(0) += i128::from(tx.quantity);
    }
    totals
        .into_iter()
        .map(|(item_id, total)| {
            i64::try_from(total)
                .map(|on_hand| (item_id, on_hand))
                .map_err(|_| DomainError::invariant(format!("replayed balance of item {item_id} is out of range")))
        })
        .collect()
}

/// Compare lot balances with the replayed audit trail; empty when consistent.
pub fn reconcile(lots: &[Lot], transactions: &[StockTransaction]) -> Result<Vec<Discrepancy>, DomainError> {
    let mut lots_by_item: BTreeMap<ItemId, Vec<&Lot>> = BTreeMap::new();
    for lot in lots {
        lots_by_item.entry(lot.item_id()).or_default().push(lot);
    }
    let from_lots = lots_by_item
        .into_iter()
        .map(|(item_id, item_lots)| total_remaining(item_lots).map(|total| (item_id, total)))
        .collect::<Result<BTreeMap<ItemId, i64>, DomainError>>()?;
    let replayed = replay_on_hand(transactions)?;

    let mut items: Vec<ItemId> = from_lots.keys().chain(replayed.keys()).copied().collect();
    items.sort();
    items.dedup();

    Ok(items
        .into_iter()
        .filter_map(|item_id| {
            let lots_on_hand = from_lots.get(&item_id).copied().unwrap_or(0);
            let replayed_on_hand = replayed.get(&item_id).copied().unwrap_or(0);
            (lots_on_hand != replayed_on_hand).then_some(Discrepancy {
                item_id,
                lots_on_hand,
                replayed_on_hand,
            })
        })
        .collect())
}

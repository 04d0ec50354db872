//! Flat CSV exports (header row + one record per entity).

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use stockroom_core::{CategoryId, ItemId, LotId, TransactionId, UserId};
use stockroom_ledger::{ItemSummary, Lot};

use crate::services::TransactionView;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv buffer flush failed: {0}")]
    Flush(String),
}

const ITEM_HEADER: [&str; 11] = [
    "id",
    "name",
    "category_id",
    "category",
    "unit",
    "on_hand",
    "reorder_threshold",
    "below_reorder",
    "next_expiry",
    "last_receive_at",
    "last_issue_at",
];
const LOT_HEADER: [&str; 7] = ["id", "item_id", "item_name", "received", "remaining", "expiry", "received_at"];
const TRANSACTION_HEADER: [&str; 9] = [
    "id",
    "occurred_at",
    "kind",
    "item_id",
    "item_name",
    "lot_id",
    "quantity",
    "actor",
    "note",
];

// Field order of each row struct must match its header.
#[derive(Serialize)]
struct ItemRow<'a> {
    id: ItemId,
    name: &'a str,
    category_id: CategoryId,
    category: &'a str,
    unit: &'a str,
    on_hand: i64,
    reorder_threshold: i64,
    below_reorder: bool,
    next_expiry: Option<NaiveDate>,
    last_receive_at: Option<DateTime<Utc>>,
    last_issue_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct LotRow<'a> {
    id: LotId,
    item_id: ItemId,
    item_name: &'a str,
    received: i64,
    remaining: i64,
    expiry: Option<NaiveDate>,
    received_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct TransactionRow<'a> {
    id: TransactionId,
    occurred_at: DateTime<Utc>,
    kind: &'static str,
    item_id: ItemId,
    item_name: &'a str,
    lot_id: LotId,
    quantity: i64,
    actor: UserId,
    note: &'a str,
}

pub fn items_csv(items: &[ItemSummary]) -> Result<Vec<u8>, ExportError> {
    write_rows(&ITEM_HEADER, items.iter().map(|s| ItemRow {
        id: s.id,
        name: &s.name,
        category_id: s.category_id,
        category: s.category.as_deref().unwrap_or(""),
        unit: &s.unit,
        on_hand: s.on_hand,
        reorder_threshold: s.reorder_threshold,
        below_reorder: s.below_reorder,
        next_expiry: s.next_expiry,
        last_receive_at: s.last_receive_at,
        last_issue_at: s.last_issue_at,
    }))
}

/// `item_names` resolves the item column; unknown items export with an empty name.
pub fn lots_csv(lots: &[Lot], item_names: &HashMap<ItemId, String>) -> Result<Vec<u8>, ExportError> {
    write_rows(&LOT_HEADER, lots.iter().map(|l| LotRow {
        id: l.id(),
        item_id: l.item_id(),
        item_name: item_names.get(&l.item_id()).map(String::as_str).unwrap_or(""),
        received: l.received(),
        remaining: l.remaining(),
        expiry: l.expiry(),
        received_at: l.received_at(),
    }))
}

pub fn transactions_csv(rows: &[TransactionView]) -> Result<Vec<u8>, ExportError> {
    write_rows(&TRANSACTION_HEADER, rows.iter().map(|r| TransactionRow {
        id: r.transaction.id,
        occurred_at: r.transaction.occurred_at,
        kind: r.transaction.kind.as_str(),
        item_id: r.transaction.item_id,
        item_name: &r.item_name,
        lot_id: r.transaction.lot_id,
        quantity: r.transaction.quantity,
        actor: r.transaction.actor,
        note: r.transaction.note.as_deref().unwrap_or(""),
    }))
}

/// The header is written explicitly so an empty export still names its columns.
fn write_rows<R: Serialize>(header: &[&str], rows: impl Iterator<Item = R>) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.into_inner().map_err(|e| ExportError::Flush(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use stockroom_ledger::{StockTransaction, TransactionKind};

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn lots_export_has_header_and_rows() {
        let item = ItemId::new();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let lot = Lot::receive(LotId::new(), item, 12, NaiveDate::from_ymd_opt(2024, 9, 30), at).unwrap();
        let names = HashMap::from([(item, "Rice, jasmine".to_string())]);

        let out = text(lots_csv(&[lot], &names).unwrap());
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("id,item_id,item_name,received,remaining,expiry,received_at")
        );
        let row = lines.next().unwrap();
        assert!(row.contains("\"Rice, jasmine\",12,12,2024-09-30,"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn transactions_export_signs_quantities() {
        let tx = StockTransaction::issue(
            TransactionId::new(),
            ItemId::new(),
            LotId::new(),
            4,
            Utc::now(),
            UserId::new(),
            None,
        );
        assert_eq!(tx.kind, TransactionKind::Issue);
        let out = text(
            transactions_csv(&[TransactionView {
                transaction: tx,
                item_name: "Gloves".into(),
            }])
            .unwrap(),
        );
        let row = out.lines().nth(1).unwrap();
        assert!(row.contains(",issue,"));
        assert!(row.contains(",Gloves,"));
        assert!(row.contains(",-4,"));
    }

    #[test]
    fn empty_export_still_has_header() {
        let out = text(items_csv(&[]).unwrap());
        assert_eq!(out.lines().count(), 1);
        assert!(out.starts_with("id,name,category_id,category,unit,on_hand,"));
    }
}

//! Inventory CSV codec.
//!
//! Every cell is double-quoted with embedded quotes doubled, rows are joined
//! with `\r\n`. The fixed columns come first; columns added by other
//! writers follow in name order.

use crate::entity::{normalize_plate, InventoryItem};
use crate::error::{ModelError, ModelResult};
use crate::lenient::{format_f64, parse_f64};
use serde_json::Value;
use std::collections::BTreeSet;

/// Inventory columns in file order.
pub const INVENTORY_COLUMNS: [&str; 10] = [
    "no",
    "owner",
    "purchasePrice",
    "repairCost",
    "sellingPrice",
    "netProfit",
    "datePurchase",
    "dateSelling",
    "_updatedAt",
    "_deleted",
];

/// Splits CSV text into records of trimmed fields.
///
/// A quote toggles quoting unless it is a doubled quote inside a quoted
/// field. Line breaks inside quotes belong to the field; blank lines are
/// skipped.
///
/// # Errors
///
/// Returns [`ModelError::Csv`] when a quote is still open at end of input.
pub fn parse_records(text: &str) -> ModelResult<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut quote_line = 0usize;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => {
                in_quotes = !in_quotes;
                quote_line = line;
            }
            ',' if !in_quotes => record.push(std::mem::take(&mut field).trim().to_string()),
            '\r' | '\n' if !in_quotes => {
                if ch == '\n' {
                    line += 1;
                }
                finish_record(&mut records, &mut record, &mut field);
            }
            other => {
                if other == '\n' {
                    line += 1;
                }
                field.push(other);
            }
        }
    }

    if in_quotes {
        return Err(ModelError::csv(quote_line, "unterminated quoted field"));
    }
    finish_record(&mut records, &mut record, &mut field);
    Ok(records)
}

fn finish_record(records: &mut Vec<Vec<String>>, record: &mut Vec<String>, field: &mut String) {
    record.push(std::mem::take(field).trim().to_string());
    let blank = record.len() == 1 && record[0].is_empty();
    let done = std::mem::take(record);
    if !blank {
        records.push(done);
    }
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

/// Renders one row, every cell quoted.
#[must_use]
pub fn write_row<S: AsRef<str>>(cells: &[S]) -> String {
    cells
        .iter()
        .map(|cell| quote(cell.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Decodes the inventory file.
///
/// Numbers parse leniently, `netProfit` is recomputed, `_deleted` is true
/// only for `"true"` and the plate is normalized. Columns outside the fixed
/// set are kept in `extra` as strings.
///
/// # Errors
///
/// Fails on broken quoting or when the header has no `no` column.
pub fn decode_inventory(text: &str) -> ModelResult<Vec<InventoryItem>> {
    let records = parse_records(text)?;
    let Some((header, rows)) = records.split_first() else {
        return Ok(Vec::new());
    };
    if !header.iter().any(|h| h == "no") {
        return Err(ModelError::csv(1, "header has no `no` column"));
    }

    Ok(rows
        .iter()
        .map(|row| {
            let mut item = InventoryItem::default();
            let cells = row.iter().map(String::as_str).chain(std::iter::repeat(""));
            for (name, cell) in header.iter().zip(cells) {
                match name.as_str() {
                    "no" => item.no = normalize_plate(cell),
                    "owner" => item.owner = cell.to_string(),
                    "purchasePrice" => item.purchase_price = parse_f64(cell),
                    "repairCost" => item.repair_cost = parse_f64(cell),
                    "sellingPrice" => item.selling_price = parse_f64(cell),
                    "netProfit" => {}
                    "datePurchase" => item.date_purchase = cell.to_string(),
                    "dateSelling" => item.date_selling = cell.to_string(),
                    "_updatedAt" => {
                        item.updated_at = (!cell.is_empty()).then(|| cell.to_string());
                    }
                    "_deleted" => item.deleted = cell == "true",
                    "_id" | "" => {}
                    other => {
                        item.extra
                            .insert(other.to_string(), Value::String(cell.to_string()));
                    }
                }
            }
            item.recompute_profit();
            item
        })
        .collect())
}

/// Encodes the inventory file.
///
/// Extra fields become trailing columns so that columns added by another
/// device survive a round trip. Local ids are not written.
#[must_use]
pub fn encode_inventory(items: &[InventoryItem]) -> String {
    let extra_columns: BTreeSet<&str> = items
        .iter()
        .flat_map(|item| item.extra.keys().map(String::as_str))
        .filter(|name| !name.is_empty() && *name != "_id" && !INVENTORY_COLUMNS.contains(name))
        .collect();

    let mut header: Vec<&str> = INVENTORY_COLUMNS.to_vec();
    header.extend(extra_columns.iter().copied());

    let mut lines = Vec::with_capacity(items.len() + 1);
    lines.push(write_row(&header));
    for item in items {
        let mut cells = vec![
            item.no.clone(),
            item.owner.clone(),
            format_f64(item.purchase_price),
            format_f64(item.repair_cost),
            format_f64(item.selling_price),
            format_f64(item.net_profit),
            item.date_purchase.clone(),
            item.date_selling.clone(),
            item.updated_at.clone().unwrap_or_default(),
            item.deleted.to_string(),
        ];
        cells.extend(
            extra_columns
                .iter()
                .map(|name| extra_cell(item.extra.get(*name))),
        );
        lines.push(write_row(&cells));
    }
    lines.join("\r\n")
}

fn extra_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_fields_and_escapes() {
        let records = parse_records("\"a\",\"b \"\"c\"\"\",d\r\n\r\n\"x,y\",\"line\nbreak\"").unwrap();
        assert_eq!(
            records,
            vec![
                vec!["a".to_string(), "b \"c\"".to_string(), "d".to_string()],
                vec!["x,y".to_string(), "line\nbreak".to_string()],
            ]
        );
    }

    #[test]
    fn unterminated_quote_fails() {
        let err = parse_records("\"no\",\"owner\"\n\"AB12,X").unwrap_err();
        assert!(matches!(err, ModelError::Csv { line: 2, .. }));
    }

    #[test]
    fn decode_normalizes() {
        let text = "\"no\",\"owner\",\"purchasePrice\",\"repairCost\",\"sellingPrice\",\"netProfit\",\"_deleted\",\"color\"\r\n\
                    \" ab12 \",\"Ravi\",\"10000\",\"oops\",\"12500.5\",\"999\",\"TRUE\",\"red\"";
        let items = decode_inventory(text).unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.no, "AB12");
        assert_eq!(item.repair_cost, 0.0);
        assert_eq!(item.net_profit, 2500.5);
        assert!(!item.deleted);
        assert_eq!(item.updated_at, None);
        assert_eq!(item.extra["color"], "red");
    }

    #[test]
    fn short_rows_fill_with_blanks() {
        let items = decode_inventory("no,owner,sellingPrice\nKA01").unwrap();
        assert_eq!(items[0].owner, "");
        assert_eq!(items[0].selling_price, 0.0);
    }

    #[test]
    fn missing_plate_column_is_an_error() {
        assert!(decode_inventory("\"owner\"\n\"x\"").is_err());
        assert!(decode_inventory("   \r\n").unwrap().is_empty());
    }

    #[test]
    fn extra_columns_survive_a_round_trip() {
        let text = "\"no\",\"owner\",\"color\"\r\n\"AB12\",\"Ravi\",\"red\"\r\n\"KA01\",\"Mina\",\"\"";
        let items = decode_inventory(text).unwrap();
        let encoded = encode_inventory(&items);

        let header = encoded.lines().next().unwrap();
        assert!(header.ends_with(",\"_deleted\",\"color\""));
        let again = decode_inventory(&encoded).unwrap();
        assert_eq!(again[0].extra["color"], "red");
        assert_eq!(again[1].extra["color"], "");
        assert_eq!(encode_inventory(&again), encoded);
    }

    #[test]
    fn encode_matches_wire_layout() {
        let item = InventoryItem {
            no: "AB12".into(),
            owner: "Say \"hi\"".into(),
            purchase_price: 1000.0,
            selling_price: 1500.0,
            net_profit: 500.0,
            updated_at: Some("2024-01-01T00:00:00.000Z".into()),
            ..InventoryItem::default()
        };
        let text = encode_inventory(&[item]);
        let expected = "\"no\",\"owner\",\"purchasePrice\",\"repairCost\",\"sellingPrice\",\"netProfit\",\"datePurchase\",\"dateSelling\",\"_updatedAt\",\"_deleted\"\r\n\
                        \"AB12\",\"Say \"\"hi\"\"\",\"1000\",\"0\",\"1500\",\"500\",\"\",\"\",\"2024-01-01T00:00:00.000Z\",\"false\"";
        assert_eq!(text, expected);

        let back = decode_inventory(&text).unwrap();
        assert_eq!(back[0].owner, "Say \"hi\"");
        assert_eq!(encode_inventory(&back), text);
    }
}

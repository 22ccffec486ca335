//! Pure merge functions, one per entity family shape.
//!
//! Every merge takes the local and the remote version of a whole family and
//! returns the reconciled family. Local store ids survive where a local
//! record is kept or replaced by its remote counterpart.

use crate::error::{SyncError, SyncResult};
use bikeledger_model::time::parse_millis;
use bikeledger_model::{
    name_identity, normalize_plate, Collection, Customer, EditLogEntry, Expense, ImageSet,
    InventoryItem, LedgerEntry, ModelError, Part, Record, ServiceRecord, Supplier,
    MAX_IMAGES_PER_PLATE,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Records reconciled by whole-record last-writer-wins.
pub trait Versioned: Record {
    /// Identity key; records without one are dropped.
    fn identity(&self) -> Option<String>;
    /// Last modification time.
    fn updated_at(&self) -> Option<&str>;
}

impl Versioned for InventoryItem {
    fn identity(&self) -> Option<String> {
        InventoryItem::identity(self)
    }

    fn updated_at(&self) -> Option<&str> {
        self.updated_at.as_deref()
    }
}

/// Append-only log entries, identified by their timestamp.
pub trait Logged: Record {
    /// Entry timestamp.
    fn timestamp(&self) -> Option<&str>;
}

impl Logged for LedgerEntry {
    fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }
}

impl Logged for EditLogEntry {
    fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }
}

/// Records keyed by a domain key, local winning on equal keys.
pub trait Keyed: Record {
    /// Domain key; records without one are dropped.
    fn key(&self) -> Option<String>;
    /// Display order.
    fn display_cmp(&self, other: &Self) -> Ordering;
}

fn newest_date_first(a: &str, b: &str) -> Ordering {
    match (parse_millis(a), parse_millis(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn by_name(a: &str, b: &str) -> Ordering {
    a.trim()
        .to_lowercase()
        .cmp(&b.trim().to_lowercase())
        .then_with(|| a.cmp(b))
}

impl Keyed for Expense {
    fn key(&self) -> Option<String> {
        self.identity()
    }

    fn display_cmp(&self, other: &Self) -> Ordering {
        newest_date_first(&self.date, &other.date)
    }
}

impl Keyed for ServiceRecord {
    fn key(&self) -> Option<String> {
        self.identity()
    }

    fn display_cmp(&self, other: &Self) -> Ordering {
        newest_date_first(&self.date, &other.date)
    }
}

impl Keyed for Customer {
    fn key(&self) -> Option<String> {
        name_identity(&self.name)
    }

    fn display_cmp(&self, other: &Self) -> Ordering {
        by_name(&self.name, &other.name)
    }
}

impl Keyed for Part {
    fn key(&self) -> Option<String> {
        name_identity(&self.name)
    }

    fn display_cmp(&self, other: &Self) -> Ordering {
        by_name(&self.name, &other.name)
    }
}

impl Keyed for Supplier {
    fn key(&self) -> Option<String> {
        name_identity(&self.name)
    }

    fn display_cmp(&self, other: &Self) -> Ordering {
        by_name(&self.name, &other.name)
    }
}

fn stamp<T: Versioned>(record: &T) -> Option<i64> {
    record.updated_at().and_then(parse_millis)
}

/// Whole-record last-writer-wins by identity.
///
/// Local is kept unless the remote record is strictly newer. Missing or
/// unparseable timestamps are older than any valid one. Tombstones are
/// ordinary records here, so a delete survives unless something newer
/// replaces it. Output is ordered by identity.
pub fn merge_latest_wins<T: Versioned>(local: Vec<T>, remote: Vec<T>) -> Vec<T> {
    let mut merged: BTreeMap<String, T> = BTreeMap::new();

    for record in local {
        let Some(key) = record.identity() else {
            continue;
        };
        match merged.get(&key) {
            Some(existing) if stamp(&record) <= stamp(existing) => {}
            _ => {
                merged.insert(key, record);
            }
        }
    }

    for mut record in remote {
        let Some(key) = record.identity() else {
            continue;
        };
        match merged.get_mut(&key) {
            None => {
                record.set_local_id(None);
                merged.insert(key, record);
            }
            Some(existing) if stamp(&record) > stamp(existing) => {
                record.set_local_id(existing.local_id());
                *existing = record;
            }
            Some(_) => {}
        }
    }

    merged.into_values().collect()
}

fn log_order<T: Logged>(a: &T, b: &T) -> Ordering {
    let (a, b) = (a.timestamp().unwrap_or(""), b.timestamp().unwrap_or(""));
    parse_millis(a).cmp(&parse_millis(b)).then_with(|| a.cmp(b))
}

/// Union of two logs keyed by exact timestamp, local winning on collision,
/// sorted ascending. Entries without a timestamp are dropped.
pub fn merge_log<T: Logged>(local: Vec<T>, remote: Vec<T>) -> Vec<T> {
    let mut merged: BTreeMap<String, T> = BTreeMap::new();
    for mut entry in remote {
        if let Some(ts) = entry.timestamp().map(str::to_string) {
            entry.set_local_id(None);
            merged.insert(ts, entry);
        }
    }
    for entry in local {
        if let Some(ts) = entry.timestamp().map(str::to_string) {
            merged.insert(ts, entry);
        }
    }

    let mut entries: Vec<T> = merged.into_values().collect();
    entries.sort_by(log_order);
    entries
}

/// Union by domain key, local overwriting remote, sorted for display.
pub fn merge_keyed<T: Keyed>(local: Vec<T>, remote: Vec<T>) -> Vec<T> {
    let mut merged: BTreeMap<String, T> = BTreeMap::new();
    for mut record in remote {
        if let Some(key) = record.key() {
            record.set_local_id(None);
            merged.insert(key, record);
        }
    }
    for record in local {
        if let Some(key) = record.key() {
            merged.insert(key, record);
        }
    }

    let mut records: Vec<(String, T)> = merged.into_iter().collect();
    records.sort_by(|(ka, a), (kb, b)| a.display_cmp(b).then_with(|| ka.cmp(kb)));
    records.into_iter().map(|(_, record)| record).collect()
}

/// Per-plate photo union: local photos first, then remote ones not already
/// present, capped at [`MAX_IMAGES_PER_PLATE`]. Ordered by plate.
pub fn merge_attachments(local: Vec<ImageSet>, remote: Vec<ImageSet>) -> Vec<ImageSet> {
    let mut merged: BTreeMap<String, ImageSet> = BTreeMap::new();
    for (is_local, set) in local
        .into_iter()
        .map(|s| (true, s))
        .chain(remote.into_iter().map(|s| (false, s)))
    {
        let plate = normalize_plate(&set.plate);
        if plate.is_empty() {
            continue;
        }
        let entry = merged.entry(plate.clone()).or_insert_with(|| ImageSet {
            local_id: None,
            plate,
            images: Vec::new(),
        });
        if is_local && entry.local_id.is_none() {
            entry.local_id = set.local_id;
        }
        for image in set.images {
            if entry.images.len() >= MAX_IMAGES_PER_PLATE {
                break;
            }
            if !image.is_empty() && !entry.images.contains(&image) {
                entry.images.push(image);
            }
        }
    }
    merged.into_values().filter(|set| !set.images.is_empty()).collect()
}

/// Merges two collections of the same family with the family's strategy.
pub fn merge_collections(local: Collection, remote: Collection) -> SyncResult<Collection> {
    Ok(match (local, remote) {
        (Collection::Inventory(l), Collection::Inventory(r)) => {
            Collection::Inventory(merge_latest_wins(l, r))
        }
        (Collection::CashLog(l), Collection::CashLog(r)) => Collection::CashLog(merge_log(l, r)),
        (Collection::EditLog(l), Collection::EditLog(r)) => Collection::EditLog(merge_log(l, r)),
        (Collection::Expenses(l), Collection::Expenses(r)) => {
            Collection::Expenses(merge_keyed(l, r))
        }
        (Collection::Customers(l), Collection::Customers(r)) => {
            Collection::Customers(merge_keyed(l, r))
        }
        (Collection::Parts(l), Collection::Parts(r)) => Collection::Parts(merge_keyed(l, r)),
        (Collection::ServiceLog(l), Collection::ServiceLog(r)) => {
            Collection::ServiceLog(merge_keyed(l, r))
        }
        (Collection::Suppliers(l), Collection::Suppliers(r)) => {
            Collection::Suppliers(merge_keyed(l, r))
        }
        (Collection::Images(l), Collection::Images(r)) => {
            Collection::Images(merge_attachments(l, r))
        }
        _ => {
            return Err(SyncError::Model(ModelError::UnexpectedShape {
                expected: "two collections of the same family",
            }))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bikeledger_model::LedgerKind;
    use proptest::prelude::*;

    fn bike(plate: &str, owner: &str, updated: Option<&str>) -> InventoryItem {
        InventoryItem {
            no: plate.into(),
            owner: owner.into(),
            updated_at: updated.map(str::to_string),
            ..Default::default()
        }
    }

    fn ts(millis: i64) -> String {
        bikeledger_model::time::format_millis(millis)
    }

    #[test]
    fn newer_remote_wins_whole_record() {
        let mut local = bike("AB12", "Ravi", Some("2024-03-01T10:00:00.000Z"));
        local.local_id = Some(7);
        local.selling_price = 500.0;
        let remote = bike("AB12", "X", Some("2024-03-01T11:00:00.000Z"));

        let merged = merge_latest_wins(vec![local], vec![remote.clone()]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].owner, "X");
        assert_eq!(merged[0].selling_price, 0.0);
        assert_eq!(merged[0].local_id, Some(7));
    }

    #[test]
    fn ties_and_missing_stamps_keep_local() {
        let local = bike("AB12", "Ravi", Some("2024-03-01T10:00:00Z"));
        let remote = bike("AB12", "X", Some("2024-03-01T10:00:00.000Z"));
        assert_eq!(merge_latest_wins(vec![local.clone()], vec![remote])[0].owner, "Ravi");

        let undated = bike("AB12", "X", None);
        assert_eq!(merge_latest_wins(vec![local], vec![undated])[0].owner, "Ravi");

        let local = bike("AB12", "Ravi", Some("not a date"));
        let remote = bike("AB12", "X", Some("2020-01-01"));
        assert_eq!(merge_latest_wins(vec![local], vec![remote])[0].owner, "X");
    }

    #[test]
    fn plates_match_case_insensitively_and_blank_plates_drop() {
        let local = bike(" ab12 ", "Ravi", Some("2024-01-01"));
        let remote = bike("AB12", "X", Some("2024-02-01"));
        let merged = merge_latest_wins(vec![local, bike("  ", "nobody", None)], vec![remote]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].owner, "X");
    }

    #[test]
    fn tombstone_survives_older_remote() {
        let mut deleted = bike("AB12", "Ravi", Some("2024-03-02"));
        deleted.deleted = true;
        let remote = bike("AB12", "Ravi", Some("2024-03-01"));
        let merged = merge_latest_wins(vec![deleted], vec![remote]);
        assert!(merged[0].deleted);
    }

    #[test]
    fn logs_union_by_timestamp() {
        let local = vec![
            LedgerEntry::new(ts(2_000), LedgerKind::Increase, 50.0),
            LedgerEntry::new(ts(3_000), LedgerKind::Decrease, -5.0).with_reason("local"),
        ];
        let remote = vec![
            LedgerEntry::new(ts(1_000), LedgerKind::Set, 1000.0),
            LedgerEntry::new(ts(3_000), LedgerKind::Decrease, -5.0).with_reason("remote"),
            LedgerEntry {
                timestamp: None,
                ..LedgerEntry::new("", LedgerKind::Set, 1.0)
            },
        ];
        let merged = merge_log(local, remote);
        let stamps: Vec<_> = merged.iter().map(|e| e.timestamp.clone().unwrap()).collect();
        assert_eq!(stamps, vec![ts(1_000), ts(2_000), ts(3_000)]);
        assert_eq!(merged[2].reason, "local");
    }

    #[test]
    fn keyed_local_overwrites_and_sorts_by_name() {
        let customer = |name: &str, phone: &str| Customer {
            name: name.into(),
            phone: phone.into(),
            ..Default::default()
        };
        let merged = merge_keyed(
            vec![customer("asha", "111"), customer("", "orphan")],
            vec![customer("Asha", "999"), customer("bina", "222"), customer("Arun", "333")],
        );
        let names: Vec<_> = merged.iter().map(|c| (c.name.as_str(), c.phone.as_str())).collect();
        assert_eq!(names, vec![("Arun", "333"), ("asha", "111"), ("bina", "222")]);
    }

    #[test]
    fn expenses_newest_first() {
        let expense = |date: &str, amount: f64| Expense {
            date: date.into(),
            category: "Fuel".into(),
            amount,
            ..Default::default()
        };
        let merged = merge_keyed(
            vec![expense("2024-01-05", 10.0)],
            vec![expense("2024-02-01", 20.0), expense("2023-12-31", 5.0)],
        );
        let dates: Vec<_> = merged.iter().map(|e| e.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-02-01", "2024-01-05", "2023-12-31"]);
    }

    #[test]
    fn attachments_union_capped() {
        let local = vec![ImageSet::new("ab12", vec!["a".into(), "b".into()])];
        let remote = vec![
            ImageSet::new("AB12", vec!["b".into(), "c".into(), "d".into()]),
            ImageSet::new("CD34", vec![]),
        ];
        let merged = merge_attachments(local, remote);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].plate, "AB12");
        assert_eq!(merged[0].images, vec!["a", "b", "c"]);
    }

    #[test]
    fn mismatched_families_are_rejected() {
        let result = merge_collections(
            Collection::empty(bikeledger_model::EntityKind::Parts),
            Collection::empty(bikeledger_model::EntityKind::Customers),
        );
        assert!(result.is_err());
    }

    const PLATES: &[&str] = &["AB12", "CD34", "EF56", "GH78", "JK90"];

    fn side(parity: i64) -> impl Strategy<Value = Vec<InventoryItem>> {
        prop::collection::btree_map(0..PLATES.len(), (0i64..50, any::<bool>(), "[a-z]{1,4}"), 0..5)
            .prop_map(move |picked| {
                picked
                    .into_iter()
                    .map(|(i, (t, deleted, owner))| InventoryItem {
                        no: PLATES[i].to_string(),
                        owner,
                        deleted,
                        updated_at: Some(ts(1_000 * (2 * t + parity))),
                        ..Default::default()
                    })
                    .collect()
            })
    }

    fn any_side() -> impl Strategy<Value = Vec<InventoryItem>> {
        prop::collection::vec(
            (0..PLATES.len(), prop::option::of(0i64..5), any::<bool>(), "[a-z]{1,3}"),
            0..8,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .map(|(i, t, deleted, owner)| InventoryItem {
                    no: PLATES[i].to_string(),
                    owner,
                    deleted,
                    updated_at: t.map(|t| ts(t * 1_000)),
                    ..Default::default()
                })
                .collect()
        })
    }

    fn ledger() -> impl Strategy<Value = Vec<LedgerEntry>> {
        prop::collection::btree_map(
            0i64..1_000,
            (0u8..4, -500i32..500),
            0..12,
        )
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|(t, (kind, amount))| {
                    let kind = match kind {
                        0 => LedgerKind::Set,
                        1 => LedgerKind::Increase,
                        2 => LedgerKind::Decrease,
                        _ => LedgerKind::Sell,
                    };
                    LedgerEntry::new(ts(t * 1_000), kind, f64::from(amount))
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn latest_wins_is_idempotent(local in any_side(), remote in any_side()) {
            let once = merge_latest_wins(local, remote.clone());
            let twice = merge_latest_wins(once.clone(), remote);
            prop_assert_eq!(&twice, &once);
            prop_assert_eq!(merge_latest_wins(once.clone(), once.clone()), once);
        }

        #[test]
        fn strictly_newer_wins_from_either_side(a in side(0), b in side(1)) {
            let ab = merge_latest_wins(a.clone(), b.clone());
            let ba = merge_latest_wins(b, a);
            prop_assert_eq!(ab, ba);
        }

        #[test]
        fn one_sided_records_survive_verbatim(local in side(0), remote in side(1)) {
            let merged = merge_latest_wins(local.clone(), remote.clone());
            for record in local.iter().chain(remote.iter()) {
                let key = record.identity().unwrap();
                let on_local = local.iter().any(|r| r.identity().as_ref() == Some(&key));
                let on_remote = remote.iter().any(|r| r.identity().as_ref() == Some(&key));
                if on_local != on_remote {
                    let found = merged.iter().find(|r| r.identity().as_ref() == Some(&key)).unwrap();
                    prop_assert_eq!(found, record);
                }
            }
        }

        #[test]
        fn tombstones_are_sticky(local in side(0), remote in side(1)) {
            let merged = merge_latest_wins(local.clone(), remote.clone());
            for winner in &merged {
                let key = winner.identity();
                let newest = local
                    .iter()
                    .chain(remote.iter())
                    .filter(|r| r.identity() == key)
                    .max_by_key(|r| stamp(*r))
                    .unwrap();
                prop_assert_eq!(winner.deleted, newest.deleted);
            }
        }

        #[test]
        fn log_merge_is_idempotent(local in ledger(), remote in ledger()) {
            let once = merge_log(local, remote.clone());
            prop_assert_eq!(merge_log(once.clone(), remote), once.clone());
            prop_assert!(once.windows(2).all(|w| log_order(&w[0], &w[1]) != Ordering::Greater));
        }
    }
}

//! Item listing by kind.
//!
//! # Responsibility
//! - Fetch every stored item of the requested kinds through the port.
//! - Rebuild them as live items, grouped by kind.
//!
//! # Invariants
//! - An empty request means every item kind.
//! - An unknown kind name fails the whole request with `UnknownKind`; it is
//!   never reported as an empty result.
//! - Within one kind, items keep the backend's order (ascending id).

use crate::model::item::{ItemKey, ItemKind};
use crate::model::record::Record;
use crate::repo::port::PersistencePort;
use crate::service::knowledge_base::{KbError, KbResult, KnowledgeBase};
use log::{debug, warn};
use std::collections::BTreeMap;

/// Items grouped by kind.
pub type ItemListing = BTreeMap<ItemKind, Vec<ItemKey>>;

/// Lists items of the named kinds (`"definition"`, `"theorem"`, ...).
///
/// # Errors
/// - `UnknownKind` for any name that is not an item kind.
pub fn list_all_items<P: PersistencePort>(
    kb: &mut KnowledgeBase<P>,
    kind_names: &[&str],
) -> KbResult<ItemListing> {
    let mut kinds = Vec::with_capacity(kind_names.len());
    for name in kind_names {
        match ItemKind::parse(name) {
            Some(kind) => kinds.push(kind),
            None => {
                warn!("event=item_list module=search status=error error_code=unknown_kind");
                return Err(KbError::UnknownKind((*name).to_string()));
            }
        }
    }
    list_items(kb, &kinds)
}

/// Lists items of the given kinds; an empty slice lists every kind.
pub fn list_items<P: PersistencePort>(
    kb: &mut KnowledgeBase<P>,
    kinds: &[ItemKind],
) -> KbResult<ItemListing> {
    let requested: &[ItemKind] = if kinds.is_empty() {
        &ItemKind::ALL
    } else {
        kinds
    };

    let mut listing = ItemListing::new();
    for kind in requested {
        if listing.contains_key(kind) {
            continue;
        }
        let records = kb.port().list_all(kind.record_kind())?;
        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            match record {
                Record::Item(record) => keys.push(kb.item_from_record(record)?),
                Record::Note(_) => {
                    return Err(KbError::InvalidData(format!(
                        "note record listed in {kind} collection"
                    )))
                }
            }
        }
        debug!(
            "event=item_list module=search status=ok kind={kind} count={}",
            keys.len()
        );
        listing.insert(*kind, keys);
    }
    Ok(listing)
}

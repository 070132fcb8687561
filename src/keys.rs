// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Key namespace shared by every component.
//!
//! ```text
//! login:              hash   token → user
//! recent:             zset   token → last activity (unix secs)
//! viewed:{token}      zset   item  → view time, last 25 kept
//! viewed:             zset   item  → popularity (decremented per view)
//! cart:{token}        hash   item  → quantity
//! market:             zset   "{item}.{seller}" → price (minor units)
//! inventory:{user}    set    item ids
//! users:{user}        hash   funds → minor units
//! delay:              zset   row → refresh interval (secs)
//! schedule:           zset   row → next due (unix secs)
//! inv:{row}           string cached row snapshot
//! cache:{hash}        string cached response (expires)
//! ```

pub const LOGIN: &str = "login:";
pub const RECENT: &str = "recent:";
pub const POPULARITY: &str = "viewed:";
pub const MARKET: &str = "market:";
pub const ROW_DELAY: &str = "delay:";
pub const ROW_SCHEDULE: &str = "schedule:";

/// Hash field holding a user's balance.
pub const FUNDS_FIELD: &str = "funds";

pub fn recent_views(token: &str) -> String {
    format!("viewed:{}", token)
}

pub fn cart(session: &str) -> String {
    format!("cart:{}", session)
}

pub fn inventory(user: &str) -> String {
    format!("inventory:{}", user)
}

pub fn user(user: &str) -> String {
    format!("users:{}", user)
}

pub fn row_snapshot(row_id: &str) -> String {
    format!("inv:{}", row_id)
}

pub fn cached_response(hash: &str) -> String {
    format!("cache:{}", hash)
}

/// Separator between item and seller in a market member.
pub const LISTING_SEPARATOR: char = '.';

/// Market member for an item offered by a seller.
///
/// `None` when either id is empty or contains [`LISTING_SEPARATOR`]: such a
/// member could not be told apart from another item/seller split.
pub fn listing(item_id: &str, seller_id: &str) -> Option<String> {
    let usable = |id: &str| !id.is_empty() && !id.contains(LISTING_SEPARATOR);
    if usable(item_id) && usable(seller_id) {
        Some(format!("{}{}{}", item_id, LISTING_SEPARATOR, seller_id))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_entity_keys() {
        assert_eq!(recent_views("t1"), "viewed:t1");
        assert_eq!(cart("t1"), "cart:t1");
        assert_eq!(inventory("alice"), "inventory:alice");
        assert_eq!(user("alice"), "users:alice");
        assert_eq!(row_snapshot("42"), "inv:42");
        assert_eq!(listing("itemX", "userX").as_deref(), Some("itemX.userX"));
    }

    #[test]
    fn test_listing_rejects_ambiguous_ids() {
        assert_eq!(listing("a.b", "c"), None);
        assert_eq!(listing("a", "b.c"), None);
        assert_eq!(listing("", "c"), None);
        assert_eq!(listing("a", ""), None);
    }
}

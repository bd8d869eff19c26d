//! Item layout in the shared table.
//!
//! All domain items live in one table keyed by `pk` (partition) and `sk`
//! (sort). A user's partition holds the account record and the user's
//! prompts; each API key has its own partition for its credit balance.

use item_store::{ItemKey, KeySchema};

/// The key schema domain items are stored under.
pub fn table_schema() -> KeySchema {
    KeySchema::new("pk").with_sort_key("sk")
}

pub fn user_partition(user_id: &str) -> String {
    format!("user#{user_id}")
}

pub fn prompt_key(user_id: &str, prompt_id: &str) -> ItemKey {
    ItemKey::with_sort(user_partition(user_id), format!("prompt#{prompt_id}"))
}

/// Marker recording that a prompt's credit has been taken.
pub fn charge_key(user_id: &str, prompt_id: &str) -> ItemKey {
    ItemKey::with_sort(user_partition(user_id), format!("charge#{prompt_id}"))
}

pub fn account_key(user_id: &str) -> ItemKey {
    ItemKey::with_sort(user_partition(user_id), "account")
}

pub fn credits_key(key_id: &str) -> ItemKey {
    ItemKey::with_sort(format!("key#{key_id}"), "credits")
}

/// Sort-key prefix shared by all of a user's prompts.
pub const PROMPT_PREFIX: &str = "prompt#";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_and_account_share_partition() {
        assert_eq!(
            prompt_key("u1", "p1").partition,
            account_key("u1").partition
        );
        assert_eq!(prompt_key("u1", "p1").to_string(), "user#u1/prompt#p1");
        assert!(table_schema().check(&credits_key("k1")).is_ok());
    }
}

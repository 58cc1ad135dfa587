//! Application constants

use crate::models::CatalogLanguage;

/// Well-known name of the single process-wide quota gate instance
pub const QUOTA_GATE_GLOBAL: &str = "global";

/// Default daily write budget shared by every mutating endpoint
pub const DEFAULT_DAILY_WRITE_LIMIT: i64 = 300;

/// Default daily create/join budget per caller IP
pub const DEFAULT_JOIN_CREATE_LIMIT_PER_ACTOR: i64 = 40;

/// PBKDF2 iteration count for passphrase hashing
pub const PASSPHRASE_ITERATIONS: u32 = 120_000;

/// Salt length for passphrase hashing
pub const PASSPHRASE_SALT_BYTES: usize = 16;

/// Raw byte length of group invite tokens (base64url-encoded on the wire)
pub const INVITE_TOKEN_BYTES: usize = 24;

/// Maximum inbox events returned per fetch
pub const INBOX_PAGE_SIZE: i64 = 100;

/// Localized display name for a system tab. Custom tabs keep their stored name.
pub fn localize_system_tab_name(id: &str, fallback: &str, language: CatalogLanguage) -> String {
    let label = match id {
        "sys-tab-detergent" => ("洗剤", "Detergent"),
        "sys-tab-washroom" => ("洗面", "Washroom"),
        "sys-tab-beauty" => ("美容", "Beauty"),
        "sys-tab-kitchen" => ("キッチン", "Kitchen"),
        "sys-tab-store" => ("買い物メモ", "Shopping Notes"),
        _ => return fallback.to_string(),
    };
    pick(label, language)
}

/// Localized display name for a system item.
pub fn localize_system_item_name(id: &str, fallback: &str, language: CatalogLanguage) -> String {
    let label = match id {
        "sys-item-detergent" => ("洗剤", "Detergent"),
        "sys-item-refill" => ("詰替え", "Refill"),
        "sys-item-tissue" => ("ティッシュ", "Tissue"),
        "sys-item-toilet-paper" => ("トイレットペーパー", "Toilet Paper"),
        "sys-item-hand-paper" => ("ハンドペーパー", "Hand Paper"),
        "sys-item-cotton" => ("コットン", "Cotton"),
        "sys-item-shampoo" => ("シャンプー", "Shampoo"),
        "sys-item-conditioner" => ("リンス", "Conditioner"),
        "sys-item-kitchen-paper" => ("キッチンペーパー", "Kitchen Paper"),
        "sys-item-carrot" => ("にんじん", "Carrot"),
        _ => return fallback.to_string(),
    };
    pick(label, language)
}

/// Localized display name for a system store.
pub fn localize_system_store_name(id: &str, fallback: &str, language: CatalogLanguage) -> String {
    let label = match id {
        "sys-store-summit" => ("サミット", "Summit"),
        "sys-store-nitori" => ("ニトリ", "Nitori"),
        "sys-store-ikea" => ("IKEA", "IKEA"),
        "sys-store-aeon" => ("イオン", "AEON"),
        "sys-store-gyomu" => ("業務スーパー", "Wholesale Market"),
        _ => return fallback.to_string(),
    };
    pick(label, language)
}

fn pick(label: (&str, &str), language: CatalogLanguage) -> String {
    match language {
        CatalogLanguage::Ja => label.0.to_string(),
        CatalogLanguage::En => label.1.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_names_localize_per_language() {
        assert_eq!(
            localize_system_tab_name("sys-tab-kitchen", "キッチン", CatalogLanguage::En),
            "Kitchen"
        );
        assert_eq!(
            localize_system_item_name("sys-item-tissue", "ティッシュ", CatalogLanguage::Ja),
            "ティッシュ"
        );
        assert_eq!(
            localize_system_store_name("sys-store-aeon", "イオン", CatalogLanguage::En),
            "AEON"
        );
    }

    #[test]
    fn custom_rows_keep_their_stored_name() {
        assert_eq!(
            localize_system_tab_name("a1b2c3", "Weekend Errands", CatalogLanguage::Ja),
            "Weekend Errands"
        );
    }
}

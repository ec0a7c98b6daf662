use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Shipping address value object. The original spelling is what gets
/// stored on the order; only the rate-lookup key is normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    /// State / district; optional for single-city deliveries.
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub zip_code: String,
}

impl ShippingAddress {
    /// Checks the fields an order cannot be placed without. The state /
    /// district is not required.
    pub fn ensure_complete(&self) -> Result<(), ServiceError> {
        for (value, field) in [
            (&self.street, "street"),
            (&self.city, "city"),
            (&self.country, "country"),
            (&self.zip_code, "zip_code"),
        ] {
            if value.trim().is_empty() {
                return Err(ServiceError::IncompleteAddress(field));
            }
        }
        Ok(())
    }

    /// Canonical key for the delivery-rate lookup. Case, spacing, and
    /// diacritics must not produce distinct keys for the same locality.
    pub fn rate_key(&self) -> RateKey {
        RateKey {
            city: normalize_locality(&self.city),
            state: normalize_locality(&self.state),
            country: normalize_locality(&self.country),
        }
    }
}

/// Normalized locality key used against the delivery-rate source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateKey {
    pub city: String,
    pub state: String,
    pub country: String,
}

/// Canonicalizes a free-text locality name: trims, lowercases, collapses
/// internal whitespace, and folds Vietnamese diacritics so that
/// "Hà Nội", "ha  noi" and "HA NOI" all map to "ha noi".
pub fn normalize_locality(raw: &str) -> String {
    let folded: String = raw.chars().map(fold_diacritic).collect();
    folded
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Maps a precomposed Vietnamese character onto its ASCII base letter.
/// Characters outside the Vietnamese alphabet pass through unchanged.
fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'ả' | 'ã' | 'ạ' | 'ă' | 'ằ' | 'ắ' | 'ẳ' | 'ẵ' | 'ặ' | 'â' | 'ầ' | 'ấ' | 'ẩ'
        | 'ẫ' | 'ậ' => 'a',
        'À' | 'Á' | 'Ả' | 'Ã' | 'Ạ' | 'Ă' | 'Ằ' | 'Ắ' | 'Ẳ' | 'Ẵ' | 'Ặ' | 'Â' | 'Ầ' | 'Ấ' | 'Ẩ'
        | 'Ẫ' | 'Ậ' => 'A',
        'è' | 'é' | 'ẻ' | 'ẽ' | 'ẹ' | 'ê' | 'ề' | 'ế' | 'ể' | 'ễ' | 'ệ' => 'e',
        'È' | 'É' | 'Ẻ' | 'Ẽ' | 'Ẹ' | 'Ê' | 'Ề' | 'Ế' | 'Ể' | 'Ễ' | 'Ệ' => 'E',
        'ì' | 'í' | 'ỉ' | 'ĩ' | 'ị' => 'i',
        'Ì' | 'Í' | 'Ỉ' | 'Ĩ' | 'Ị' => 'I',
        'ò' | 'ó' | 'ỏ' | 'õ' | 'ọ' | 'ô' | 'ồ' | 'ố' | 'ổ' | 'ỗ' | 'ộ' | 'ơ' | 'ờ' | 'ớ' | 'ở'
        | 'ỡ' | 'ợ' => 'o',
        'Ò' | 'Ó' | 'Ỏ' | 'Õ' | 'Ọ' | 'Ô' | 'Ồ' | 'Ố' | 'Ổ' | 'Ỗ' | 'Ộ' | 'Ơ' | 'Ờ' | 'Ớ' | 'Ở'
        | 'Ỡ' | 'Ợ' => 'O',
        'ù' | 'ú' | 'ủ' | 'ũ' | 'ụ' | 'ư' | 'ừ' | 'ứ' | 'ử' | 'ữ' | 'ự' => 'u',
        'Ù' | 'Ú' | 'Ủ' | 'Ũ' | 'Ụ' | 'Ư' | 'Ừ' | 'Ứ' | 'Ử' | 'Ữ' | 'Ự' => 'U',
        'ỳ' | 'ý' | 'ỷ' | 'ỹ' | 'ỵ' => 'y',
        'Ỳ' | 'Ý' | 'Ỷ' | 'Ỹ' | 'Ỵ' => 'Y',
        'đ' => 'd',
        'Đ' => 'D',
        _ => c,
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw numeric identifier.
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw numeric identifier.
            pub const fn get(&self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

numeric_id!(
    /// Catalog product identifier.
    ///
    /// Ordered so that lock acquisition can follow ascending product id.
    ProductId
);

numeric_id!(
    /// Identifier of the user owning a cart or an order.
    UserId
);

numeric_id!(
    /// Order identifier, assigned monotonically at commit time.
    OrderId
);

/// Client-supplied idempotency key for a checkout request.
///
/// Replaying a request with the same token returns the order created by
/// the first successful attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestToken(Uuid);

impl RequestToken {
    /// Creates a new random request token.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a request token from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestToken {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_token_new_creates_unique_tokens() {
        let t1 = RequestToken::new();
        let t2 = RequestToken::new();
        assert_ne!(t1, t2);
    }

    #[test]
    fn request_token_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let token = RequestToken::from_uuid(uuid);
        assert_eq!(token.as_uuid(), uuid);
    }

    #[test]
    fn product_ids_order_numerically() {
        let mut ids = vec![ProductId::new(10), ProductId::new(2), ProductId::new(7)];
        ids.sort();
        assert_eq!(ids, vec![ProductId::new(2), ProductId::new(7), ProductId::new(10)]);
    }

    #[test]
    fn numeric_ids_serialize_transparently() {
        let json = serde_json::to_string(&OrderId::new(42)).unwrap();
        assert_eq!(json, "42");
        let parsed: UserId = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, UserId::new(7));
    }

    #[test]
    fn numeric_ids_parse_from_path_segments() {
        let id: ProductId = "15".parse().unwrap();
        assert_eq!(id.get(), 15);
        assert!("abc".parse::<ProductId>().is_err());
    }
}

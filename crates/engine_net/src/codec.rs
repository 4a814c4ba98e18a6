//! MessagePack codec helpers.
//!
//! Thin wrappers around `rmp-serde` for encoding and decoding action batches.
//! Component state does not go through here; it uses the change-masked
//! packet format of [`crate::writer`].

use serde::{Deserialize, Serialize};

use crate::actions::NetworkWorldAction;
use crate::error::NetError;

/// Encode a value to MessagePack bytes.
///
/// # Errors
///
/// Returns [`NetError::Encode`] if serialisation fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, NetError> {
    rmp_serde::to_vec(value).map_err(NetError::Encode)
}

/// Decode a value from MessagePack bytes.
///
/// # Errors
///
/// Returns [`NetError::Decode`] if deserialisation fails.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, NetError> {
    rmp_serde::from_slice(bytes).map_err(NetError::Decode)
}

/// Encode a batch of actions for one transport send.
///
/// # Errors
///
/// Returns [`NetError::Encode`] if serialisation fails.
pub fn encode_actions(actions: &[NetworkWorldAction]) -> Result<Vec<u8>, NetError> {
    encode(&actions)
}

/// Decode a batch produced by [`encode_actions`].
///
/// # Errors
///
/// Returns [`NetError::Decode`] if the bytes are not an action batch.
pub fn decode_actions(bytes: &[u8]) -> Result<Vec<NetworkWorldAction>, NetError> {
    decode(bytes)
}

#[cfg(test)]
mod tests {
    use engine_math::{Transform3D, Vec3};

    use super::*;
    use crate::network::{NetworkId, NetworkObject, UserId};

    #[test]
    fn test_action_batch_roundtrip() {
        let owner = UserId::from("host");
        let batch = vec![
            NetworkWorldAction::CreateClient {
                user_id: UserId::from("guest"),
                user_index: 1,
                name: "Guest".to_string(),
            },
            NetworkWorldAction::SpawnObject {
                object: NetworkObject::new(owner.clone(), NetworkId(7), "crate")
                    .with_parameters(serde_json::json!({ "color": "red" })),
                transform: Transform3D::from_position(Vec3::new(1.0, 0.0, -2.0)),
            },
            NetworkWorldAction::TransferAuthority {
                owner_id: owner,
                network_id: NetworkId(7),
                new_authority: UserId::from("guest"),
            },
            NetworkWorldAction::TimeSync { fixed_tick: 7200 },
        ];
        let bytes = encode_actions(&batch).unwrap();
        assert_eq!(decode_actions(&bytes).unwrap(), batch);
    }

    #[test]
    fn test_decode_invalid_bytes() {
        assert!(matches!(decode_actions(&[0xC1]), Err(NetError::Decode(_))));
    }
}

//! Encoding a discovery response to bytes and back.
//!
//! The managed transport frames and ships these payloads; this module only
//! fixes the payload encoding so both ends agree on it.

use bytes::Bytes;

use crate::error::ProtoError;
use crate::types::DiscoveryResponse;

/// Encodes a response into a contiguous byte payload.
pub fn encode(response: &DiscoveryResponse) -> Result<Bytes, ProtoError> {
    let buf = serde_json::to_vec(response).map_err(ProtoError::Encode)?;
    Ok(Bytes::from(buf))
}

/// Decodes a byte payload back into a response.
pub fn decode(payload: &[u8]) -> Result<DiscoveryResponse, ProtoError> {
    serde_json::from_slice(payload).map_err(ProtoError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ClusterAssignment, LbEndpoint, Locality, LocalityLbEndpoints, ENDPOINT_TYPE_URL,
    };

    fn sample_response() -> DiscoveryResponse {
        DiscoveryResponse {
            type_url: ENDPOINT_TYPE_URL.into(),
            version_info: "7".into(),
            nonce: "a1b2c3".into(),
            resources: vec![ClusterAssignment {
                cluster_name: "outbound|80|v2|reviews.default".into(),
                endpoints: vec![LocalityLbEndpoints {
                    locality: Locality::zone("us-east-1a"),
                    load_balancing_weight: 128,
                    endpoints: vec![LbEndpoint::socket("10.1.2.3", 8080)
                        .with_istio_metadata(Some("kubernetes://reviews-v2".into()), None)],
                }],
            }],
        }
    }

    #[test]
    fn round_trip() {
        let response = sample_response();
        let payload = encode(&response).unwrap();
        let decoded = decode(&payload).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn absent_metadata_fields_stay_off_the_wire() {
        let response = sample_response();
        let payload = encode(&response).unwrap();
        let text = std::str::from_utf8(&payload).unwrap();
        // uid is set, network is not; only uid may appear
        assert!(text.contains("\"uid\""));
        assert!(!text.contains("\"network\""));
    }

    #[test]
    fn garbage_payload_is_rejected() {
        let err = decode(b"{not json").unwrap_err();
        assert!(matches!(err, ProtoError::Malformed(_)));
    }

    #[test]
    fn empty_resource_list_round_trips() {
        let response = DiscoveryResponse {
            type_url: ENDPOINT_TYPE_URL.into(),
            version_info: "1".into(),
            nonce: "n".into(),
            resources: Vec::new(),
        };
        let decoded = decode(&encode(&response).unwrap()).unwrap();
        assert!(decoded.resources.is_empty());
    }
}

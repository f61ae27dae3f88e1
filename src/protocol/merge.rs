//! CONNECT header composition.
//!
//! The connection owns a list of default headers (at least the protocol
//! version). A connect amender may propose more. Defaults always win: a
//! proposed header whose name matches a default is rejected, everything else
//! is appended after the defaults in proposal order.
//!
//! ```
//! use eventstream_rpc::protocol::{merge_headers, Header};
//!
//! let defaults = [Header::new(":version", "0.1.0")];
//! let proposed = vec![Header::new(":VERSION", "evil"), Header::new("client-name", "a")];
//!
//! let merged = merge_headers(&defaults, proposed).unwrap();
//! assert_eq!(merged.outgoing.len(), 2);
//! assert_eq!(merged.outgoing[0].as_str(), Some("0.1.0"));
//! assert_eq!(merged.leftover.len(), 1);
//! ```

use bytes::Bytes;

use super::amendment::MessageAmendment;
use super::header::Header;
use crate::error::{Result, RpcError};

/// Result of merging proposed headers into defaults.
#[derive(Debug, Clone, Default)]
pub struct HeaderMerge {
    /// Defaults followed by accepted proposals.
    pub outgoing: Vec<Header>,
    /// Proposals rejected because a default already has the name.
    pub leftover: Vec<Header>,
}

/// Merge `proposed` into `defaults` without mutating either.
///
/// Proposals are checked against the defaults only, not against each other.
pub fn merge_headers(defaults: &[Header], proposed: Vec<Header>) -> Result<HeaderMerge> {
    let mut outgoing = Vec::new();
    outgoing
        .try_reserve_exact(defaults.len() + proposed.len())
        .map_err(|_| RpcError::AllocationFailed)?;
    outgoing.extend_from_slice(defaults);

    let mut leftover = Vec::new();
    for header in proposed {
        if defaults.contains(&header) {
            leftover.push(header);
        } else {
            outgoing.push(header);
        }
    }

    Ok(HeaderMerge { outgoing, leftover })
}

/// A composed CONNECT message.
#[derive(Debug, Clone, Default)]
pub struct ConnectMessage {
    /// What goes on the wire.
    pub amendment: MessageAmendment,
    /// Proposed headers that lost to a default.
    pub leftover: Vec<Header>,
}

/// Compose the CONNECT message from the connection defaults and an optional
/// amender result.
///
/// The amender's payload, when present, replaces the default payload.
pub fn compose_connect(
    defaults: &[Header],
    default_payload: Option<Bytes>,
    amendment: Option<MessageAmendment>,
) -> Result<ConnectMessage> {
    let Some(amendment) = amendment else {
        let merged = merge_headers(defaults, Vec::new())?;
        return Ok(ConnectMessage {
            amendment: MessageAmendment::from_parts(merged.outgoing, default_payload),
            leftover: Vec::new(),
        });
    };

    let (proposed, payload) = amendment.into_parts();
    let merged = merge_headers(defaults, proposed)?;
    let payload = payload.or(default_payload);

    Ok(ConnectMessage {
        amendment: MessageAmendment::from_parts(merged.outgoing, payload),
        leftover: merged.leftover,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PROTOCOL_VERSION, VERSION_HEADER};

    fn defaults() -> Vec<Header> {
        vec![Header::new(VERSION_HEADER, PROTOCOL_VERSION)]
    }

    #[test]
    fn test_defaults_win_over_duplicates() {
        let proposed = vec![
            Header::new(VERSION_HEADER, "evil"),
            Header::new("client-name", "a"),
        ];

        let merged = merge_headers(&defaults(), proposed).unwrap();

        let versions: Vec<&Header> = merged
            .outgoing
            .iter()
            .filter(|h| h.is_named(VERSION_HEADER))
            .collect();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].as_str(), Some(PROTOCOL_VERSION));

        let client = merged.outgoing.iter().find(|h| h.is_named("client-name"));
        assert_eq!(client.and_then(Header::as_str), Some("a"));

        // The amender keeps only what it could not contribute.
        assert!(!merged.leftover.iter().any(|h| h.is_named("client-name")));
        assert_eq!(merged.leftover.len(), 1);
        assert_eq!(merged.leftover[0].as_str(), Some("evil"));
    }

    #[test]
    fn test_duplicate_detection_ignores_case() {
        let proposed = vec![Header::new(":VeRsIoN", "evil")];
        let merged = merge_headers(&defaults(), proposed).unwrap();
        assert_eq!(merged.outgoing.len(), 1);
        assert_eq!(merged.leftover.len(), 1);
    }

    #[test]
    fn test_proposal_order_preserved() {
        let proposed = vec![
            Header::new("z", "1"),
            Header::new("a", "2"),
            Header::new("m", "3"),
        ];
        let merged = merge_headers(&defaults(), proposed).unwrap();
        let names: Vec<&str> = merged.outgoing.iter().map(Header::name).collect();
        assert_eq!(names, [VERSION_HEADER, "z", "a", "m"]);
    }

    #[test]
    fn test_proposals_not_deduplicated_against_each_other() {
        let proposed = vec![Header::new("tag", "1"), Header::new("TAG", "2")];
        let merged = merge_headers(&defaults(), proposed).unwrap();
        assert_eq!(merged.outgoing.len(), 3);
        assert!(merged.leftover.is_empty());
    }

    #[test]
    fn test_inputs_untouched() {
        let defaults = defaults();
        let proposed = vec![Header::new(VERSION_HEADER, "evil")];
        let _ = merge_headers(&defaults, proposed).unwrap();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].as_str(), Some(PROTOCOL_VERSION));
    }

    #[test]
    fn test_compose_without_amender() {
        let message = compose_connect(&defaults(), None, None).unwrap();
        assert_eq!(message.amendment.headers().len(), 1);
        assert!(message.amendment.payload().is_none());
        assert!(message.leftover.is_empty());
    }

    #[test]
    fn test_compose_amender_payload_replaces_default() {
        let amendment = MessageAmendment::from_payload(Bytes::from_static(b"amended"));
        let message = compose_connect(
            &defaults(),
            Some(Bytes::from_static(b"default")),
            Some(amendment),
        )
        .unwrap();
        assert_eq!(
            message.amendment.payload(),
            Some(&Bytes::from_static(b"amended"))
        );
    }

    #[test]
    fn test_compose_keeps_default_payload_when_amender_has_none() {
        let amendment = MessageAmendment::new().header(Header::new("client-name", "a"));
        let message = compose_connect(
            &defaults(),
            Some(Bytes::from_static(b"default")),
            Some(amendment),
        )
        .unwrap();
        assert_eq!(
            message.amendment.payload(),
            Some(&Bytes::from_static(b"default"))
        );
        assert_eq!(message.amendment.headers().len(), 2);
    }
}

// SPDX-License-Identifier: Apache-2.0
//! Shared validators for the integration-key patterns, used by the
//! plugin chain, dispatcher, and ingress adapter alike.

use std::sync::OnceLock;

use regex::Regex;

/// Is `key` a valid classic (`^[0-9a-f]{32}$`, case-insensitive) or
/// routing-engine (`^R[0-9A-Z]{31}$`, case-insensitive) integration key?
pub fn is_integration_key(key: &str) -> bool {
    classic_key_re().is_match(key) || routing_key_re().is_match(key)
}

fn classic_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| {
        regex::RegexBuilder::new(r"^[0-9a-f]{32}$")
            .case_insensitive(true)
            .build()
            .unwrap()
    })
}

fn routing_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| {
        regex::RegexBuilder::new(r"^R[0-9A-Z]{31}$")
            .case_insensitive(true)
            .build()
            .unwrap()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_key_accepts_32_hex() {
        assert!(is_integration_key("0123456789abcdef0123456789ABCDEF"));
    }

    #[test]
    fn routing_key_accepts_r_prefixed() {
        assert!(is_integration_key("R0123456789ABCDEF0123456789ABCDE"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(!is_integration_key("not-a-key"));
        assert!(!is_integration_key(""));
    }
}

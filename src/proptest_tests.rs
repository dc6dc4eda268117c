//! Property-based tests for the reversed-key codec.

use proptest::prelude::*;

use crate::key_encoder::{
    reverse_host, reverse_url, reverse_url_str, reversed_host, unreverse_url, Locator,
};

fn arb_host() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-zA-Z0-9-]{1,12}", 1..6).prop_map(|labels| labels.join("."))
}

fn arb_locator() -> impl Strategy<Value = Locator> {
    (
        prop_oneof![
            Just("http".to_string()),
            Just("https".to_string()),
            Just("ftp".to_string()),
            "[a-z][a-z0-9+.-]{0,8}",
        ],
        arb_host(),
        prop::option::of(any::<u16>()),
        // paths may carry ':' and may lack the leading '/'
        "(/?[a-zA-Z0-9._~:@!$&'()*+,;=%-]{0,20}(\\?[a-zA-Z0-9=&:/]{0,12})?)?",
    )
        .prop_map(|(scheme, host, port, path)| {
            Locator::new(scheme, host, port, path).expect("generated locator is valid")
        })
}

proptest! {
    #[test]
    fn decode_inverts_encode(locator in arb_locator()) {
        let key = reverse_url(&locator);
        prop_assert_eq!(unreverse_url(&key).unwrap(), locator.to_string());
    }

    #[test]
    fn reversed_host_is_first_key_field(locator in arb_locator()) {
        let key = reverse_url(&locator);
        prop_assert_eq!(reversed_host(&key).unwrap(), reverse_host(locator.host()));
    }

    #[test]
    fn host_reversal_is_self_inverse(host in arb_host()) {
        prop_assert_eq!(reverse_host(&reverse_host(&host)), host);
    }

    #[test]
    fn absent_port_is_never_emitted(
        host in arb_host(),
        path in "(/[a-z0-9]{0,10})?",
    ) {
        let locator = Locator::new("http", host.clone(), None, path).unwrap();
        let key = reverse_url(&locator);
        let header = key.split('/').next().unwrap();

        prop_assert_eq!(header.split(':').count(), 2);
        let host_with_port = format!("//{}:", host);
        prop_assert!(!unreverse_url(&key).unwrap().contains(&host_with_port));
    }

    #[test]
    fn same_host_keys_share_prefix(
        host in arb_host(),
        first in "/[a-z0-9]{0,10}",
        second in "/[a-z0-9]{0,10}",
    ) {
        let a = reverse_url(&Locator::new("https", host.clone(), Some(443), first).unwrap());
        let b = reverse_url(&Locator::new("https", host.clone(), Some(443), second).unwrap());
        let prefix = format!("{}:https:443", reverse_host(&host));

        prop_assert!(a.starts_with(&prefix));
        prop_assert!(b.starts_with(&prefix));
    }

    #[test]
    fn structured_decode_matches_locator(locator in arb_locator()) {
        let key = reverse_url(&locator);
        let decoded = crate::ReversedKey::parse(&key).unwrap().to_locator().unwrap();

        prop_assert_eq!(decoded.to_string(), locator.to_string());
        prop_assert_eq!(decoded.port(), locator.port());
    }

    #[test]
    fn parsed_url_text_round_trips(
        host in "[a-zA-Z]{1,8}(\\.[a-zA-Z]{1,8}){0,3}",
        port in prop::option::of(1u16..),
        path in "(/[a-zA-Z0-9._~-]{0,12}){0,3}",
    ) {
        let url = match port {
            Some(port) => format!("http://{}:{}{}", host, port, path),
            None => format!("http://{}{}", host, path),
        };
        let key = reverse_url_str(&url).unwrap();

        prop_assert!(key.starts_with(&reverse_host(&host)));
        prop_assert_eq!(unreverse_url(&key).unwrap(), url);
    }
}

//! Property-based checks of the universal registry invariants.

mod common;

use proptest::prelude::*;
use regatta_registry::{paths, Error, Limits, ProcAttrs, TrafficControl};
use tokio_test::block_on;

/// Names over the general grammar.
fn arb_name() -> impl Strategy<Value = String> {
    "[0-9A-Za-z.-]{1,24}"
}

/// Strings guaranteed to violate the general grammar.
fn arb_bad_name() -> impl Strategy<Value = String> {
    "[0-9A-Za-z]{0,8}[_/ @][0-9A-Za-z]{0,8}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn registered_apps_are_found_and_unregistered_apps_are_not(name in arb_name()) {
        block_on(async {
            let s = common::setup("/prop-test").await;
            let app = s.new_app(&name, "git://prop", "stack").unwrap();
            app.register().await.unwrap();

            let s = s.fast_forward().await.unwrap();
            let have = s.get_app(&name).await.unwrap();
            assert_eq!(have.name, name);

            have.unregister().await.unwrap();
            let s = s.fast_forward().await.unwrap();
            assert!(matches!(s.get_app(&name).await, Err(Error::AppNotFound(_))));
        });
    }

    #[test]
    fn invalid_names_never_reach_the_store(name in arb_bad_name()) {
        block_on(async {
            let s = common::setup("/prop-test").await;
            let before = s.fast_forward().await.unwrap().get_snapshot().rev;

            assert!(s.new_app(&name, "git://prop", "stack").is_err());
            assert!(s
                .register_instance(&name, "stable", "web", "default")
                .await
                .is_err());

            let after = s.fast_forward().await.unwrap().get_snapshot().rev;
            assert_eq!(before, after);
        });
    }

    #[test]
    fn separators_in_proc_names_are_rejected(
        head in "[0-9A-Za-z]{1,8}",
        sep in prop::sample::select(vec!['-', '_', '.']),
        tail in "[0-9A-Za-z]{1,8}",
    ) {
        let name = format!("{head}{sep}{tail}");
        assert!(matches!(
            paths::check_proc_name(&name),
            Err(Error::BadProcName(_) | Error::InvalidName(_))
        ));
    }

    #[test]
    fn share_validates_exactly_within_bounds(share in -200i64..300) {
        let tc = TrafficControl { share };
        match tc.validate() {
            Ok(()) => assert!((0..=100).contains(&share)),
            Err(Error::InvalidShare(s)) => {
                assert_eq!(s, share);
                assert!(!(0..=100).contains(&share));
            }
            Err(e) => panic!("unexpected error {e:?}"),
        }
    }

    #[test]
    fn endpoint_ids_encode_ipv4_deterministically(
        a in 0u8..=255, b in 0u8..=255, c in 0u8..=255, d in 0u8..=255,
        port in 1u16..=65535,
    ) {
        let ip = std::net::IpAddr::from([a, b, c, d]);
        let id = paths::endpoint_id(&ip, port);
        assert_eq!(id, format!("{a}-{b}-{c}-{d}-{port}"));
        // URL-safe by construction: the grammar charset only.
        assert!(id.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-'));
    }

    #[test]
    fn proc_attrs_roundtrip_through_their_wire_form(
        memory in prop::option::of(1i64..=1 << 20),
        log_persistence in any::<bool>(),
        share in prop::option::of(0i64..=100),
    ) {
        let attrs = ProcAttrs {
            limits: Limits { memory_limit_mb: memory },
            log_persistence,
            traffic_control: share.map(|share| TrafficControl { share }),
        };
        let body = serde_json::to_string(&attrs).unwrap();
        let back: ProcAttrs = serde_json::from_str(&body).unwrap();
        assert_eq!(back, attrs);
    }
}

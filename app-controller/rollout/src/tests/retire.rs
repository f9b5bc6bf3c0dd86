use super::*;
use pretty_assertions::assert_eq;
use rstest::rstest;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn removes_routes_before_deleting_deployment() {
    let test = TestConfig::default().with_app("bookinfo", "reviews", &["v1", "v2"]);
    test.store().insert(mk_virtual_service(
        "bookinfo",
        "reviews",
        &["reviews"],
        &[
            &[("reviews", "v1", Some(80)), ("reviews", "v2", Some(20))],
            &[("reviews", "v2", None)],
        ],
    ));
    test.store().insert(mk_virtual_service(
        "bookinfo",
        "ratings",
        &["ratings"],
        &[&[("ratings", "v2", None)]],
    ));
    test.store().clear_calls();

    let start = Instant::now();
    let report = test
        .controller
        .retire_version("bookinfo", "reviews", "v2", MatchScope::Host)
        .await
        .unwrap();
    assert!(report.is_clean());
    assert!(start.elapsed() >= Duration::from_secs(3), "waits out the grace period");

    assert_eq!(
        test.store().writes(),
        vec![
            Call::new(Op::Update, "VirtualService", "bookinfo", "reviews"),
            Call::new(Op::Update, "DestinationRule", "bookinfo", "reviews"),
            Call::new(Op::Delete, "Deployment", "bookinfo", "reviews-v2"),
        ]
    );

    let vs = test
        .store()
        .peek::<VirtualService>("bookinfo", "reviews")
        .unwrap();
    assert!(!route::references(&vs, "v2"));
    assert_eq!(
        route_table(&vs),
        vec![vec![("reviews".to_string(), "v1".to_string(), Some(100))]]
    );

    // Virtual services for other hosts are left alone.
    let ratings = test
        .store()
        .peek::<VirtualService>("bookinfo", "ratings")
        .unwrap();
    assert!(route::references(&ratings, "v2"));

    let rule = test
        .store()
        .peek::<DestinationRule>("bookinfo", "reviews")
        .unwrap();
    assert_eq!(subset_names(&rule), vec!["v1"]);
    assert!(test
        .store()
        .peek::<Deployment>("bookinfo", "reviews-v2")
        .is_none());
}

#[rstest]
#[case(MatchScope::Host, false)]
#[case(MatchScope::Gateway, true)]
#[case(MatchScope::All, true)]
#[tokio::test(start_paused = true)]
async fn gateway_routes_follow_scope(#[case] scope: MatchScope, #[case] retired: bool) {
    let test = TestConfig::default().with_app("bookinfo", "reviews", &["v1", "v2"]);
    test.store().insert(mk_virtual_service(
        "ingress",
        "bookinfo-gateway",
        &["bookinfo.example.com"],
        &[&[
            ("reviews.bookinfo.svc.cluster.local", "v1", Some(50)),
            ("reviews.bookinfo.svc.cluster.local", "v2", Some(50)),
        ]],
    ));

    test.controller
        .retire_version("bookinfo", "reviews", "v2", scope)
        .await
        .unwrap();

    let gateway = test
        .store()
        .peek::<VirtualService>("ingress", "bookinfo-gateway")
        .unwrap();
    assert_eq!(!route::references(&gateway, "v2"), retired);
}

#[tokio::test(start_paused = true)]
async fn cleanup_failures_do_not_stop_retirement() {
    let test = TestConfig::default().with_app("bookinfo", "reviews", &["v1", "v2"]);
    test.store().insert(mk_virtual_service(
        "bookinfo",
        "reviews",
        &["reviews"],
        &[&[("reviews", "v1", Some(50)), ("reviews", "v2", Some(50))]],
    ));
    test.store().fail::<VirtualService>(Op::Update);
    test.store().fail::<DestinationRule>(Op::Update);

    // The routes never drain, so retirement waits out the drain timeout and
    // the grace period before deleting the deployment.
    let start = Instant::now();
    let report = test
        .controller
        .retire_version("bookinfo", "reviews", "v2", MatchScope::Host)
        .await
        .unwrap();
    assert!(start.elapsed() >= Duration::from_secs(4));

    assert_eq!(report.failures().count(), 2);
    assert_eq!(
        steps(&report).last().map(String::as_str),
        Some("delete Deployment bookinfo/reviews-v2")
    );
    assert!(test
        .store()
        .peek::<Deployment>("bookinfo", "reviews-v2")
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn missing_deployment_is_fatal_after_cleanup() {
    let test = TestConfig::default().with_app("bookinfo", "reviews", &["v1"]);
    // The rule declares a subset with no deployment behind it.
    test.store()
        .insert(subset::new_rule("reviews", "bookinfo", "reviews", ["v1", "v2"]));

    let err = test
        .controller
        .retire_version("bookinfo", "reviews", "v2", MatchScope::Host)
        .await
        .unwrap_err();
    match err {
        Error::Partial { report, source } => {
            assert_eq!(
                steps(&report),
                vec!["update DestinationRule bookinfo/reviews"]
            );
            assert!(
                matches!(*source, Error::DeploymentNotFound { found: 0, .. }),
                "{}",
                source
            );
        }
        err => panic!("unexpected error: {}", err),
    }

    let rule = test
        .store()
        .peek::<DestinationRule>("bookinfo", "reviews")
        .unwrap();
    assert_eq!(subset_names(&rule), vec!["v1"]);
}

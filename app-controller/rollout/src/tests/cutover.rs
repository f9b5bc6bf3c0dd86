use super::*;
use pretty_assertions::assert_eq;

fn full_route(host: &str, subset: &str) -> Vec<Vec<(String, String, Option<i32>)>> {
    vec![vec![(host.to_string(), subset.to_string(), Some(100))]]
}

#[tokio::test]
async fn creates_virtual_service_when_none_match() {
    let test = TestConfig::default().with_app("bookinfo", "reviews", &["v1", "v2"]);
    test.store().clear_calls();

    let report = test
        .controller
        .take_over_traffic("bookinfo", "reviews", "v2", MatchScope::Host)
        .await
        .unwrap();
    assert_eq!(
        steps(&report),
        vec!["create VirtualService bookinfo/reviews"]
    );

    let all = test.store().peek_all::<VirtualService>();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].spec.hosts, vec!["reviews"]);
    assert_eq!(route_table(&all[0]), full_route("reviews", "v2"));
}

#[tokio::test]
async fn replaces_whole_route_table() {
    let test = TestConfig::default().with_app("bookinfo", "reviews", &["v1", "v2"]);
    let mut vs = mk_virtual_service(
        "bookinfo",
        "reviews",
        &["reviews"],
        &[
            &[("reviews", "v1", Some(90)), ("reviews", "v2", Some(10))],
            &[("reviews", "v1", None)],
        ],
    );
    vs.spec
        .extra
        .insert("exportTo".to_string(), serde_json::json!(["."]));
    test.store().insert(vs);

    test.controller
        .take_over_traffic("bookinfo", "reviews", "v2", MatchScope::Host)
        .await
        .unwrap();

    let vs = test
        .store()
        .peek::<VirtualService>("bookinfo", "reviews")
        .unwrap();
    assert_eq!(route_table(&vs), full_route("reviews", "v2"));
    assert_eq!(vs.spec.http, vec![route::single_route("reviews", "v2")]);
    assert_eq!(vs.spec.hosts, vec!["reviews"]);
    assert_eq!(vs.spec.extra["exportTo"], serde_json::json!(["."]));
}

#[tokio::test]
async fn gateway_routes_use_qualified_host() {
    let test = TestConfig::default().with_app("bookinfo", "reviews", &["v1", "v2"]);
    test.store().insert(mk_virtual_service(
        "ingress",
        "bookinfo-gateway",
        &["bookinfo.example.com"],
        &[&[("reviews.bookinfo.svc.cluster.local", "v1", None)]],
    ));

    // Under the host scope the gateway's virtual service does not match.
    test.controller
        .take_over_traffic("bookinfo", "reviews", "v2", MatchScope::Host)
        .await
        .unwrap();
    assert!(test
        .store()
        .peek::<VirtualService>("bookinfo", "reviews")
        .is_some());

    let report = test
        .controller
        .take_over_traffic("bookinfo", "reviews", "v2", MatchScope::All)
        .await
        .unwrap();
    assert_eq!(
        steps(&report),
        vec![
            "update VirtualService bookinfo/reviews",
            "update VirtualService ingress/bookinfo-gateway",
        ]
    );

    let gateway = test
        .store()
        .peek::<VirtualService>("ingress", "bookinfo-gateway")
        .unwrap();
    assert_eq!(
        route_table(&gateway),
        full_route("reviews.bookinfo.svc.cluster.local", "v2")
    );
}

#[tokio::test]
async fn requires_version_deployment() {
    let test = TestConfig::default().with_app("bookinfo", "reviews", &["v1"]);
    test.store().clear_calls();

    let err = test
        .controller
        .take_over_traffic("bookinfo", "reviews", "v3", MatchScope::Host)
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::DeploymentNotFound { found: 0, .. }),
        "{}",
        err
    );
    assert!(test.store().writes().is_empty());
}

#[tokio::test]
async fn first_failed_update_stops_cutover() {
    let test = TestConfig::default().with_app("bookinfo", "reviews", &["v1", "v2"]);
    for name in ["a", "b", "c"] {
        test.store().insert(mk_virtual_service(
            "bookinfo",
            name,
            &["reviews"],
            &[&[("reviews", "v1", None)]],
        ));
    }
    test.store().fail_named::<VirtualService>(Op::Update, "b");
    test.store().clear_calls();

    let err = test
        .controller
        .take_over_traffic("bookinfo", "reviews", "v2", MatchScope::Host)
        .await
        .unwrap_err();
    let report = err.report().expect("a was already updated");
    assert_eq!(report.completed(), 1);
    assert_eq!(
        test.store().writes(),
        vec![
            Call::new(Op::Update, "VirtualService", "bookinfo", "a"),
            Call::new(Op::Update, "VirtualService", "bookinfo", "b"),
        ]
    );

    let c = test.store().peek::<VirtualService>("bookinfo", "c").unwrap();
    assert_eq!(
        route_table(&c),
        vec![vec![("reviews".to_string(), "v1".to_string(), None)]]
    );
}

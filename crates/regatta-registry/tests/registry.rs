//! Register/lookup behavior of apps, revisions, services and
//! endpoints.

mod common;

use common::setup;
use regatta_registry::{Error, StoreError};

// ── Apps ───────────────────────────────────────────────────────────

#[tokio::test]
async fn app_register_and_lookup() {
    let s = setup("/app-test").await;
    let app = s.new_app("regcat", "git://regcat", "regcatstack").unwrap();

    let app = app.register().await.unwrap();
    assert!(app.snapshot().rev > 0);

    let have = s.fast_forward().await.unwrap().get_app("regcat").await.unwrap();
    assert_eq!(have.name, "regcat");
    assert_eq!(have.repo_url, "git://regcat");
    assert_eq!(have.stack, "regcatstack");
}

#[tokio::test]
async fn app_double_register_is_an_error() {
    let s = setup("/app-test").await;
    let app = s.new_app("cat", "git://cat", "master").unwrap();
    let app = app.register().await.unwrap();

    let err = app.register().await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRegistered { kind: "app", .. }));
}

#[tokio::test]
async fn app_unregister_removes_the_record() {
    let s = setup("/app-test").await;
    let app = s.new_app("cat", "git://cat", "master").unwrap();
    let app = app.register().await.unwrap();

    app.unregister().await.unwrap();

    let s = s.fast_forward().await.unwrap();
    assert!(matches!(
        s.get_app("cat").await.unwrap_err(),
        Error::AppNotFound(_)
    ));
}

#[tokio::test]
async fn app_names_follow_the_grammar() {
    let s = setup("/app-test").await;
    assert!(matches!(
        s.new_app("who_op", "git://x", "master").unwrap_err(),
        Error::InvalidName(_)
    ));
    assert!(matches!(
        s.new_app("", "git://x", "master").unwrap_err(),
        Error::InvalidName(_)
    ));
    // Dots and dashes are fine.
    s.new_app("cat-v1.2", "git://x", "master").unwrap();
}

#[tokio::test]
async fn app_env_crud() {
    let s = setup("/app-test").await;
    let app = s.new_app("envcat", "git://envcat", "master").unwrap();
    let app = app.register().await.unwrap();

    let app = app.set_env("DATABASE_URL", "postgres://db").await.unwrap();
    let app = app.set_env("THREADS", "8").await.unwrap();
    assert_eq!(app.get_env("THREADS").await.unwrap(), "8");

    let env = app.env().await.unwrap();
    assert_eq!(env.len(), 2);
    assert_eq!(env["DATABASE_URL"], "postgres://db");

    let app = app.del_env("THREADS").await.unwrap();
    assert!(matches!(
        app.get_env("THREADS").await.unwrap_err(),
        Error::Store(StoreError::KeyNotFound(_))
    ));
    assert_eq!(app.env().await.unwrap().len(), 1);
}

// ── Revisions ──────────────────────────────────────────────────────

#[tokio::test]
async fn revision_register_and_exists() {
    let s = setup("/revision-test").await;
    let app = s.new_app("rev-test", "git://rev.git", "references").unwrap();
    let app = app.register().await.unwrap();

    let rev = s.new_revision(&app, "stable", "stable.img").unwrap();
    assert!(!rev.exists().await.unwrap());

    let rev = rev.register().await.unwrap();
    assert!(rev.exists().await.unwrap());

    let err = rev.register().await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRegistered { kind: "revision", .. }));
}

#[tokio::test]
async fn revision_requires_a_registered_app() {
    let s = setup("/revision-test").await;
    let app = s.new_app("ghost", "git://ghost", "master").unwrap();

    let rev = s.new_revision(&app, "stable", "stable.img").unwrap();
    assert!(matches!(
        rev.register().await.unwrap_err(),
        Error::AppNotFound(_)
    ));
}

#[tokio::test]
async fn revision_unregister_is_idempotent() {
    let s = setup("/revision-test").await;
    let app = s.new_app("rev-test", "git://rev.git", "references").unwrap();
    let app = app.register().await.unwrap();

    let rev = s.new_revision(&app, "master", "master.img").unwrap();
    let rev = rev.register().await.unwrap();

    rev.unregister().await.unwrap();
    assert!(!rev.snapshot().fast_forward().await.unwrap().exists("/apps/rev-test/revs/master").await.unwrap());

    // Second call returns cleanly, no ghost state.
    rev.unregister().await.unwrap();
}

#[tokio::test]
async fn unknown_revision_has_a_structured_error() {
    let s = setup("/revision-test").await;
    let app = s.new_app("rev-test", "git://rev.git", "references").unwrap();
    let app = app.register().await.unwrap();

    let err = app.get_revision("unknown").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"revision "unknown" not found for app rev-test"#
    );
}

#[tokio::test]
async fn revision_lookup_roundtrips() {
    let s = setup("/revision-test").await;
    let app = s.new_app("rev-test", "git://rev.git", "references").unwrap();
    let app = app.register().await.unwrap();

    let rev = s.new_revision(&app, "v1.4", "v1.4.img").unwrap();
    let rev = rev.register().await.unwrap();

    let have = s
        .fast_forward()
        .await
        .unwrap()
        .get_app("rev-test")
        .await
        .unwrap()
        .get_revision("v1.4")
        .await
        .unwrap();
    assert_eq!(have.name, rev.name);
    assert_eq!(have.archive_url, "v1.4.img");
}

// ── Services & endpoints ───────────────────────────────────────────

#[tokio::test]
async fn service_register_and_unregister() {
    let s = setup("/service-test").await;
    let srv = s.new_service("db").unwrap();
    let srv = srv.register().await.unwrap();

    assert!(matches!(
        srv.register().await.unwrap_err(),
        Error::AlreadyRegistered { kind: "service", .. }
    ));

    srv.unregister().await.unwrap();
    let s = s.fast_forward().await.unwrap();
    assert!(matches!(
        s.get_service("db").await.unwrap_err(),
        Error::ServiceNotFound(_)
    ));
}

#[tokio::test]
async fn endpoint_ids_derive_from_the_address() {
    let s = setup("/service-test").await;
    let srv = s.new_service("web").unwrap().register().await.unwrap();

    let ep = s.new_endpoint(&srv, "1.2.3.4", 1000).unwrap();
    assert_eq!(ep.id, "1-2-3-4-1000");

    let ep = ep.register().await.unwrap();
    assert_eq!(ep.port, 1000);

    let srv = s.fast_forward().await.unwrap().get_service("web").await.unwrap();
    let eps = srv.get_endpoints().await.unwrap();
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].id, "1-2-3-4-1000");
    assert_eq!(eps[0].addr.to_string(), "1.2.3.4");
    assert_eq!(eps[0].port, 1000);
}

#[tokio::test]
async fn endpoint_rejects_unparseable_addresses() {
    let s = setup("/service-test").await;
    let srv = s.new_service("web").unwrap().register().await.unwrap();
    assert!(matches!(
        s.new_endpoint(&srv, "not-an-ip", 80).unwrap_err(),
        Error::InvalidName(_)
    ));
}

#[tokio::test]
async fn endpoint_requires_a_registered_service() {
    let s = setup("/service-test").await;
    let srv = s.new_service("ghost").unwrap();
    let ep = s.new_endpoint(&srv, "4.3.2.1", 2000).unwrap();
    assert!(matches!(
        ep.register().await.unwrap_err(),
        Error::ServiceNotFound(_)
    ));
}

#[tokio::test]
async fn endpoint_unregister_is_idempotent() {
    let s = setup("/service-test").await;
    let srv = s.new_service("web").unwrap().register().await.unwrap();
    let ep = s.new_endpoint(&srv, "4.3.2.1", 2000).unwrap();
    let ep = ep.register().await.unwrap();

    ep.unregister().await.unwrap();
    ep.unregister().await.unwrap();

    let srv = s.fast_forward().await.unwrap().get_service("web").await.unwrap();
    assert!(srv.get_endpoints().await.unwrap().is_empty());
}

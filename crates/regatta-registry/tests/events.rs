//! The watch & enrichment pipeline, end to end against the embedded
//! engine.

mod common;

use common::{expect_event, setup};
use regatta_registry::{EventType, InsStatus, Source, Store};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

fn start_watcher(s: &Store) -> mpsc::Receiver<regatta_registry::Event> {
    let (tx, rx) = mpsc::channel(16);
    let watcher = s.clone();
    tokio::spawn(async move { watcher.watch_event(tx).await });
    rx
}

#[tokio::test]
async fn app_registered_event() {
    let s = setup("/event-test").await;
    let app = s.new_app("regcat", "git://regcat", "regcatstack").unwrap();

    let mut rx = start_watcher(&s);
    app.register().await.unwrap();

    let ev = expect_event(&mut rx, EventType::AppRegister).await;
    assert_eq!(ev.path.app.as_deref(), Some("regcat"));
    let Some(Source::App(src)) = ev.source else {
        panic!("expected an app source, got {:?}", ev.source);
    };
    assert_eq!(src.name, "regcat");
}

#[tokio::test]
async fn app_unregistered_event() {
    let s = setup("/event-test").await;
    let app = s.new_app("unregcat", "git://unregcat", "unregcatstack").unwrap();
    let app = app.register().await.unwrap();

    let s = s.fast_forward().await.unwrap();
    let mut rx = start_watcher(&s);
    app.unregister().await.unwrap();

    let ev = expect_event(&mut rx, EventType::AppUnregister).await;
    assert_eq!(ev.path.app.as_deref(), Some("unregcat"));
    assert!(ev.source.is_none(), "deletes carry no source");
}

#[tokio::test]
async fn revision_events() {
    let s = setup("/event-test").await;
    let app = s.new_app("regdog", "git://regdog", "stack").unwrap();
    let app = app.register().await.unwrap();

    let s = s.fast_forward().await.unwrap();
    let mut rx = start_watcher(&s);

    let rev = s.new_revision(&app, "stable", "stable.img").unwrap();
    let rev = rev.register().await.unwrap();

    let ev = expect_event(&mut rx, EventType::RevRegister).await;
    assert_eq!(ev.path.app.as_deref(), Some("regdog"));
    assert_eq!(ev.path.revision.as_deref(), Some("stable"));
    let Some(Source::Revision(src)) = ev.source else {
        panic!("expected a revision source");
    };
    assert_eq!(src.name, "stable");

    rev.unregister().await.unwrap();
    let ev = expect_event(&mut rx, EventType::RevUnregister).await;
    assert_eq!(ev.path.revision.as_deref(), Some("stable"));
}

#[tokio::test]
async fn proc_events() {
    let s = setup("/event-test").await;
    let app = s.new_app("regstar", "git://regstar", "stack").unwrap();
    let app = app.register().await.unwrap();

    let s = s.fast_forward().await.unwrap();
    let mut rx = start_watcher(&s);

    let proc = s.new_proc(&app, "all").unwrap();
    let proc = proc.register().await.unwrap();
    let ev = expect_event(&mut rx, EventType::ProcRegister).await;
    assert_eq!(ev.path.app.as_deref(), Some("regstar"));
    assert_eq!(ev.path.proc.as_deref(), Some("all"));

    let mut proc = proc;
    proc.attrs.log_persistence = true;
    let proc = proc.store_attrs().await.unwrap();
    let ev = expect_event(&mut rx, EventType::ProcAttrs).await;
    let Some(Source::Proc(src)) = ev.source else {
        panic!("expected a proc source");
    };
    assert!(src.attrs.log_persistence);

    proc.unregister().await.unwrap();
    let ev = expect_event(&mut rx, EventType::ProcUnregister).await;
    assert_eq!(ev.path.proc.as_deref(), Some("all"));
}

#[tokio::test]
async fn instance_registered_and_unregistered_events() {
    let s = setup("/event-test").await;
    let mut rx = start_watcher(&s);

    let ins = s
        .register_instance("regmouse", "stable", "web", "default")
        .await
        .unwrap();

    let ev = expect_event(&mut rx, EventType::InstanceRegister).await;
    assert_eq!(ev.path.instance.as_deref(), Some("1"));
    let Some(Source::Instance(src)) = ev.source else {
        panic!("expected an instance source");
    };
    assert_eq!(src.app_name, "regmouse");
    assert_eq!(src.status, InsStatus::Pending);

    ins.unregister("event-test", "cleanup").await.unwrap();
    expect_event(&mut rx, EventType::InstanceUnregister).await;
}

#[tokio::test]
async fn instance_state_change_events() {
    let ip = "10.0.0.1";
    let port = 9999;
    let tport = 10000;
    let host = "mouse.org";

    let s = setup("/event-test").await;
    let ins = s
        .register_instance("statemouse", "stable-state", "web-state", "default")
        .await
        .unwrap();
    let ins = ins.claim(ip).await.unwrap();

    let s = s.fast_forward().await.unwrap();
    let mut rx = start_watcher(&s);

    let ins = ins.started(ip, host, port, tport).await.unwrap();

    // A start is visible twice: the start ticket, then the status
    // flip. Both enrich to the running instance.
    let ev = expect_event(&mut rx, EventType::InstanceStart).await;
    let Some(Source::Instance(src)) = ev.source else {
        panic!("expected an instance source");
    };
    assert_eq!(src.ip, ip);
    assert_eq!(src.hostname, host);
    assert_eq!(src.port, port);
    let ev = expect_event(&mut rx, EventType::InstanceStart).await;
    assert_eq!(ev.body, "running");

    let failed = ins.failed(ip, "no reason").await.unwrap();
    let ev = expect_event(&mut rx, EventType::InstanceFail).await;
    assert_eq!(ev.path.instance.as_deref(), Some(failed.id.to_string().as_str()));

    // A fresh instance exercises the exit path.
    let ins = s
        .register_instance("statemouse", "stable-state", "web-state", "default")
        .await
        .unwrap();
    expect_event(&mut rx, EventType::InstanceRegister).await;
    let ins = ins.claim(ip).await.unwrap();
    let ins = ins.started(ip, host, port, tport).await.unwrap();
    expect_event(&mut rx, EventType::InstanceStart).await;
    expect_event(&mut rx, EventType::InstanceStart).await;
    ins.exited(ip).await.unwrap();
    expect_event(&mut rx, EventType::InstanceExit).await;
}

#[tokio::test]
async fn instance_lost_event() {
    let s = setup("/event-test").await;
    let ins = s
        .register_instance("lostmouse", "stable", "web", "default")
        .await
        .unwrap();
    let ins = ins.claim("10.0.0.1").await.unwrap();

    let s = s.fast_forward().await.unwrap();
    let mut rx = start_watcher(&s);

    ins.lost("watchman", "no heartbeat").await.unwrap();
    let ev = expect_event(&mut rx, EventType::InstanceLost).await;
    let Some(Source::Instance(src)) = ev.source else {
        panic!("expected an instance source");
    };
    assert_eq!(src.status, InsStatus::Lost);
    assert_eq!(src.reason.as_deref(), Some("watchman: no heartbeat"));
}

#[tokio::test]
async fn service_events() {
    let s = setup("/event-test").await;
    let mut rx = start_watcher(&s);

    let srv = s.new_service("eventsrv").unwrap();
    let srv = srv.register().await.unwrap();
    let ev = expect_event(&mut rx, EventType::ServiceRegister).await;
    assert_eq!(ev.path.service.as_deref(), Some("eventsrv"));

    srv.unregister().await.unwrap();
    let ev = expect_event(&mut rx, EventType::ServiceUnregister).await;
    assert_eq!(ev.path.service.as_deref(), Some("eventsrv"));
}

#[tokio::test]
async fn endpoint_events_carry_the_encoded_id() {
    let s = setup("/event-test").await;
    let srv = s.new_service("eventep").unwrap().register().await.unwrap();

    let s = s.fast_forward().await.unwrap();
    let mut rx = start_watcher(&s);

    let ep = s.new_endpoint(&srv, "1.2.3.4", 1000).unwrap();
    let ep = ep.register().await.unwrap();

    let ev = expect_event(&mut rx, EventType::EndpointRegister).await;
    assert_eq!(ev.path.service.as_deref(), Some("eventep"));
    assert_eq!(ev.path.endpoint.as_deref(), Some("1-2-3-4-1000"));
    let Some(Source::Endpoint(src)) = ev.source else {
        panic!("expected an endpoint source");
    };
    assert_eq!(src.addr.to_string(), "1.2.3.4");
    assert_eq!(src.port, 1000);

    ep.unregister().await.unwrap();
    let ev = expect_event(&mut rx, EventType::EndpointUnregister).await;
    assert_eq!(ev.path.endpoint.as_deref(), Some("1-2-3-4-1000"));
}

#[tokio::test]
async fn events_arrive_in_revision_order() {
    let s = setup("/event-test").await;
    let mut rx = start_watcher(&s);

    for name in ["one", "two", "three", "four"] {
        let app = s.new_app(name, &format!("git://{name}"), "stack").unwrap();
        app.register().await.unwrap();
    }

    let mut last_rev = 0;
    for _ in 0..4 {
        let ev = expect_event(&mut rx, EventType::AppRegister).await;
        assert!(ev.rev > last_rev, "events out of order");
        last_rev = ev.rev;
    }
}

#[tokio::test]
async fn raw_watcher_forwards_unknown_mutations() {
    let s = setup("/event-test").await;

    let (tx, mut rx) = mpsc::channel(16);
    let watcher = s.clone();
    tokio::spawn(async move { watcher.watch_event_raw(tx).await });

    let app = s.new_app("envcat", "git://envcat", "stack").unwrap();
    let app = app.register().await.unwrap();
    app.set_env("KEY", "value").await.unwrap();

    // repo-url, stack and the env leaf ride the raw stream as UNKNOWN.
    let mut kinds = Vec::new();
    for _ in 0..4 {
        let ev = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .expect("watcher hung up");
        kinds.push(ev.kind);
    }
    assert!(kinds.contains(&EventType::AppRegister));
    assert!(kinds.contains(&EventType::Unknown));
}

#[tokio::test]
async fn filtered_watcher_drops_unknown_mutations() {
    let s = setup("/event-test").await;
    let mut rx = start_watcher(&s);

    let app = s.new_app("envcat", "git://envcat", "stack").unwrap();
    let app = app.register().await.unwrap();
    app.set_env("KEY", "value").await.unwrap();

    let srv = s.new_service("after").unwrap();
    srv.register().await.unwrap();

    // Only the typed events come through, in order.
    expect_event(&mut rx, EventType::AppRegister).await;
    expect_event(&mut rx, EventType::ServiceRegister).await;
}

#[tokio::test]
async fn closing_the_store_stops_the_watcher() {
    let s = setup("/event-test").await;

    let (tx, _rx) = mpsc::channel(16);
    let watcher = s.clone();
    let handle = tokio::spawn(async move { watcher.watch_event(tx).await });

    tokio::task::yield_now().await;
    s.close().await;

    let result = timeout(Duration::from_secs(2), handle)
        .await
        .expect("watcher did not stop")
        .expect("watcher panicked");
    assert!(result.is_err(), "expected the closed connection to error");
}

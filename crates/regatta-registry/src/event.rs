//! Watch & event enrichment.
//!
//! One long-lived watcher per store turns raw path mutations into
//! typed events: classify the path against the codec's pattern table,
//! load the referenced entities at the mutation's own revision, and
//! deliver in strict revision order on a caller-supplied sink.
//!
//! The filtered watcher drops mutations the table does not know
//! (env leaves, claim tickets, …); the raw watcher forwards them as
//! [`EventType::Unknown`]. A slow consumer stalls the watcher — that
//! is intentional, ordering is preserved by not buffering.

use regatta_store::{RawEvent, Snapshot};
use tokio::sync::mpsc;
use tracing::debug;

use crate::app::{self, App};
use crate::endpoint::{self, Endpoint};
use crate::error::{Error, Result};
use crate::instance::{self, InsStatus, Instance};
use crate::paths::{classify, PathKind};
use crate::proc::{self, Proc};
use crate::revision::{self, Revision};
use crate::service::{self, Service};
use crate::store::Store;

/// Typed event kinds, one per classification row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    AppRegister,
    AppUnregister,
    RevRegister,
    RevUnregister,
    ProcRegister,
    ProcUnregister,
    ProcAttrs,
    InstanceRegister,
    InstanceUnregister,
    InstanceStart,
    InstanceExit,
    InstanceFail,
    InstanceLost,
    ServiceRegister,
    ServiceUnregister,
    EndpointRegister,
    EndpointUnregister,
    Unknown,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AppRegister => "app-register",
            EventType::AppUnregister => "app-unregister",
            EventType::RevRegister => "rev-register",
            EventType::RevUnregister => "rev-unregister",
            EventType::ProcRegister => "proc-register",
            EventType::ProcUnregister => "proc-unregister",
            EventType::ProcAttrs => "proc-attrs",
            EventType::InstanceRegister => "instance-register",
            EventType::InstanceUnregister => "instance-unregister",
            EventType::InstanceStart => "instance-start",
            EventType::InstanceExit => "instance-exit",
            EventType::InstanceFail => "instance-fail",
            EventType::InstanceLost => "instance-lost",
            EventType::ServiceRegister => "service-register",
            EventType::ServiceUnregister => "service-unregister",
            EventType::EndpointRegister => "endpoint-register",
            EventType::EndpointUnregister => "endpoint-unregister",
            EventType::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The raw identity segments a mutated path encodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathData {
    pub app: Option<String>,
    pub revision: Option<String>,
    pub proc: Option<String>,
    pub instance: Option<String>,
    pub service: Option<String>,
    pub endpoint: Option<String>,
}

/// The fully loaded entity a set-event refers to, at the event's
/// revision.
#[derive(Debug, Clone)]
pub enum Source {
    App(App),
    Revision(Revision),
    Proc(Proc),
    Instance(Instance),
    Service(Service),
    Endpoint(Endpoint),
}

/// A typed registry event.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventType,
    /// Body of the mutated file (empty for deletes).
    pub body: String,
    /// Canonicalized entity; `None` for deletes and unknown paths.
    pub source: Option<Source>,
    /// Raw id fields parsed out of the path.
    pub path: PathData,
    pub rev: i64,
}

impl Store {
    /// Watch the whole tree and deliver typed events on `tx`,
    /// dropping `Unknown` ones.
    ///
    /// Runs until the connection closes (error), enrichment fails
    /// (error), or the receiver is dropped (clean return). The library
    /// does not reconnect; callers restart with a fresh store.
    pub async fn watch_event(&self, tx: mpsc::Sender<Event>) -> Result<()> {
        watch_loop(self.get_snapshot(), tx, true).await
    }

    /// Like [`watch_event`](Store::watch_event), but forwards
    /// `Unknown` events too.
    pub async fn watch_event_raw(&self, tx: mpsc::Sender<Event>) -> Result<()> {
        watch_loop(self.get_snapshot(), tx, false).await
    }
}

async fn watch_loop(snapshot: Snapshot, tx: mpsc::Sender<Event>, filtered: bool) -> Result<()> {
    let mut snapshot = snapshot;
    loop {
        let (raw, at) = snapshot.wait("/**").await?;
        snapshot = at;

        let event = enrich_event(&raw, &snapshot).await?;
        if filtered && event.kind == EventType::Unknown {
            continue;
        }
        debug!(kind = %event.kind, rev = event.rev, path = %raw.path, "delivering event");
        if tx.send(event).await.is_err() {
            // Receiver gone; the watcher has no one to talk to.
            return Ok(());
        }
    }
}

/// Classify a raw mutation into an event type and its path identities.
fn classify_event(raw: &RawEvent) -> (EventType, PathData) {
    let mut path = PathData::default();
    let Some((kind, ids)) = classify(&raw.path) else {
        return (EventType::Unknown, path);
    };

    let etype = match kind {
        PathKind::AppRegistered => {
            path.app = Some(ids[0].clone());
            registered_event(raw, EventType::AppRegister, EventType::AppUnregister)
        }
        PathKind::RevRegistered => {
            path.app = Some(ids[0].clone());
            path.revision = Some(ids[1].clone());
            registered_event(raw, EventType::RevRegister, EventType::RevUnregister)
        }
        PathKind::ProcRegistered => {
            path.app = Some(ids[0].clone());
            path.proc = Some(ids[1].clone());
            registered_event(raw, EventType::ProcRegister, EventType::ProcUnregister)
        }
        PathKind::ProcAttrs => {
            path.app = Some(ids[0].clone());
            path.proc = Some(ids[1].clone());
            if raw.is_set() {
                EventType::ProcAttrs
            } else {
                EventType::Unknown
            }
        }
        PathKind::InstanceRegistered => {
            path.instance = Some(ids[0].clone());
            registered_event(raw, EventType::InstanceRegister, EventType::InstanceUnregister)
        }
        PathKind::InstanceStart => {
            if !raw.is_set() || raw.body.is_empty() {
                return (EventType::Unknown, path);
            }
            path.instance = Some(ids[0].clone());
            // A one-field start body is the claim placeholder, not a
            // started process.
            if raw.body.split_whitespace().count() > 1 {
                EventType::InstanceStart
            } else {
                EventType::Unknown
            }
        }
        PathKind::InstanceStatus => {
            path.instance = Some(ids[0].clone());
            if !raw.is_set() {
                EventType::Unknown
            } else {
                match raw.body.parse::<InsStatus>() {
                    Ok(InsStatus::Running) => EventType::InstanceStart,
                    Ok(InsStatus::Exited) => EventType::InstanceExit,
                    Ok(InsStatus::Failed) => EventType::InstanceFail,
                    Ok(InsStatus::Lost) => EventType::InstanceLost,
                    _ => EventType::Unknown,
                }
            }
        }
        // Stop tickets ride the raw stream only.
        PathKind::InstanceStop => EventType::Unknown,
        PathKind::ServiceRegistered => {
            path.service = Some(ids[0].clone());
            registered_event(raw, EventType::ServiceRegister, EventType::ServiceUnregister)
        }
        PathKind::EndpointRegistered => {
            path.service = Some(ids[0].clone());
            path.endpoint = Some(ids[1].clone());
            registered_event(raw, EventType::EndpointRegister, EventType::EndpointUnregister)
        }
    };
    (etype, path)
}

fn registered_event(raw: &RawEvent, set: EventType, del: EventType) -> EventType {
    if raw.is_set() {
        set
    } else {
        del
    }
}

/// Turn a raw mutation into a typed event, loading the referenced
/// entities at the mutation's revision.
async fn enrich_event(raw: &RawEvent, snapshot: &Snapshot) -> Result<Event> {
    let (kind, path) = classify_event(raw);

    let source = if kind != EventType::Unknown && raw.is_set() {
        canonicalize(kind, &path, snapshot)
            .await
            .map_err(|e| Error::Enrichment {
                path: raw.path.clone(),
                rev: raw.rev,
                source: Box::new(e),
            })?
    } else {
        None
    };

    Ok(Event {
        kind,
        body: raw.body.clone(),
        source,
        path,
        rev: raw.rev,
    })
}

/// Load every entity the path names, outermost first, and pick the
/// event type's subject.
async fn canonicalize(
    kind: EventType,
    path: &PathData,
    snapshot: &Snapshot,
) -> Result<Option<Source>> {
    let mut app = None;
    if let Some(name) = &path.app {
        app = Some(app::get_app(name, snapshot.clone()).await?);
    }

    let mut rev = None;
    if let (Some(name), Some(app)) = (&path.revision, &app) {
        rev = Some(revision::get_revision(app, name, snapshot.clone()).await?);
    }

    let mut proc = None;
    if let (Some(name), Some(app)) = (&path.proc, &app) {
        proc = Some(proc::get_proc(app, name, snapshot.clone()).await?);
    }

    let mut ins = None;
    if let Some(id) = &path.instance {
        let id: i64 = id.parse().map_err(|_| Error::BadRecord {
            path: id.clone(),
            detail: "unparseable instance id".to_string(),
        })?;
        ins = Some(instance::get_instance(id, snapshot.clone()).await?);
    }

    let mut svc = None;
    if let Some(name) = &path.service {
        svc = Some(service::get_service(name, snapshot.clone()).await?);
    }

    let mut ep = None;
    if let (Some(id), Some(svc)) = (&path.endpoint, &svc) {
        ep = Some(endpoint::get_endpoint(svc, id, snapshot.clone()).await?);
    }

    Ok(match kind {
        EventType::AppRegister => app.map(Source::App),
        EventType::RevRegister => rev.map(Source::Revision),
        EventType::ProcRegister | EventType::ProcAttrs => proc.map(Source::Proc),
        EventType::InstanceRegister
        | EventType::InstanceStart
        | EventType::InstanceExit
        | EventType::InstanceFail
        | EventType::InstanceLost => ins.map(Source::Instance),
        EventType::ServiceRegister => svc.map(Source::Service),
        EventType::EndpointRegister => ep.map(Source::Endpoint),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use regatta_store::MutationKind;

    use super::*;

    fn raw(path: &str, body: &str, kind: MutationKind) -> RawEvent {
        RawEvent {
            path: path.to_string(),
            body: body.to_string(),
            rev: 1,
            kind,
        }
    }

    #[test]
    fn registered_leaves_classify_by_mutation_kind() {
        let (kind, path) = classify_event(&raw("/apps/cat/registered", "t", MutationKind::Set));
        assert_eq!(kind, EventType::AppRegister);
        assert_eq!(path.app.as_deref(), Some("cat"));

        let (kind, _) = classify_event(&raw("/apps/cat/registered", "", MutationKind::Del));
        assert_eq!(kind, EventType::AppUnregister);
    }

    #[test]
    fn status_bodies_select_the_event_type() {
        let cases = [
            ("running", EventType::InstanceStart),
            ("exited", EventType::InstanceExit),
            ("failed", EventType::InstanceFail),
            ("lost", EventType::InstanceLost),
            ("pending", EventType::Unknown),
            ("claimed", EventType::Unknown),
            ("done", EventType::Unknown),
            ("garbage", EventType::Unknown),
        ];
        for (body, want) in cases {
            let (kind, path) = classify_event(&raw("/instances/3/status", body, MutationKind::Set));
            assert_eq!(kind, want, "status body {body:?}");
            assert_eq!(path.instance.as_deref(), Some("3"));
        }
    }

    #[test]
    fn start_bodies_need_at_least_two_fields() {
        let (kind, _) = classify_event(&raw("/instances/3/start", "10.0.0.1", MutationKind::Set));
        assert_eq!(kind, EventType::Unknown);

        let (kind, _) = classify_event(&raw(
            "/instances/3/start",
            "10.0.0.1 9999 10000 mouse.org",
            MutationKind::Set,
        ));
        assert_eq!(kind, EventType::InstanceStart);

        let (kind, _) = classify_event(&raw("/instances/3/start", "", MutationKind::Set));
        assert_eq!(kind, EventType::Unknown);
    }

    #[test]
    fn stop_tickets_and_strays_stay_unknown() {
        for (path, body) in [
            ("/instances/3/stop", "12345"),
            ("/apps/cat/env/KEY", "value"),
            ("/instances/3/claims/10.0.0.1", "12345"),
            ("/registered", "t"),
        ] {
            let (kind, _) = classify_event(&raw(path, body, MutationKind::Set));
            assert_eq!(kind, EventType::Unknown, "{path}");
        }
    }

    #[test]
    fn endpoint_paths_carry_both_identities() {
        let (kind, path) = classify_event(&raw(
            "/services/db/endpoints/1-2-3-4-1000/registered",
            "t",
            MutationKind::Set,
        ));
        assert_eq!(kind, EventType::EndpointRegister);
        assert_eq!(path.service.as_deref(), Some("db"));
        assert_eq!(path.endpoint.as_deref(), Some("1-2-3-4-1000"));
    }
}

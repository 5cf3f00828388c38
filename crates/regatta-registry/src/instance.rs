//! Instances — the scheduled units of (app, revision, proc, env) and
//! their lifecycle state machine.
//!
//! The `status` file is the authoritative state; `claims/<host>`,
//! `start` and `stop` are the tickets that drive or record
//! transitions:
//!
//! ```text
//! (created) --register--> pending --claim--> claimed --started--> running
//!   running --exited--> exited
//!   running --failed--> failed
//!   any non-done state --lost--> lost
//!   any --unregister--> done (record swept, done index written)
//! ```
//!
//! Every transition is one or more compare-and-set writes; a stale
//! snapshot loses with a conflict error and the caller must refresh.

use std::fmt;
use std::str::FromStr;

use regatta_store::{Dir, Snapshot, StoreError};
use tracing::info;

use crate::error::{Error, Result};
use crate::paths::{
    check_name, instance_path, proc_done_path, proc_instances_path, INSTANCE_SEQ_PATH, REGISTERED,
};
use crate::store::epoch_secs;

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsStatus {
    Pending,
    Claimed,
    Running,
    Exited,
    Failed,
    Lost,
    Done,
}

impl InsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsStatus::Pending => "pending",
            InsStatus::Claimed => "claimed",
            InsStatus::Running => "running",
            InsStatus::Exited => "exited",
            InsStatus::Failed => "failed",
            InsStatus::Lost => "lost",
            InsStatus::Done => "done",
        }
    }
}

impl fmt::Display for InsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        Ok(match s {
            "pending" => InsStatus::Pending,
            "claimed" => InsStatus::Claimed,
            "running" => InsStatus::Running,
            "exited" => InsStatus::Exited,
            "failed" => InsStatus::Failed,
            "lost" => InsStatus::Lost,
            "done" => InsStatus::Done,
            _ => return Err(()),
        })
    }
}

/// One scheduled unit. The identity tuple is written once at
/// registration and immutable thereafter; everything else is
/// transition metadata.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: i64,
    pub app_name: String,
    pub rev_name: String,
    pub proc_name: String,
    pub env_name: String,
    pub status: InsStatus,
    /// Address of the claiming host, empty until claimed.
    pub ip: String,
    pub port: u16,
    pub telemetry_port: u16,
    /// Hostname reported at start, empty before `running`.
    pub hostname: String,
    /// Diagnostic recorded by a terminal transition.
    pub reason: Option<String>,
    dir: Dir,
}

impl Instance {
    pub fn snapshot(&self) -> &Snapshot {
        self.dir.snapshot()
    }

    fn with_dir(&self, dir: Dir) -> Instance {
        Instance {
            dir,
            ..self.clone()
        }
    }

    fn registered_body(&self) -> String {
        format!(
            "{} {} {} {}",
            self.app_name, self.rev_name, self.proc_name, self.env_name
        )
    }

    fn expect_status(&self, expected: InsStatus) -> Result<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                id: self.id,
                status: self.status.as_str(),
                expected: expected.as_str(),
            })
        }
    }

    /// Check that `host` holds the claim ticket.
    async fn verify_claimer(&self, host: &str) -> Result<()> {
        if self.dir.exists_file(&format!("claims/{host}")).await? {
            Ok(())
        } else {
            Err(Error::NotClaimer {
                id: self.id,
                host: host.to_string(),
            })
        }
    }

    /// Hosts currently holding claim tickets.
    pub async fn get_claimers(&self) -> Result<Vec<String>> {
        Ok(self.dir.snapshot().getdir(&self.dir.file("claims")).await?)
    }

    /// Take the claim ticket for `host` and move `pending` → `claimed`.
    ///
    /// The first writer wins: the loser of a concurrent claim observes
    /// a conflict on the status flip, and its stray `claims/<host>`
    /// leaf is left for the caller to reconcile (`unclaim`).
    pub async fn claim(&self, host: &str) -> Result<Instance> {
        self.expect_status(InsStatus::Pending)?;
        self.dir
            .set(&format!("claims/{host}"), &epoch_secs().to_string())
            .await?;
        // The status flip is the linearization point: it is CASed
        // against the snapshot this value was read at, so of two
        // concurrent claimers exactly one lands it.
        let dir = self.dir.set("status", InsStatus::Claimed.as_str()).await?;
        info!(instance = self.id, %host, "instance claimed");
        let mut ins = self.with_dir(dir);
        ins.status = InsStatus::Claimed;
        ins.ip = host.to_string();
        Ok(ins)
    }

    /// Give the claim back: `claimed` → `pending`, claim leaf removed.
    pub async fn unclaim(&self, host: &str) -> Result<Instance> {
        self.expect_status(InsStatus::Claimed)?;
        self.verify_claimer(host).await?;
        self.dir.del(&format!("claims/{host}")).await?;
        let dir = self.dir.set("status", InsStatus::Pending.as_str()).await?;
        info!(instance = self.id, %host, "instance unclaimed");
        let mut ins = self.with_dir(dir);
        ins.status = InsStatus::Pending;
        ins.ip = String::new();
        Ok(ins)
    }

    /// Record the started process: writes the `start` ticket, then
    /// flips `claimed` → `running`. Both writes surface on the event
    /// stream; consumers treat the pair as idempotent.
    pub async fn started(
        &self,
        host: &str,
        hostname: &str,
        port: u16,
        telemetry_port: u16,
    ) -> Result<Instance> {
        self.expect_status(InsStatus::Claimed)?;
        self.verify_claimer(host).await?;
        let start = format!("{host} {port} {telemetry_port} {hostname}");
        self.dir.set("start", &start).await?;
        let dir = self.dir.set("status", InsStatus::Running.as_str()).await?;
        info!(instance = self.id, %host, %hostname, port, "instance started");
        let mut ins = self.with_dir(dir);
        ins.status = InsStatus::Running;
        ins.ip = host.to_string();
        ins.hostname = hostname.to_string();
        ins.port = port;
        ins.telemetry_port = telemetry_port;
        Ok(ins)
    }

    /// `running` → `exited`: the process ended on its own terms.
    pub async fn exited(&self, host: &str) -> Result<Instance> {
        self.expect_status(InsStatus::Running)?;
        self.verify_claimer(host).await?;
        let dir = self.dir.set("status", InsStatus::Exited.as_str()).await?;
        info!(instance = self.id, %host, "instance exited");
        let mut ins = self.with_dir(dir);
        ins.status = InsStatus::Exited;
        Ok(ins)
    }

    /// `running` → `failed`, recording the reason.
    pub async fn failed(&self, host: &str, reason: &str) -> Result<Instance> {
        self.expect_status(InsStatus::Running)?;
        self.verify_claimer(host).await?;
        self.dir.set("reason", reason).await?;
        let dir = self.dir.set("status", InsStatus::Failed.as_str()).await?;
        info!(instance = self.id, %host, %reason, "instance failed");
        let mut ins = self.with_dir(dir);
        ins.status = InsStatus::Failed;
        ins.reason = Some(reason.to_string());
        Ok(ins)
    }

    /// Any non-done state → `lost`. No claimer check: this is driven
    /// by external liveness watchers, not the claiming host.
    pub async fn lost(&self, source: &str, reason: &str) -> Result<Instance> {
        if self.status == InsStatus::Done {
            return Err(Error::InvalidState {
                id: self.id,
                status: self.status.as_str(),
                expected: "any state but done",
            });
        }
        let reason = format!("{source}: {reason}");
        self.dir.set("reason", &reason).await?;
        let dir = self.dir.set("status", InsStatus::Lost.as_str()).await?;
        info!(instance = self.id, %source, "instance lost");
        let mut ins = self.with_dir(dir);
        ins.status = InsStatus::Lost;
        ins.reason = Some(reason);
        Ok(ins)
    }

    /// File the stop ticket, directing the claiming host to bring the
    /// process down. Conflicts if a ticket is already present.
    pub async fn stop(&self) -> Result<Instance> {
        self.expect_status(InsStatus::Running)?;
        if self.dir.exists_file("stop").await? {
            return Err(Error::InvalidState {
                id: self.id,
                status: "stopping",
                expected: InsStatus::Running.as_str(),
            });
        }
        let dir = self.dir.set("stop", &epoch_secs().to_string()).await?;
        info!(instance = self.id, "stop ticket filed");
        Ok(self.with_dir(dir))
    }

    /// Mark the record done and sweep it: done index written, reverse
    /// index removed first, the `/instances/<id>/` subtree second.
    ///
    /// Partial failure leaves the record visible to the next reader;
    /// calling again is safe — already-removed leaves are skipped.
    pub async fn unregister(&self, source: &str, reason: &str) -> Result<()> {
        let dir = self.dir.set("status", InsStatus::Done.as_str()).await?;

        let done_entry = format!(
            "{}/{}",
            proc_done_path(&self.app_name, &self.proc_name)?,
            self.id
        );
        let snapshot = dir.snapshot().set(&done_entry, &self.registered_body()).await?;

        let index_entry = format!(
            "{}/{}",
            proc_instances_path(&self.app_name, &self.proc_name)?,
            self.id
        );
        let snapshot = match snapshot.del(&index_entry).await {
            Ok(s) => s,
            Err(e) if e.is_not_found() => snapshot,
            Err(e) => return Err(e.into()),
        };

        snapshot.del_rec(&self.dir.name).await?;
        info!(instance = self.id, %source, %reason, "instance unregistered");
        Ok(())
    }
}

/// Allocate an id and write a fresh instance record: identity tuple,
/// reverse index, `status=pending`.
pub(crate) async fn register_instance(
    app: &str,
    rev: &str,
    proc: &str,
    env: &str,
    snapshot: Snapshot,
) -> Result<Instance> {
    for name in [app, rev, proc, env] {
        check_name(name)?;
    }
    let index = proc_instances_path(app, proc)?;

    let (id, snapshot) = next_instance_id(snapshot).await?;
    let dir = Dir::new(snapshot, instance_path(id));

    let body = format!("{app} {rev} {proc} {env}");
    let dir = dir.set(REGISTERED, &body).await?;
    let snapshot = dir.snapshot().set(&format!("{index}/{id}"), "").await?;
    let dir = dir.at(snapshot).set("status", InsStatus::Pending.as_str()).await?;

    info!(instance = id, %app, %rev, %proc, %env, "instance registered");
    Ok(Instance {
        id,
        app_name: app.to_string(),
        rev_name: rev.to_string(),
        proc_name: proc.to_string(),
        env_name: env.to_string(),
        status: InsStatus::Pending,
        ip: String::new(),
        port: 0,
        telemetry_port: 0,
        hostname: String::new(),
        reason: None,
        dir,
    })
}

/// Bump the monotonic sequence file under `/instances/`. Losing the
/// compare-and-set just means another registration got that id; take
/// the next one.
async fn next_instance_id(snapshot: Snapshot) -> Result<(i64, Snapshot)> {
    let mut snapshot = snapshot.fast_forward().await?;
    loop {
        let last: i64 = match snapshot.get(INSTANCE_SEQ_PATH).await {
            Ok(body) => body.parse().map_err(|_| Error::BadRecord {
                path: INSTANCE_SEQ_PATH.to_string(),
                detail: format!("unparseable sequence value {body:?}"),
            })?,
            Err(StoreError::KeyNotFound(_)) => 0,
            Err(e) => return Err(e.into()),
        };
        let next = last + 1;
        match snapshot.set(INSTANCE_SEQ_PATH, &next.to_string()).await {
            Ok(s) => return Ok((next, s)),
            Err(e) if e.is_conflict() => snapshot = snapshot.fast_forward().await?,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Load an instance at a snapshot. A missing `status` file reads as
/// `pending`: registration writes the identity tuple first.
pub(crate) async fn get_instance(id: i64, snapshot: Snapshot) -> Result<Instance> {
    let dir = Dir::new(snapshot, instance_path(id));

    let registered = match dir.get(REGISTERED).await {
        Ok(body) => body,
        Err(StoreError::KeyNotFound(_)) => return Err(Error::InstanceNotFound(id)),
        Err(e) => return Err(e.into()),
    };
    let (app, rev, proc, env) = parse_registered(&dir, &registered)?;

    let status = match dir.get("status").await {
        Ok(body) => body.parse().map_err(|_| Error::BadRecord {
            path: dir.file("status"),
            detail: format!("unknown status {body:?}"),
        })?,
        Err(StoreError::KeyNotFound(_)) => InsStatus::Pending,
        Err(e) => return Err(e.into()),
    };

    let mut ins = Instance {
        id,
        app_name: app,
        rev_name: rev,
        proc_name: proc,
        env_name: env,
        status,
        ip: String::new(),
        port: 0,
        telemetry_port: 0,
        hostname: String::new(),
        reason: None,
        dir,
    };

    match ins.dir.get("start").await {
        Ok(body) => parse_start(&mut ins, &body)?,
        Err(StoreError::KeyNotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }
    match ins.dir.get("reason").await {
        Ok(body) => ins.reason = Some(body),
        Err(StoreError::KeyNotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    Ok(ins)
}

/// Rebuild a swept instance from its done-index entry.
pub(crate) fn from_done_record(id: i64, body: &str, snapshot: Snapshot) -> Result<Instance> {
    let dir = Dir::new(snapshot, instance_path(id));
    let (app, rev, proc, env) = parse_registered(&dir, body)?;
    Ok(Instance {
        id,
        app_name: app,
        rev_name: rev,
        proc_name: proc,
        env_name: env,
        status: InsStatus::Done,
        ip: String::new(),
        port: 0,
        telemetry_port: 0,
        hostname: String::new(),
        reason: None,
        dir,
    })
}

fn parse_registered(dir: &Dir, body: &str) -> Result<(String, String, String, String)> {
    let fields: Vec<&str> = body.split_whitespace().collect();
    let &[app, rev, proc, env] = fields.as_slice() else {
        return Err(Error::BadRecord {
            path: dir.file(REGISTERED),
            detail: format!("expected \"app rev proc env\", got {body:?}"),
        });
    };
    Ok((
        app.to_string(),
        rev.to_string(),
        proc.to_string(),
        env.to_string(),
    ))
}

fn parse_start(ins: &mut Instance, body: &str) -> Result<()> {
    let path = ins.dir.file("start");
    let fields: Vec<&str> = body.split_whitespace().collect();
    if let Some(ip) = fields.first() {
        ins.ip = ip.to_string();
    }
    if let Some(port) = fields.get(1) {
        ins.port = port.parse().map_err(|_| Error::BadRecord {
            path: path.clone(),
            detail: format!("unparseable port {port:?}"),
        })?;
    }
    if let Some(tport) = fields.get(2) {
        ins.telemetry_port = tport.parse().map_err(|_| Error::BadRecord {
            path: path.clone(),
            detail: format!("unparseable telemetry port {tport:?}"),
        })?;
    }
    if let Some(hostname) = fields.get(3) {
        ins.hostname = hostname.to_string();
    }
    Ok(())
}

//! Path codec — the one authoritative mapping between domain
//! identities and store paths.
//!
//! Writers build paths through the functions here; the watcher
//! classifies raw mutations through [`classify`], which is driven by
//! the same single pattern table. Keeping both sides on one table is
//! what prevents writer/reader drift.

use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Character class of the general name grammar. Underscores are
/// deliberately not part of it.
pub const CHAR_PAT: &str = "[0-9A-Za-z.-]";

pub const APPS_PATH: &str = "/apps";
pub const INSTANCES_PATH: &str = "/instances";
pub const SERVICES_PATH: &str = "/services";

/// The `registered` leaf is the single source of truth for "this
/// entity exists".
pub const REGISTERED: &str = "registered";

/// Sequence file instance ids are allocated from.
pub const INSTANCE_SEQ_PATH: &str = "/instances/seq";

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("^{CHAR_PAT}+$")).unwrap())
}

fn proc_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[0-9A-Za-z]+$").unwrap())
}

/// Check a name against the general grammar (apps, revisions,
/// services, envs).
pub fn check_name(name: &str) -> Result<()> {
    if name_re().is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

/// Check a proc type name: strictly alphanumeric.
pub fn check_proc_name(name: &str) -> Result<()> {
    if proc_name_re().is_match(name) {
        Ok(())
    } else {
        Err(Error::BadProcName(name.to_string()))
    }
}

pub fn app_path(app: &str) -> Result<String> {
    check_name(app)?;
    Ok(format!("{APPS_PATH}/{app}"))
}

pub fn rev_path(app: &str, rev: &str) -> Result<String> {
    check_name(rev)?;
    Ok(format!("{}/revs/{rev}", app_path(app)?))
}

/// Proc paths accept the general grammar: instances may reference proc
/// names that would fail the stricter registration check.
pub fn proc_path(app: &str, proc: &str) -> Result<String> {
    check_name(proc)?;
    Ok(format!("{}/procs/{proc}", app_path(app)?))
}

/// Reverse index of an instance under its proc.
pub fn proc_instances_path(app: &str, proc: &str) -> Result<String> {
    Ok(format!("{}/instances", proc_path(app, proc)?))
}

/// Index of instances that reached `done` and had their record swept.
pub fn proc_done_path(app: &str, proc: &str) -> Result<String> {
    Ok(format!("{}/done", proc_path(app, proc)?))
}

pub fn instance_path(id: i64) -> String {
    format!("{INSTANCES_PATH}/{id}")
}

pub fn service_path(service: &str) -> Result<String> {
    check_name(service)?;
    Ok(format!("{SERVICES_PATH}/{service}"))
}

/// Stable, URL-safe endpoint id: `1.2.3.4`,1000 → `1-2-3-4-1000`.
pub fn endpoint_id(addr: &IpAddr, port: u16) -> String {
    let addr = addr.to_string().replace(['.', ':'], "-");
    format!("{addr}-{port}")
}

pub fn endpoint_path(service: &str, id: &str) -> Result<String> {
    Ok(format!("{}/endpoints/{id}", service_path(service)?))
}

// ── Classification ─────────────────────────────────────────────────

/// What a mutated path refers to. Classification is combined with the
/// mutation kind (and sometimes the body) to produce an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    AppRegistered,
    RevRegistered,
    ProcRegistered,
    ProcAttrs,
    InstanceRegistered,
    InstanceStatus,
    InstanceStart,
    InstanceStop,
    ServiceRegistered,
    EndpointRegistered,
}

fn pattern_table() -> &'static [(Regex, PathKind)] {
    static TABLE: OnceLock<Vec<(Regex, PathKind)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let table = [
            (format!("^/apps/({CHAR_PAT}+)/registered$"), PathKind::AppRegistered),
            (
                format!("^/apps/({CHAR_PAT}+)/revs/({CHAR_PAT}+)/registered$"),
                PathKind::RevRegistered,
            ),
            (
                format!("^/apps/({CHAR_PAT}+)/procs/({CHAR_PAT}+)/registered$"),
                PathKind::ProcRegistered,
            ),
            (
                format!("^/apps/({CHAR_PAT}+)/procs/({CHAR_PAT}+)/attrs$"),
                PathKind::ProcAttrs,
            ),
            ("^/instances/([0-9]+)/registered$".to_string(), PathKind::InstanceRegistered),
            ("^/instances/([0-9]+)/status$".to_string(), PathKind::InstanceStatus),
            ("^/instances/([0-9]+)/start$".to_string(), PathKind::InstanceStart),
            ("^/instances/([0-9]+)/stop$".to_string(), PathKind::InstanceStop),
            (
                format!("^/services/({CHAR_PAT}+)/registered$"),
                PathKind::ServiceRegistered,
            ),
            (
                format!("^/services/({CHAR_PAT}+)/endpoints/({CHAR_PAT}+)/registered$"),
                PathKind::EndpointRegistered,
            ),
        ];
        table
            .into_iter()
            .map(|(pat, kind)| (Regex::new(&pat).unwrap(), kind))
            .collect()
    })
}

/// Classify a root-relative path. Returns the kind and the captured
/// identity segments, outermost first.
pub fn classify(path: &str) -> Option<(PathKind, Vec<String>)> {
    for (re, kind) in pattern_table() {
        if let Some(caps) = re.captures(path) {
            let ids = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str().to_string())
                .collect();
            return Some((*kind, ids));
        }
    }
    None
}

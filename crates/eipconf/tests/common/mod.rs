//! Common test utilities for integration tests.
//!
//! Provides `FakeHost`, an in-memory interface table that speaks enough of
//! FreeBSD's `ifconfig` to drive the reconciler, and `FakeResolver` for
//! canned hostname answers.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::io;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eipconf::exec::{CommandOutput, CommandRunner, Executor, RetryPolicy};
use eipconf::fetch::{DocumentSource, Fetcher};
use eipconf::ifconfig::Ifconfig;
use eipconf::notify::{Notifier, NotifyLevel};
use eipconf::resolve::HostResolver;
use tempfile::NamedTempFile;

/// Parse an address literal.
pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// One interface of the fake host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Iface {
    pub tunnel: Option<(IpAddr, IpAddr)>,
    pub description: String,
    pub members: Vec<String>,
    pub vlan: Option<(u16, String)>,
    pub addrs: Vec<IpAddr>,
    pub mtu: Option<u32>,
    pub up: bool,
    pub link0: bool,
}

impl Iface {
    fn render(&self, name: &str, out: &mut String) {
        let flags = if self.up { "8051<UP,RUNNING>" } else { "8010<MULTICAST>" };
        let _ = writeln!(out, "{}: flags={} metric 0 mtu {}", name, flags, self.mtu.unwrap_or(1280));
        if !self.description.is_empty() {
            let _ = writeln!(out, "\tdescription: {}", self.description);
        }
        if let Some((src, dst)) = self.tunnel {
            let family = if src.is_ipv6() { "inet6" } else { "inet" };
            let _ = writeln!(out, "\ttunnel {} {} --> {}", family, src, dst);
        }
        for addr in &self.addrs {
            let family = if addr.is_ipv6() { "inet6" } else { "inet" };
            let _ = writeln!(out, "\t{} {} netmask 0xffffff00", family, addr);
        }
        for member in &self.members {
            let _ = writeln!(out, "\tmember: {} flags=143<LEARNING,DISCOVER,AUTOEDGE,AUTOPTP>", member);
        }
        if let Some((tag, parent)) = &self.vlan {
            let _ = writeln!(
                out,
                "\tvlan: {} vlanproto: 802.1q vlanpcp: 0 parent interface: {}",
                tag, parent
            );
        }
    }
}

#[derive(Debug, Default)]
struct HostState {
    interfaces: BTreeMap<String, Iface>,
    mutations: Vec<String>,
    queries: Vec<String>,
    failing: HashSet<String>,
    lingering: HashSet<String>,
    vanishing: HashSet<String>,
    list_failures: usize,
}

/// In-memory host answering `ifconfig` invocations.
///
/// Clones share the same table, so a test keeps one handle while the
/// reconciler owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interface with an address, like a physical NIC.
    pub fn nic(self, name: &str, addrs: &[&str]) -> Self {
        self.insert(
            name,
            Iface {
                addrs: addrs.iter().map(|a| ip(a)).collect(),
                mtu: Some(1500),
                up: true,
                ..Default::default()
            },
        )
    }

    /// Add a configured tunnel interface.
    pub fn tunnel(self, name: &str, src: &str, dst: &str, description: &str) -> Self {
        self.insert(
            name,
            Iface {
                tunnel: Some((ip(src), ip(dst))),
                description: description.to_string(),
                mtu: Some(1500),
                up: true,
                link0: true,
                ..Default::default()
            },
        )
    }

    /// Add a bridge with members.
    pub fn bridge(self, name: &str, members: &[&str]) -> Self {
        self.insert(
            name,
            Iface {
                members: members.iter().map(|m| m.to_string()).collect(),
                mtu: Some(1500),
                up: true,
                ..Default::default()
            },
        )
    }

    /// Add a VLAN interface.
    pub fn vlan(self, name: &str, tag: u16, parent: &str) -> Self {
        self.insert(
            name,
            Iface {
                vlan: Some((tag, parent.to_string())),
                mtu: Some(1500),
                up: true,
                ..Default::default()
            },
        )
    }

    pub fn insert(self, name: &str, iface: Iface) -> Self {
        self.state
            .lock()
            .unwrap()
            .interfaces
            .insert(name.to_string(), iface);
        self
    }

    /// Make the exact command line (without the program) fail.
    pub fn fail_on(&self, command: &str) {
        self.state.lock().unwrap().failing.insert(command.to_string());
    }

    /// Make `destroy` of `name` succeed without removing the interface.
    pub fn linger(&self, name: &str) {
        self.state.lock().unwrap().lingering.insert(name.to_string());
    }

    /// Remove `name` right after the next listing, as if destroyed
    /// concurrently.
    pub fn vanish_after_listing(&self, name: &str) {
        self.state.lock().unwrap().vanishing.insert(name.to_string());
    }

    /// Make the next `count` listings fail.
    pub fn fail_listings(&self, count: usize) {
        self.state.lock().unwrap().list_failures = count;
    }

    pub fn iface(&self, name: &str) -> Option<Iface> {
        self.state.lock().unwrap().interfaces.get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().interfaces.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.state.lock().unwrap().interfaces.keys().cloned().collect()
    }

    /// Mutating command lines issued so far, without the program name.
    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    /// Read-only command lines issued so far.
    pub fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.state.lock().unwrap();
        state.mutations.clear();
        state.queries.clear();
    }

    fn query(state: &mut HostState, args: &[String]) -> CommandOutput {
        state.queries.push(args.join(" "));
        let mut out = String::new();

        if args[0] == "-a" {
            if state.list_failures > 0 {
                state.list_failures -= 1;
                return CommandOutput::failed("ifconfig: socket: Resource temporarily unavailable");
            }
            for (name, iface) in &state.interfaces {
                iface.render(name, &mut out);
            }
            for name in std::mem::take(&mut state.vanishing) {
                state.interfaces.remove(&name);
            }
            return CommandOutput::ok(out);
        }

        match state.interfaces.get(&args[0]) {
            Some(iface) => {
                iface.render(&args[0], &mut out);
                CommandOutput::ok(out)
            }
            None => CommandOutput::failed(format!("ifconfig: interface {} does not exist", args[0])),
        }
    }

    fn mutate(state: &mut HostState, args: &[String]) -> CommandOutput {
        let line = args.join(" ");
        state.mutations.push(line.clone());
        if state.failing.contains(&line) {
            return CommandOutput::failed(format!("ifconfig: {}: Operation not permitted", args[0]));
        }

        let name = args[0].clone();
        if args[1] == "create" {
            if state.interfaces.contains_key(&name) {
                return CommandOutput::failed(format!(
                    "ifconfig: SIOCIFCREATE2 ({}): File exists",
                    name
                ));
            }
            state.interfaces.insert(name, Iface::default());
            return CommandOutput::ok("");
        }

        if args[1] == "destroy" {
            if !state.interfaces.contains_key(&name) {
                return CommandOutput::failed(format!("ifconfig: interface {} does not exist", name));
            }
            if !state.lingering.contains(&name) {
                state.interfaces.remove(&name);
                for iface in state.interfaces.values_mut() {
                    iface.members.retain(|m| *m != name);
                }
            }
            return CommandOutput::ok("");
        }

        let Some(iface) = state.interfaces.get_mut(&name) else {
            return CommandOutput::failed(format!("ifconfig: interface {} does not exist", name));
        };

        let rest: Vec<&str> = args[1..].iter().map(String::as_str).collect();
        match rest.as_slice() {
            ["tunnel", src, dst] | ["inet6", "tunnel", src, dst] => {
                iface.tunnel = Some((ip(src), ip(dst)));
            }
            ["link0"] => iface.link0 = true,
            ["up"] => iface.up = true,
            ["mtu", mtu] => iface.mtu = mtu.parse().ok(),
            ["description", text] => iface.description = text.trim().to_string(),
            ["-description"] => iface.description.clear(),
            ["vlan", tag, "vlandev", parent, "up"] => {
                iface.vlan = tag.parse().ok().map(|t| (t, parent.to_string()));
                iface.up = true;
            }
            ["addm", member] => iface.members.push(member.to_string()),
            _ => return CommandOutput::failed(format!("ifconfig: bad command: {}", line)),
        }
        CommandOutput::ok("")
    }
}

impl CommandRunner for FakeHost {
    async fn run(&self, _program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        if args.len() == 1 {
            Ok(Self::query(&mut state, args))
        } else {
            Ok(Self::mutate(&mut state, args))
        }
    }
}

/// An `ifconfig` handle over `host` with a single attempt per command.
pub fn ifconfig(host: &FakeHost) -> Ifconfig<FakeHost> {
    Ifconfig::new(
        Executor::new(host.clone(), RetryPolicy::new(1, Duration::ZERO)),
        "ifconfig",
    )
}

/// Canned hostname answers that count lookups.
#[derive(Debug, Clone, Default)]
pub struct FakeResolver {
    answers: Arc<Mutex<HashMap<String, Result<Vec<IpAddr>, String>>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, host: &str, addrs: &[&str]) -> Self {
        self.answers
            .lock()
            .unwrap()
            .insert(host.to_string(), Ok(addrs.iter().map(|a| ip(a)).collect()));
        self
    }

    pub fn fail(self, host: &str) -> Self {
        self.answers
            .lock()
            .unwrap()
            .insert(host.to_string(), Err("Name does not resolve".to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HostResolver for FakeResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answers.lock().unwrap().get(host) {
            Some(Ok(addrs)) => Ok(addrs.clone()),
            Some(Err(e)) => Err(io::Error::other(e.clone())),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "unknown host")),
        }
    }
}

/// Notifier that keeps every message.
#[derive(Debug, Clone, Default)]
pub struct Captured {
    messages: Arc<Mutex<Vec<(NotifyLevel, String)>>>,
}

impl Captured {
    pub fn messages(&self) -> Vec<(NotifyLevel, String)> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for Captured {
    fn emit(&self, level: NotifyLevel, message: &str, _fields: &[(String, String)]) {
        self.messages
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }
}

/// A desired-state document on disk.
pub struct Document {
    file: NamedTempFile,
}

impl Document {
    pub fn new(entries: serde_json::Value) -> Self {
        let file = NamedTempFile::new().unwrap();
        let doc = Self { file };
        doc.replace(entries);
        doc
    }

    /// Overwrite the document in place.
    pub fn replace(&self, entries: serde_json::Value) {
        std::fs::write(self.file.path(), entries.to_string()).unwrap();
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn fetcher(&self) -> Fetcher {
        Fetcher::new(DocumentSource::Path(self.path().to_path_buf())).unwrap()
    }
}

/// Parse a JSON array into document entries.
pub fn entries(value: serde_json::Value) -> Vec<serde_json::Value> {
    match value {
        serde_json::Value::Array(entries) => entries,
        other => panic!("expected an array, got {}", other),
    }
}

//! The `ifconfig` actuation interface.
//!
//! Every change to interface state is expressed as an [`IfconfigOp`] and
//! run through the retrying [`Executor`]. Queries (`ifconfig -a`,
//! `ifconfig <name>`) run once and are parsed by [`parse`].

pub mod parse;

use std::fmt;
use std::net::IpAddr;

use crate::error::Result;
use crate::exec::{CommandRunner, Executor};

/// MTU applied to newly created tunnel and bridge interfaces.
pub const DEFAULT_MTU: u32 = 1500;

/// A single mutating `ifconfig` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfconfigOp {
    /// `<name> create`
    Create { name: String },
    /// `<name> destroy`
    Destroy { name: String },
    /// `<name> [inet6] tunnel <src> <dst>`
    Tunnel {
        name: String,
        src: IpAddr,
        dst: IpAddr,
        ipv6: bool,
    },
    /// `<name> link0`
    Link0 { name: String },
    /// `<name> up`
    Up { name: String },
    /// `<name> mtu <mtu>`
    Mtu { name: String, mtu: u32 },
    /// `<name> description <text>`
    Description { name: String, text: String },
    /// `<name> -description`
    ClearDescription { name: String },
    /// `<name> vlan <tag> vlandev <parent> up`
    Vlan {
        name: String,
        tag: u16,
        parent: String,
    },
    /// `<bridge> addm <member>`
    AddMember { bridge: String, member: String },
}

impl IfconfigOp {
    /// The interface this operation acts on.
    pub fn interface(&self) -> &str {
        match self {
            Self::Create { name }
            | Self::Destroy { name }
            | Self::Tunnel { name, .. }
            | Self::Link0 { name }
            | Self::Up { name }
            | Self::Mtu { name, .. }
            | Self::Description { name, .. }
            | Self::ClearDescription { name }
            | Self::Vlan { name, .. } => name,
            Self::AddMember { bridge, .. } => bridge,
        }
    }

    /// Command-line arguments for `ifconfig`.
    pub fn args(&self) -> Vec<String> {
        let name = self.interface().to_string();
        match self {
            Self::Create { .. } => vec![name, "create".into()],
            Self::Destroy { .. } => vec![name, "destroy".into()],
            Self::Tunnel { src, dst, ipv6, .. } => {
                let mut args = vec![name];
                if *ipv6 {
                    args.push("inet6".into());
                }
                args.extend(["tunnel".into(), src.to_string(), dst.to_string()]);
                args
            }
            Self::Link0 { .. } => vec![name, "link0".into()],
            Self::Up { .. } => vec![name, "up".into()],
            Self::Mtu { mtu, .. } => vec![name, "mtu".into(), mtu.to_string()],
            Self::Description { text, .. } => vec![name, "description".into(), text.clone()],
            Self::ClearDescription { .. } => vec![name, "-description".into()],
            Self::Vlan { tag, parent, .. } => vec![
                name,
                "vlan".into(),
                tag.to_string(),
                "vlandev".into(),
                parent.clone(),
                "up".into(),
            ],
            Self::AddMember { member, .. } => vec![name, "addm".into(), member.clone()],
        }
    }
}

impl fmt::Display for IfconfigOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create { name } => write!(f, "create {}", name),
            Self::Destroy { name } => write!(f, "destroy {}", name),
            Self::Tunnel { name, src, dst, .. } => {
                write!(f, "set tunnel {} {} -> {}", name, src, dst)
            }
            Self::Link0 { name } => write!(f, "set link0 on {}", name),
            Self::Up { name } => write!(f, "bring up {}", name),
            Self::Mtu { name, mtu } => write!(f, "set mtu {} on {}", mtu, name),
            Self::Description { name, text } => {
                write!(f, "set description {:?} on {}", text, name)
            }
            Self::ClearDescription { name } => write!(f, "clear description on {}", name),
            Self::Vlan { name, tag, parent } => {
                write!(f, "configure vlan {} (tag {} on {})", name, tag, parent)
            }
            Self::AddMember { bridge, member } => write!(f, "add {} to {}", member, bridge),
        }
    }
}

/// Handle on the `ifconfig` tool.
#[derive(Debug, Clone)]
pub struct Ifconfig<R> {
    exec: Executor<R>,
    program: String,
}

impl<R: CommandRunner> Ifconfig<R> {
    /// Create a handle that runs `program` (usually `ifconfig`).
    pub fn new(exec: Executor<R>, program: impl Into<String>) -> Self {
        Self {
            exec,
            program: program.into(),
        }
    }

    /// Get the underlying executor.
    pub fn executor(&self) -> &Executor<R> {
        &self.exec
    }

    /// Run one mutating operation under the retry policy.
    pub async fn apply(&self, op: &IfconfigOp) -> Result<()> {
        self.exec.run(&self.program, &op.args()).await?;
        Ok(())
    }

    /// `ifconfig -a`
    pub async fn list(&self) -> Result<String> {
        self.exec.query(&self.program, &["-a".to_string()]).await
    }

    /// `ifconfig <name>`
    pub async fn describe(&self, name: &str) -> Result<String> {
        self.exec.query(&self.program, &[name.to_string()]).await
    }
}

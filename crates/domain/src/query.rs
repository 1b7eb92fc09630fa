use crate::{AbiVersion, BackendError};

/// A lookup request received from the peer.
///
/// The set of populated fields follows the negotiated ABI version. Reading
/// `local_ip` or `edns_subnet` from a query whose version does not carry them
/// is a caller bug and returns [`BackendError::FieldUnavailable`] instead of
/// an empty default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    abi_version: AbiVersion,
    command: String,
    name: String,
    qtype: String,
    qclass: String,
    id: i64,
    remote_ip: String,
    local_ip: Option<String>,
    edns_subnet: Option<String>,
}

impl Query {
    /// Builds an ABI version 1 query.
    pub fn new(
        command: impl Into<String>,
        name: impl Into<String>,
        qtype: impl Into<String>,
        qclass: impl Into<String>,
        id: i64,
        remote_ip: impl Into<String>,
    ) -> Self {
        Self {
            abi_version: AbiVersion::V1,
            command: command.into(),
            name: name.into(),
            qtype: qtype.into(),
            qclass: qclass.into(),
            id,
            remote_ip: remote_ip.into(),
            local_ip: None,
            edns_subnet: None,
        }
    }

    /// Upgrades to ABI version 2 (or keeps version 3) with the given local ip.
    pub fn with_local_ip(mut self, local_ip: impl Into<String>) -> Self {
        self.local_ip = Some(local_ip.into());
        if self.abi_version < AbiVersion::V2 {
            self.abi_version = AbiVersion::V2;
        }
        self
    }

    /// Upgrades to ABI version 3.
    pub fn with_edns_subnet(
        mut self,
        local_ip: impl Into<String>,
        edns_subnet: impl Into<String>,
    ) -> Self {
        self.local_ip = Some(local_ip.into());
        self.edns_subnet = Some(edns_subnet.into());
        self.abi_version = AbiVersion::V3;
        self
    }

    pub fn abi_version(&self) -> AbiVersion {
        self.abi_version
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qtype(&self) -> &str {
        &self.qtype
    }

    pub fn qclass(&self) -> &str {
        &self.qclass
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn remote_ip(&self) -> &str {
        &self.remote_ip
    }

    pub fn local_ip(&self) -> Result<&str, BackendError> {
        self.local_ip
            .as_deref()
            .ok_or(BackendError::FieldUnavailable {
                field: "local_ip",
                version: self.abi_version,
            })
    }

    pub fn edns_subnet(&self) -> Result<&str, BackendError> {
        self.edns_subnet
            .as_deref()
            .ok_or(BackendError::FieldUnavailable {
                field: "edns_subnet",
                version: self.abi_version,
            })
    }
}

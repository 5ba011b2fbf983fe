//! # Deployment Model
//!
//! Plain data types shared by every layer: field elements and the strongly typed
//! hashes built on them, the declarative [`ComponentSpec`], and the persisted
//! [`DeploymentRecord`].
//!
//! A `ComponentSpec` says *what* a contract needs, never *when* to deploy it.
//! Ordering is derived by the [`resolver`](crate::resolver) from `depends_on`.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Longest string that fits a Cairo short string.
pub const SHORT_STRING_MAX_LEN: usize = 31;

/// Errors raised while building a [`Felt`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeltError {
    #[error("not a hex felt: {0}")]
    InvalidHex(String),
    #[error("hex felt out of range: {0}")]
    TooLarge(String),
    #[error("short string longer than {SHORT_STRING_MAX_LEN} bytes: {0}")]
    ShortStringTooLong(String),
    #[error("short string is not ASCII: {0}")]
    ShortStringNotAscii(String),
}

/// A field element rendered as normalized lowercase hex (`0x` prefix, no leading zeros).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Felt(String);

impl Felt {
    pub fn zero() -> Self {
        Self("0x0".to_string())
    }

    /// Parses a `0x`-prefixed (or bare) hex string.
    pub fn from_hex(raw: &str) -> Result<Self, FeltError> {
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(FeltError::InvalidHex(raw.to_string()));
        }
        let trimmed = digits.trim_start_matches('0').to_ascii_lowercase();
        if trimmed.is_empty() {
            return Ok(Self::zero());
        }
        // Values are kept below 2^251.
        let too_large = trimmed.len() > 63
            || (trimmed.len() == 63 && trimmed.as_bytes()[0] > b'7');
        if too_large {
            return Err(FeltError::TooLarge(raw.to_string()));
        }
        Ok(Self(format!("0x{trimmed}")))
    }

    /// Cairo short-string encoding: the ASCII bytes read as a big-endian integer.
    pub fn from_short_string(text: &str) -> Result<Self, FeltError> {
        if !text.is_ascii() {
            return Err(FeltError::ShortStringNotAscii(text.to_string()));
        }
        if text.len() > SHORT_STRING_MAX_LEN {
            return Err(FeltError::ShortStringTooLong(text.to_string()));
        }
        if text.is_empty() {
            return Ok(Self::zero());
        }
        let hex: String = text.bytes().map(|b| format!("{b:02x}")).collect();
        Self::from_hex(&hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Felt {
    type Error = FeltError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Felt> for String {
    fn from(felt: Felt) -> Self {
        felt.0
    }
}

macro_rules! felt_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Felt);

        impl $name {
            pub fn from_hex(raw: &str) -> Result<Self, FeltError> {
                Felt::from_hex(raw).map(Self)
            }

            pub fn felt(&self) -> &Felt {
                &self.0
            }
        }

        impl From<Felt> for $name {
            fn from(felt: Felt) -> Self {
                Self(felt)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                Display::fmt(&self.0, f)
            }
        }
    };
}

felt_newtype!(
    /// Address of a deployed contract or an account.
    Address
);
felt_newtype!(
    /// Content-derived identifier of declared program code.
    ClassHash
);
felt_newtype!(
    /// Hash of a submitted transaction.
    TxHash
);

/// Locator for a compiled contract (its name in the build output, e.g. `RoleStore`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(pub String);

impl ArtifactRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a component ends with a deployed instance or only a declared class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentKind {
    #[default]
    Deploy,
    /// Declared for its class hash (e.g. a token template instantiated by a factory).
    DeclareOnly,
}

/// The value bound to one constructor parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructorArg {
    Literal(Felt),
    ShortString(String),
    /// Address of another component; must be listed in `depends_on`.
    AddressOf(String),
    /// Class hash of another component; must be listed in `depends_on`.
    ClassHashOf(String),
    /// Address of the account signing the deployment.
    Deployer,
}

impl ConstructorArg {
    /// Component this argument refers to, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::AddressOf(name) | Self::ClassHashOf(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorParam {
    pub name: String,
    pub value: ConstructorArg,
}

/// Declarative description of one contract in the bring-up.
///
/// Built with a small fluent API; every `address_arg`/`class_hash_arg` also records
/// the referenced component in `depends_on`, so the template and the graph cannot
/// drift apart.
///
/// ```
/// use deploy_orchestrator::model::{ComponentSpec, ConstructorArg};
///
/// let data_store = ComponentSpec::deploy("DataStore")
///     .address_arg("role_store_address", "RoleStore");
///
/// assert_eq!(data_store.depends_on, vec!["RoleStore".to_string()]);
/// assert_eq!(
///     data_store.constructor[0].value,
///     ConstructorArg::AddressOf("RoleStore".into())
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSpec {
    pub name: String,
    pub artifact: ArtifactRef,
    pub kind: ComponentKind,
    pub depends_on: Vec<String>,
    pub constructor: Vec<ConstructorParam>,
}

impl ComponentSpec {
    /// A component that is declared and deployed. The artifact defaults to the name.
    pub fn deploy(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            artifact: ArtifactRef::new(name.clone()),
            name,
            kind: ComponentKind::Deploy,
            depends_on: Vec::new(),
            constructor: Vec::new(),
        }
    }

    /// A component that is only declared.
    pub fn declare_only(name: impl Into<String>) -> Self {
        Self {
            kind: ComponentKind::DeclareOnly,
            ..Self::deploy(name)
        }
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = ArtifactRef::new(artifact);
        self
    }

    /// Adds an ordering dependency without a constructor input.
    pub fn after(mut self, component: impl Into<String>) -> Self {
        let component = component.into();
        if !self.depends_on.contains(&component) {
            self.depends_on.push(component);
        }
        self
    }

    pub fn address_arg(self, param: impl Into<String>, component: impl Into<String>) -> Self {
        let component = component.into();
        self.after(component.clone())
            .arg(param, ConstructorArg::AddressOf(component))
    }

    pub fn class_hash_arg(self, param: impl Into<String>, component: impl Into<String>) -> Self {
        let component = component.into();
        self.after(component.clone())
            .arg(param, ConstructorArg::ClassHashOf(component))
    }

    pub fn deployer_arg(self, param: impl Into<String>) -> Self {
        self.arg(param, ConstructorArg::Deployer)
    }

    pub fn literal_arg(self, param: impl Into<String>, value: Felt) -> Self {
        self.arg(param, ConstructorArg::Literal(value))
    }

    pub fn short_string_arg(self, param: impl Into<String>, value: impl Into<String>) -> Self {
        self.arg(param, ConstructorArg::ShortString(value.into()))
    }

    pub fn arg(mut self, param: impl Into<String>, value: ConstructorArg) -> Self {
        self.constructor.push(ConstructorParam {
            name: param.into(),
            value,
        });
        self
    }
}

/// The full, statically known set of components, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentSet {
    specs: Vec<ComponentSpec>,
}

impl ComponentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, spec: ComponentSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn push(&mut self, spec: ComponentSpec) {
        self.specs.push(spec);
    }

    pub fn get(&self, name: &str) -> Option<&ComponentSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentSpec> {
        self.specs.iter()
    }

    pub fn specs(&self) -> &[ComponentSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl FromIterator<ComponentSpec> for ComponentSet {
    fn from_iter<I: IntoIterator<Item = ComponentSpec>>(iter: I) -> Self {
        Self {
            specs: iter.into_iter().collect(),
        }
    }
}

/// Lifecycle position of a component as last recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeploymentStatus {
    #[default]
    Pending,
    Declared,
    Deployed,
    Failed,
}

impl Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "Pending",
            Self::Declared => "Declared",
            Self::Deployed => "Deployed",
            Self::Failed => "Failed",
        };
        f.pad(label)
    }
}

/// A resolved constructor input as it was submitted on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorInput {
    pub name: String,
    pub value: Felt,
}

/// A deployment transaction that was submitted but never seen final.
///
/// Kept on the record so a later run waits on `tx` instead of deploying again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeploy {
    pub tx: TxHash,
    pub address: Address,
}

/// One entry of the persisted state file.
///
/// Files written by older tooling only carry `name` and `address`; such entries
/// load as `Deployed` (see [`DeploymentRecord::normalized`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_hash: Option<ClassHash>,
    #[serde(default)]
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constructor: Vec<ConstructorInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_deploy: Option<PendingDeploy>,
}

impl DeploymentRecord {
    pub fn declared(name: impl Into<String>, class_hash: ClassHash) -> Self {
        Self {
            name: name.into(),
            address: None,
            class_hash: Some(class_hash),
            status: DeploymentStatus::Declared,
            constructor: Vec::new(),
            pending_deploy: None,
        }
    }

    pub fn deployed(
        name: impl Into<String>,
        address: Address,
        class_hash: ClassHash,
        constructor: Vec<ConstructorInput>,
    ) -> Self {
        Self {
            name: name.into(),
            address: Some(address),
            class_hash: Some(class_hash),
            status: DeploymentStatus::Deployed,
            constructor,
            pending_deploy: None,
        }
    }

    /// A failed attempt. Keeps the class hash so a retry skips the declare step.
    pub fn failed(name: impl Into<String>, class_hash: Option<ClassHash>) -> Self {
        Self {
            name: name.into(),
            address: None,
            class_hash,
            status: DeploymentStatus::Failed,
            constructor: Vec::new(),
            pending_deploy: None,
        }
    }

    pub fn with_pending(mut self, pending: Option<PendingDeploy>) -> Self {
        self.pending_deploy = pending;
        self
    }

    pub fn is_deployed(&self) -> bool {
        self.status == DeploymentStatus::Deployed && self.address.is_some()
    }

    /// Whether this record fulfils a component of the given kind.
    pub fn satisfies(&self, kind: ComponentKind) -> bool {
        match kind {
            ComponentKind::Deploy => self.is_deployed(),
            ComponentKind::DeclareOnly => {
                self.class_hash.is_some()
                    && matches!(
                        self.status,
                        DeploymentStatus::Declared | DeploymentStatus::Deployed
                    )
            }
        }
    }

    /// Upgrades legacy `{name, address}` entries to `Deployed`.
    pub fn normalized(mut self) -> Self {
        if self.status == DeploymentStatus::Pending && self.address.is_some() {
            self.status = DeploymentStatus::Deployed;
        }
        self
    }

    pub fn input(&self, param: &str) -> Option<&Felt> {
        self.constructor
            .iter()
            .find(|i| i.name == param)
            .map(|i| &i.value)
    }
}

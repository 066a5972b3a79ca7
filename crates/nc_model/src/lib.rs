//! Shared data types for the NETCONF client core: the tagged RPC/reply
//! variants, datastore and filter vocabulary, and the structured
//! `rpc-error` record, independent of transport and schema concerns.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";
pub const NOTIFICATION_NS: &str = "urn:ietf:params:xml:ns:netconf:notification:1.0";
pub const MONITORING_NS: &str = "urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring";

/// A NETCONF datastore or inline/url source used by `source`/`target` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Datastore {
    Running,
    Startup,
    Candidate,
    /// Inline `<config>` content rather than a named store.
    ConfigInline(String),
    Url(String),
}

impl Datastore {
    pub fn store_element(&self) -> Option<&'static str> {
        match self {
            Datastore::Running => Some("running"),
            Datastore::Startup => Some("startup"),
            Datastore::Candidate => Some("candidate"),
            Datastore::ConfigInline(_) | Datastore::Url(_) => None,
        }
    }
}

/// `with-defaults` mode, RFC 6243.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WdMode {
    All,
    AllTag,
    Trim,
    Explicit,
}

impl WdMode {
    pub fn wire_value(self) -> &'static str {
        match self {
            WdMode::All => "report-all",
            WdMode::AllTag => "report-all-tagged",
            WdMode::Trim => "trim",
            WdMode::Explicit => "explicit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultOperation {
    Merge,
    Replace,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestOption {
    TestThenSet,
    Set,
    TestOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorOption {
    StopOnError,
    ContinueOnError,
    RollbackOnError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GetSchemaFormat {
    Yang,
    Yin,
}

/// A value beginning with `<` is a subtree filter; anything else is
/// treated as an XPath expression (§3, Capability/filter discrimination).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    Subtree(String),
    XPath(String),
}

impl Filter {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.trim_start().starts_with('<') {
            Filter::Subtree(raw)
        } else {
            Filter::XPath(raw)
        }
    }
}

/// The discriminated set of NETCONF operations this core can build and send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rpc {
    Generic(String),
    GetConfig {
        source: Datastore,
        filter: Option<Filter>,
        wd_mode: Option<WdMode>,
    },
    Get {
        filter: Option<Filter>,
        wd_mode: Option<WdMode>,
    },
    EditConfig {
        target: Datastore,
        default_op: Option<DefaultOperation>,
        test_opt: Option<TestOption>,
        error_opt: Option<ErrorOption>,
        edit_content: String,
    },
    Copy {
        target: Datastore,
        source: Datastore,
        wd_mode: Option<WdMode>,
    },
    Delete {
        target: Datastore,
    },
    Lock {
        target: Datastore,
    },
    Unlock {
        target: Datastore,
    },
    Kill {
        session_id: u64,
    },
    Commit {
        confirmed: bool,
        timeout: Option<u32>,
        persist: Option<String>,
        persist_id: Option<String>,
    },
    Discard,
    Cancel {
        persist_id: Option<String>,
    },
    Validate {
        source: Datastore,
    },
    GetSchema {
        identifier: String,
        version: Option<String>,
        format: Option<GetSchemaFormat>,
    },
    Subscribe {
        stream: Option<String>,
        filter: Option<Filter>,
        start: Option<String>,
        stop: Option<String>,
    },
}

impl Rpc {
    /// Human-readable operation name, used in log fields and error diagnostics.
    pub fn operation_name(&self) -> &'static str {
        match self {
            Rpc::Generic(_) => "generic",
            Rpc::GetConfig { .. } => "get-config",
            Rpc::Get { .. } => "get",
            Rpc::EditConfig { .. } => "edit-config",
            Rpc::Copy { .. } => "copy-config",
            Rpc::Delete { .. } => "delete-config",
            Rpc::Lock { .. } => "lock",
            Rpc::Unlock { .. } => "unlock",
            Rpc::Kill { .. } => "kill-session",
            Rpc::Commit { .. } => "commit",
            Rpc::Discard => "discard-changes",
            Rpc::Cancel { .. } => "cancel-commit",
            Rpc::Validate { .. } => "validate",
            Rpc::GetSchema { .. } => "get-schema",
            Rpc::Subscribe { .. } => "create-subscription",
        }
    }

    /// Whether this operation defines a data-bearing reply (§4.G schema
    /// selection); operations with no defined output receiving data are a
    /// classifier error.
    pub fn expects_data_reply(&self) -> bool {
        matches!(
            self,
            Rpc::GetConfig { .. } | Rpc::Get { .. } | Rpc::GetSchema { .. } | Rpc::Generic(_)
        )
    }
}

/// RFC 6241 Appendix A `error-tag` enumeration (plus the RFC 6243 additions
/// libnetconf2 carries) used to classify structured `rpc-error` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    TooBig,
    MissingAttribute,
    BadAttribute,
    UnknownAttribute,
    MissingElement,
    BadElement,
    UnknownElement,
    UnknownNamespace,
    AccessDenied,
    LockDenied,
    ResourceDenied,
    RollbackFailed,
    DataExists,
    DataMissing,
    OperationNotSupported,
    OperationFailed,
    PartialOperation,
    MalformedMessage,
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_value())
    }
}

impl ErrorTag {
    pub fn wire_value(self) -> &'static str {
        match self {
            ErrorTag::InUse => "in-use",
            ErrorTag::InvalidValue => "invalid-value",
            ErrorTag::TooBig => "too-big",
            ErrorTag::MissingAttribute => "missing-attribute",
            ErrorTag::BadAttribute => "bad-attribute",
            ErrorTag::UnknownAttribute => "unknown-attribute",
            ErrorTag::MissingElement => "missing-element",
            ErrorTag::BadElement => "bad-element",
            ErrorTag::UnknownElement => "unknown-element",
            ErrorTag::UnknownNamespace => "unknown-namespace",
            ErrorTag::AccessDenied => "access-denied",
            ErrorTag::LockDenied => "lock-denied",
            ErrorTag::ResourceDenied => "resource-denied",
            ErrorTag::RollbackFailed => "rollback-failed",
            ErrorTag::DataExists => "data-exists",
            ErrorTag::DataMissing => "data-missing",
            ErrorTag::OperationNotSupported => "operation-not-supported",
            ErrorTag::OperationFailed => "operation-failed",
            ErrorTag::PartialOperation => "partial-operation",
            ErrorTag::MalformedMessage => "malformed-message",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        Some(match value {
            "in-use" => ErrorTag::InUse,
            "invalid-value" => ErrorTag::InvalidValue,
            "too-big" => ErrorTag::TooBig,
            "missing-attribute" => ErrorTag::MissingAttribute,
            "bad-attribute" => ErrorTag::BadAttribute,
            "unknown-attribute" => ErrorTag::UnknownAttribute,
            "missing-element" => ErrorTag::MissingElement,
            "bad-element" => ErrorTag::BadElement,
            "unknown-element" => ErrorTag::UnknownElement,
            "unknown-namespace" => ErrorTag::UnknownNamespace,
            "access-denied" => ErrorTag::AccessDenied,
            "lock-denied" => ErrorTag::LockDenied,
            "resource-denied" => ErrorTag::ResourceDenied,
            "rollback-failed" => ErrorTag::RollbackFailed,
            "data-exists" => ErrorTag::DataExists,
            "data-missing" => ErrorTag::DataMissing,
            "operation-not-supported" => ErrorTag::OperationNotSupported,
            "operation-failed" => ErrorTag::OperationFailed,
            "partial-operation" => ErrorTag::PartialOperation,
            "malformed-message" => ErrorTag::MalformedMessage,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorType {
    Transport,
    Rpc,
    Protocol,
    Application,
}

impl ErrorType {
    pub fn from_wire(value: &str) -> Option<Self> {
        Some(match value {
            "transport" => ErrorType::Transport,
            "rpc" => ErrorType::Rpc,
            "protocol" => ErrorType::Protocol,
            "application" => ErrorType::Application,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Error,
    Warning,
}

impl ErrorSeverity {
    pub fn from_wire(value: &str) -> Option<Self> {
        Some(match value {
            "error" => ErrorSeverity::Error,
            "warning" => ErrorSeverity::Warning,
            _ => return None,
        })
    }
}

/// One `<rpc-error>` element, fully decomposed. String fields are plain
/// owned `String`s here; the production dictionary-interning the distilled
/// spec describes lives in the schema context (§3, "interned in the context
/// dictionary") and is applied when a record is attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ErrorRecord {
    pub error_type: Option<ErrorType>,
    pub tag: Option<ErrorTag>,
    pub severity: Option<ErrorSeverity>,
    pub app_tag: Option<String>,
    pub path: Option<String>,
    pub message: Option<String>,
    pub message_lang: Option<String>,
    pub session_id: Option<String>,
    pub bad_attr: Vec<String>,
    pub bad_element: Vec<String>,
    pub bad_namespace: Vec<String>,
    /// Unknown `error-info` children, preserved verbatim as raw XML.
    pub other_info: Vec<String>,
}

/// A data reply's root content, tagged with the schema node it was parsed
/// under (§4.G). The core keeps the content as raw, well-formed XML: fully
/// typed data-tree decoding is the YANG library's job and stays out of scope
/// (§1 Out of scope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTree {
    pub schema_node: String,
    pub xml: String,
}

/// The classified result of a reply. A successful NETCONF `rpc-error` is
/// NOT a transport error: it is this variant (§7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Ok,
    Error(Vec<ErrorRecord>),
    Data(DataTree),
}

/// A capability URI advertised in `<hello>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability(pub String);

impl Capability {
    pub const BASE_PREFIX: &'static str = "urn:ietf:params:netconf:";

    pub fn is_base(&self) -> bool {
        self.0.starts_with(Self::BASE_PREFIX)
    }

    /// Parses `module=<name>[&revision=YYYY-MM-DD][&features=f1,f2,…][&deviations=…]`
    /// out of the query string of a YANG-module capability URI. Returns
    /// `None` for base capabilities or malformed URIs (no `module=` field).
    pub fn module_request(&self) -> Option<ModuleRequest> {
        let query = self.0.split_once('?').map(|(_, q)| q)?;
        let mut module = None;
        let mut revision = None;
        let mut features = Vec::new();
        let mut deviations = Vec::new();
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=')?;
            match key {
                "module" => module = Some(value.to_string()),
                "revision" => revision = Some(value.to_string()),
                "features" => features = value.split(',').map(str::to_string).collect(),
                "deviations" => deviations = value.split(',').map(str::to_string).collect(),
                _ => {}
            }
        }
        Some(ModuleRequest {
            name: module?,
            revision,
            features,
            deviations,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRequest {
    pub name: String,
    pub revision: Option<String>,
    pub features: Vec<String>,
    pub deviations: Vec<String>,
}

/// Session lifecycle state (§3 Lifecycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Starting,
    Running,
    Closing,
    Invalid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_discriminates_subtree_vs_xpath() {
        assert_eq!(
            Filter::from_raw("<top xmlns='u'/>"),
            Filter::Subtree("<top xmlns='u'/>".to_string())
        );
        assert_eq!(
            Filter::from_raw("/t:top"),
            Filter::XPath("/t:top".to_string())
        );
    }

    #[test]
    fn capability_module_request_parses_query_fields() {
        let cap = Capability(
            "http://x.example/yang/foo?module=foo&revision=2020-01-01&features=a,b".to_string(),
        );
        let req = cap.module_request().unwrap();
        assert_eq!(req.name, "foo");
        assert_eq!(req.revision.as_deref(), Some("2020-01-01"));
        assert_eq!(req.features, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn base_capability_has_no_module_request() {
        let cap = Capability("urn:ietf:params:netconf:base:1.0".to_string());
        assert!(cap.is_base());
        assert!(cap.module_request().is_none());
    }

    #[test]
    fn error_tag_round_trips_through_wire_value() {
        for tag in [
            ErrorTag::InUse,
            ErrorTag::LockDenied,
            ErrorTag::MalformedMessage,
        ] {
            assert_eq!(ErrorTag::from_wire(tag.wire_value()), Some(tag));
        }
        assert_eq!(ErrorTag::from_wire("not-a-real-tag"), None);
    }
}

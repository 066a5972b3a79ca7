//! The schema context: the seam around the YANG library the distilled spec
//! names as an out-of-scope external collaborator (§1, §6 "Schema library").
//!
//! `SchemaContext` is the trait the core programs against; `YinDirContext`
//! is the concrete adapter backing it for this crate — modules are resolved
//! from an on-disk directory of `.yin` files (§6 "Environment / on-disk
//! state") or from a pluggable module-fetch callback the handshake resolver
//! installs to issue `<get-schema>` RPCs (§4.E). This mirrors how
//! `nauto_security::KeyringStore` wraps the OS keyring behind
//! `CredentialStore` rather than reimplementing a secret store.

use nc_model::ModuleRequest;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("module '{0}' not found in schema context")]
    NotLoaded(String),
    #[error("module '{name}' could not be loaded from {source}")]
    LoadFailed { name: String, source: String },
    #[error("feature '{feature}' is not defined by module '{module}'")]
    UnknownFeature { module: String, feature: String },
    #[error("malformed YIN module text for '{0}'")]
    MalformedYin(String),
    #[error("built RPC tree failed strict validation: {0}")]
    ValidationFailed(String),
    #[error("io error reading schema directory: {0}")]
    Io(#[from] std::io::Error),
}

/// A fetch callback: given `(name, revision)`, returns the module's YIN/YANG
/// source text. Installed by the handshake resolver to recursively issue
/// `<get-schema>` over the session under construction (§4.E, §9 reentrancy).
pub type ModuleFetchFn = Arc<dyn Fn(&str, Option<&str>) -> Result<String, SchemaError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub name: String,
    pub revision: Option<String>,
    pub features: HashSet<String>,
}

pub trait SchemaContext: Send + Sync {
    fn has_module(&self, name: &str, revision: Option<&str>) -> bool;

    /// Loads a module, trying already-loaded state, then the fetch
    /// callback (if installed), then the on-disk fallback directory.
    fn load_module(&self, req: &ModuleRequest) -> Result<(), SchemaError>;

    fn enable_feature(&self, module: &str, feature: &str) -> Result<(), SchemaError>;

    /// Installs a new fetch callback, returning whatever was previously
    /// installed so a caller can restore it afterward (§4.E.3: "temporarily
    /// restore any prior module-fetch callback, retry, restore <get-schema>
    /// callback afterward").
    fn set_module_fetch_callback(&self, cb: Option<ModuleFetchFn>) -> Option<ModuleFetchFn>;

    fn loaded_modules(&self) -> Vec<LoadedModule>;
}

/// Concrete `SchemaContext` backed by a directory of `.yin` files plus an
/// optional fetch callback. Single-process, lock-protected; the distilled
/// spec's `shared_ctx` flag (§3, §5) is expressed by wrapping this type in
/// an `Arc` and cloning that `Arc` across sessions rather than by anything
/// internal to this struct.
pub struct YinDirContext {
    schemas_dir: PathBuf,
    modules: Mutex<HashMap<String, LoadedModule>>,
    fetch_cb: Mutex<Option<ModuleFetchFn>>,
}

impl YinDirContext {
    pub fn new(schemas_dir: impl Into<PathBuf>) -> Self {
        Self {
            schemas_dir: schemas_dir.into(),
            modules: Mutex::new(HashMap::new()),
            fetch_cb: Mutex::new(None),
        }
    }

    /// Registers module text directly, bypassing both the callback and the
    /// on-disk directory. Used by tests and by the bootstrap load of
    /// `ietf-netconf` when the embedded copy is preferred over a disk read.
    pub fn preload(&self, name: &str, revision: Option<&str>, text: &str) -> Result<(), SchemaError> {
        let parsed = parse_yin(text)?;
        if parsed.name != name {
            return Err(SchemaError::MalformedYin(name.to_string()));
        }
        let mut modules = self.modules.lock().expect("schema context lock poisoned");
        modules.insert(
            name.to_string(),
            LoadedModule {
                name: name.to_string(),
                revision: revision.map(str::to_string).or(parsed.revision),
                features: HashSet::new(),
            },
        );
        Ok(())
    }

    fn load_from_disk(&self, name: &str) -> Result<String, SchemaError> {
        let path = self.schemas_dir.join(format!("{name}.yin"));
        fs::read_to_string(&path).map_err(|err| SchemaError::LoadFailed {
            name: name.to_string(),
            source: format!("{}: {err}", path.display()),
        })
    }

    fn fetch_callback(&self) -> Option<ModuleFetchFn> {
        self.fetch_cb.lock().expect("fetch callback lock poisoned").clone()
    }
}

impl SchemaContext for YinDirContext {
    fn has_module(&self, name: &str, revision: Option<&str>) -> bool {
        let modules = self.modules.lock().expect("schema context lock poisoned");
        match modules.get(name) {
            Some(m) => revision.is_none() || m.revision.as_deref() == revision,
            None => false,
        }
    }

    fn load_module(&self, req: &ModuleRequest) -> Result<(), SchemaError> {
        if self.has_module(&req.name, req.revision.as_deref()) {
            return Ok(());
        }

        // The callback, if any, recursively drives `send_rpc`/`recv_reply`
        // on the owning session (§9 reentrancy) — it MUST be invoked
        // without holding `self.modules`, so the lookup above is cloned out
        // before we get here.
        let text = if let Some(cb) = self.fetch_callback() {
            debug!(target: "schema", module = %req.name, "fetching via get-schema callback");
            cb(&req.name, req.revision.as_deref())
        } else {
            Err(SchemaError::LoadFailed {
                name: req.name.clone(),
                source: "no fetch callback installed".to_string(),
            })
        }
        .or_else(|_| self.load_from_disk(&req.name))?;

        let parsed = parse_yin(&text)?;
        if parsed.name != req.name {
            return Err(SchemaError::MalformedYin(req.name.clone()));
        }

        let mut modules = self.modules.lock().expect("schema context lock poisoned");
        modules.insert(
            req.name.clone(),
            LoadedModule {
                name: req.name.clone(),
                revision: req.revision.clone().or(parsed.revision),
                features: HashSet::new(),
            },
        );
        Ok(())
    }

    fn enable_feature(&self, module: &str, feature: &str) -> Result<(), SchemaError> {
        let mut modules = self.modules.lock().expect("schema context lock poisoned");
        let entry = modules
            .get_mut(module)
            .ok_or_else(|| SchemaError::NotLoaded(module.to_string()))?;
        entry.features.insert(feature.to_string());
        Ok(())
    }

    fn set_module_fetch_callback(&self, cb: Option<ModuleFetchFn>) -> Option<ModuleFetchFn> {
        let mut slot = self.fetch_cb.lock().expect("fetch callback lock poisoned");
        std::mem::replace(&mut *slot, cb)
    }

    fn loaded_modules(&self) -> Vec<LoadedModule> {
        self.modules
            .lock()
            .expect("schema context lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

struct ParsedYin {
    name: String,
    revision: Option<String>,
}

/// Extracts `name` and the latest `revision` date from a `.yin` module
/// document. This is intentionally shallow — type resolution, `import`/
/// `include` processing, and constraint validation belong to the real YANG
/// library this crate stands in for (§1 Out of scope).
fn parse_yin(text: &str) -> Result<ParsedYin, SchemaError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut name = None;
    let mut revision = None;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) => {
                let local = tag.local_name();
                let local = std::str::from_utf8(local.as_ref()).unwrap_or_default();
                if local == "module" && name.is_none() {
                    for attr in tag.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"name" {
                            name = Some(String::from_utf8_lossy(&attr.value).into_owned());
                        }
                    }
                } else if local == "revision" && revision.is_none() {
                    for attr in tag.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"date" {
                            revision = Some(String::from_utf8_lossy(&attr.value).into_owned());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                warn!(target: "schema", "yin parse error: {err}");
                return Err(SchemaError::MalformedYin(format!("{err}")));
            }
            _ => {}
        }
        buf.clear();
    }
    name.map(|name| ParsedYin { name, revision })
        .ok_or_else(|| SchemaError::MalformedYin("missing <module name=...>".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yin(name: &str, revision: &str) -> String {
        format!(
            r#"<module name="{name}" xmlns="urn:ietf:params:xml:ns:yang:yin:1">
  <revision date="{revision}"/>
</module>"#
        )
    }

    #[test]
    fn preload_and_has_module() {
        let ctx = YinDirContext::new("/nonexistent");
        ctx.preload("ietf-netconf", Some("2011-06-01"), &yin("ietf-netconf", "2011-06-01"))
            .unwrap();
        assert!(ctx.has_module("ietf-netconf", Some("2011-06-01")));
        assert!(!ctx.has_module("ietf-netconf", Some("1999-01-01")));
    }

    #[test]
    fn load_module_falls_back_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foo.yin"), yin("foo", "2020-01-01")).unwrap();
        let ctx = YinDirContext::new(dir.path());
        let req = ModuleRequest {
            name: "foo".to_string(),
            revision: None,
            features: vec!["a".to_string()],
            deviations: vec![],
        };
        ctx.load_module(&req).unwrap();
        assert!(ctx.has_module("foo", Some("2020-01-01")));
    }

    #[test]
    fn load_module_prefers_callback_over_disk() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = YinDirContext::new(dir.path());
        let text = yin("foo", "2021-05-05");
        ctx.set_module_fetch_callback(Some(Arc::new(move |_name, _rev| Ok(text.clone()))));
        let req = ModuleRequest {
            name: "foo".to_string(),
            revision: None,
            features: vec![],
            deviations: vec![],
        };
        ctx.load_module(&req).unwrap();
        assert!(ctx.has_module("foo", Some("2021-05-05")));
    }

    #[test]
    fn enable_feature_requires_loaded_module() {
        let ctx = YinDirContext::new("/nonexistent");
        assert!(matches!(
            ctx.enable_feature("ietf-netconf", "candidate"),
            Err(SchemaError::NotLoaded(_))
        ));
        ctx.preload("ietf-netconf", None, &yin("ietf-netconf", "2011-06-01"))
            .unwrap();
        ctx.enable_feature("ietf-netconf", "candidate").unwrap();
        let modules = ctx.loaded_modules();
        assert!(modules[0].features.contains("candidate"));
    }

    #[test]
    fn set_module_fetch_callback_returns_previous() {
        let ctx = YinDirContext::new("/nonexistent");
        let first: ModuleFetchFn = Arc::new(|_n, _r| Err(SchemaError::NotLoaded("x".into())));
        let previous = ctx.set_module_fetch_callback(Some(first));
        assert!(previous.is_none());
        let second: ModuleFetchFn = Arc::new(|_n, _r| Err(SchemaError::NotLoaded("y".into())));
        let previous = ctx.set_module_fetch_callback(Some(second));
        assert!(previous.is_some());
    }
}

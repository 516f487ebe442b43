pub mod builtin;
pub mod scan;
pub mod unit;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::interpolate;
use crate::registry::builtin::{BuiltinUnit, ValueStore};
use crate::registry::scan::{descriptors_from_unit, scan_plugin_source};
use crate::registry::unit::{ToolDescriptor, ToolUnit};

/// Project-relative directory holding plugin unit sources.
pub const PLUGINS_SUBDIR: &str = "tests/agent/plugins";

const CLEANUP_TIMEOUT_SECS: u64 = 5;

type UnitFactory = Box<dyn Fn() -> Result<Arc<dyn ToolUnit>> + Send + Sync>;

struct UnitEntry {
    unit: Option<Arc<dyn ToolUnit>>,
    /// Descriptors under their qualified wire names.
    tools: Vec<ToolDescriptor>,
}

struct ToolBinding {
    method: String,
    descriptor: ToolDescriptor,
    target: Arc<dyn ToolUnit>,
}

/// Catalog row for prompts and operator listings. Units that never
/// loaded still appear, with `live = false` and scanned signatures.
#[derive(Debug, Clone, Serialize)]
pub struct UnitCatalogEntry {
    pub unit: String,
    pub live: bool,
    pub tools: Vec<ToolDescriptor>,
}

/// Assembles a [`ToolRegistry`]: built-ins, natively registered unit
/// factories, and source discovery under `tests/agent/plugins/`.
pub struct RegistryBuilder {
    store: ValueStore,
    with_builtins: bool,
    factories: Vec<(String, UnitFactory)>,
    discover_root: Option<PathBuf>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        RegistryBuilder::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> RegistryBuilder {
        RegistryBuilder {
            store: ValueStore::new(),
            with_builtins: true,
            factories: Vec::new(),
            discover_root: None,
        }
    }

    pub fn without_builtins(mut self) -> RegistryBuilder {
        self.with_builtins = false;
        self
    }

    /// Registers a native unit factory. Construction runs at `build()`
    /// and may fail; a failed unit degrades to scanned signatures when a
    /// matching plugin source exists.
    pub fn register<F>(mut self, unit_name: &str, factory: F) -> RegistryBuilder
    where
        F: Fn() -> Result<Arc<dyn ToolUnit>> + Send + Sync + 'static,
    {
        self.factories
            .push((unit_name.to_string(), Box::new(factory)));
        self
    }

    /// Enables plugin-source discovery under `root`.
    pub fn discover(mut self, root: &Path) -> RegistryBuilder {
        self.discover_root = Some(root.to_path_buf());
        self
    }

    /// Builds the registry. Per-unit failures are warnings, never an
    /// abort: a bad plugin must not take the whole tool surface down.
    pub fn build(self) -> ToolRegistry {
        let mut registry = ToolRegistry {
            store: self.store.clone(),
            units: BTreeMap::new(),
            tools: BTreeMap::new(),
            reserved: BTreeSet::new(),
            shutdown_done: AtomicBool::new(false),
        };

        if self.with_builtins {
            let unit: Arc<dyn ToolUnit> = Arc::new(BuiltinUnit::new(self.store.clone()));
            registry.add_live_unit(unit, false);
        }

        let mut factories: BTreeMap<String, UnitFactory> = self.factories.into_iter().collect();

        if let Some(root) = &self.discover_root {
            for path in plugin_sources(&root.join(PLUGINS_SUBDIR)) {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                let decls = match scan_plugin_source(&path) {
                    Ok(decls) => decls,
                    Err(e) => {
                        eprintln!("WARN: skipping plugin source {}: {:#}", path.display(), e);
                        continue;
                    }
                };
                for decl in decls {
                    let unit_name = decl.unit_name(&stem);
                    match factories.remove(&unit_name) {
                        Some(factory) => match factory() {
                            Ok(unit) => registry.add_live_unit(unit, true),
                            Err(e) => {
                                eprintln!(
                                    "WARN: unit '{}' failed to load: {:#}; using declared signatures",
                                    unit_name, e
                                );
                                registry.add_declared_unit(&unit_name, descriptors_from_unit(&decl));
                            }
                        },
                        None => {
                            registry.add_declared_unit(&unit_name, descriptors_from_unit(&decl));
                        }
                    }
                }
            }
        }

        for (unit_name, factory) in factories {
            match factory() {
                Ok(unit) => registry.add_live_unit(unit, true),
                Err(e) => eprintln!("WARN: unit '{}' failed to load: {:#}", unit_name, e),
            }
        }

        registry
    }
}

/// The run-scoped tool surface: qualified `<unit>_<method>` names mapped
/// to live units, plus signature-only entries recovered from source.
pub struct ToolRegistry {
    store: ValueStore,
    units: BTreeMap<String, UnitEntry>,
    tools: BTreeMap<String, ToolBinding>,
    reserved: BTreeSet<String>,
    shutdown_done: AtomicBool,
}

impl ToolRegistry {
    /// Standard registry for a project: built-ins plus whatever plugin
    /// sources live under the project's plugin directory.
    pub fn for_project(project_root: &Path) -> ToolRegistry {
        RegistryBuilder::new().discover(project_root).build()
    }

    fn add_live_unit(&mut self, unit: Arc<dyn ToolUnit>, qualify: bool) {
        let unit_name = unit.name().to_string();
        if self.units.contains_key(&unit_name) {
            eprintln!("WARN: duplicate unit '{}' ignored", unit_name);
            return;
        }
        let mut cataloged = Vec::new();
        for mut descriptor in unit.tools() {
            let method = descriptor.name.clone();
            let wire_name = if qualify {
                format!("{}_{}", unit_name, method)
            } else {
                method.clone()
            };
            descriptor.name = wire_name.clone();
            if self.tools.contains_key(&wire_name) {
                eprintln!("WARN: duplicate tool '{}' ignored", wire_name);
                continue;
            }
            self.tools.insert(
                wire_name,
                ToolBinding {
                    method,
                    descriptor: descriptor.clone(),
                    target: Arc::clone(&unit),
                },
            );
            cataloged.push(descriptor);
        }
        self.units.insert(
            unit_name.clone(),
            UnitEntry {
                unit: Some(unit),
                tools: cataloged,
            },
        );
        self.reserved.insert(unit_name);
    }

    fn add_declared_unit(&mut self, unit_name: &str, descriptors: Vec<ToolDescriptor>) {
        if self.units.contains_key(unit_name) {
            eprintln!("WARN: duplicate unit '{}' ignored", unit_name);
            return;
        }
        let cataloged: Vec<ToolDescriptor> = descriptors
            .into_iter()
            .map(|mut d| {
                d.name = format!("{}_{}", unit_name, d.name);
                d
            })
            .collect();
        self.units.insert(
            unit_name.to_string(),
            UnitEntry {
                unit: None,
                tools: cataloged,
            },
        );
        self.reserved.insert(unit_name.to_string());
    }

    /// Every unit in deterministic order, live or signatures-only.
    pub fn catalog(&self) -> Vec<UnitCatalogEntry> {
        self.units
            .iter()
            .map(|(name, entry)| UnitCatalogEntry {
                unit: name.clone(),
                live: entry.unit.is_some(),
                tools: entry.tools.clone(),
            })
            .collect()
    }

    /// Callable tools under their wire names, for `tools/list`.
    pub fn wire_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|b| b.descriptor.clone()).collect()
    }

    pub fn reserved_names(&self) -> &BTreeSet<String> {
        &self.reserved
    }

    pub fn value_store(&self) -> &ValueStore {
        &self.store
    }

    /// Dispatches a tool call. Accepts the qualified wire name or a bare
    /// method name; string arguments are interpolated against the run's
    /// `${stored.*}` context first.
    pub async fn call_tool(&self, name: &str, args: Map<String, Value>) -> Result<Value> {
        let mut context = Map::new();
        context.insert(
            "stored".to_string(),
            Value::Object(self.store.snapshot()),
        );
        let args = interpolate::interpolate_args(&args, &context);

        if let Some(binding) = self.tools.get(name) {
            return binding.target.call(&binding.method, args).await;
        }
        for binding in self.tools.values() {
            if binding.method == name {
                return binding.target.call(&binding.method, args).await;
            }
        }
        bail!("unknown tool '{}'", name)
    }

    /// Releases unit resources, once, no matter how many exit paths race
    /// to call it. Each unit gets a bounded cleanup window; a slow unit
    /// is a warning, not a hang.
    pub async fn shutdown(&self) {
        if self.shutdown_done.swap(true, Ordering::SeqCst) {
            return;
        }
        for (name, entry) in &self.units {
            let Some(unit) = &entry.unit else { continue };
            let window = Duration::from_secs(CLEANUP_TIMEOUT_SECS);
            if tokio::time::timeout(window, unit.cleanup()).await.is_err() {
                eprintln!(
                    "WARN: cleanup of unit '{}' timed out after {}s",
                    name, CLEANUP_TIMEOUT_SECS
                );
            }
        }
    }
}

fn plugin_sources(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return out,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e == "rs").unwrap_or(false) {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            if !stem.starts_with('_') {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

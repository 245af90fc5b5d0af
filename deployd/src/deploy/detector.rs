//! Runtime detector
//!
//! Classifies a working tree by running a prioritized list of pure predicates over a
//! [`TreeProbe`] (the manifest's dependency names plus the marker files present). The
//! first framework rule that matches wins; backend-as-a-service rules are evaluated
//! independently. Adding a framework means adding a rule, nothing else changes.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};

use crate::errors::EngineError;
use crate::models::project::{BackendService, Framework};

/// Subdirectories searched for a frontend when the root has none
pub const FRONTEND_DIRS: &[&str] = &[
    "frontend",
    "client",
    "web",
    "app",
    "packages/frontend",
    "packages/client",
];

/// Subdirectories searched for a backend service when the root has none
pub const BACKEND_DIRS: &[&str] = &["backend", "server", "api", "packages/backend"];

const MARKERS: &[&str] = &[
    "svelte.config.js",
    "next.config.js",
    "next.config.mjs",
    "nuxt.config.js",
    "nuxt.config.ts",
    "angular.json",
    "pocketbase",
    "firebase.json",
    "supabase",
];

pub const DEFAULT_NODE_VERSION: &str = "20";

/// What a directory looks like, as far as detection cares
#[derive(Debug, Default, Clone)]
pub struct TreeProbe {
    dependencies: HashSet<String>,
    markers: HashSet<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    dependencies: serde_json::Map<String, Value>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: serde_json::Map<String, Value>,
}

impl TreeProbe {
    pub fn new<'a>(
        dependencies: impl IntoIterator<Item = &'a str>,
        markers: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            dependencies: dependencies.into_iter().map(str::to_string).collect(),
            markers: markers.into_iter().map(str::to_string).collect(),
        }
    }

    /// Probe a directory. An unreadable manifest is reported and treated as absent.
    pub async fn scan(dir: &Path) -> (Self, Option<EngineError>) {
        let mut probe = TreeProbe::default();
        let mut manifest_error = None;

        match read_manifest(dir).await {
            Ok(Some(manifest)) => {
                probe.dependencies = manifest
                    .dependencies
                    .keys()
                    .chain(manifest.dev_dependencies.keys())
                    .cloned()
                    .collect();
            }
            Ok(None) => {}
            Err(e) => {
                warn!("{}", e);
                manifest_error = Some(e);
            }
        }

        for marker in MARKERS {
            if fs::metadata(dir.join(marker)).await.is_ok() {
                probe.markers.insert(marker.to_string());
            }
        }

        (probe, manifest_error)
    }

    pub fn has_dep(&self, name: &str) -> bool {
        self.dependencies.contains(name)
    }

    pub fn has_marker(&self, name: &str) -> bool {
        self.markers.contains(name)
    }
}

async fn read_manifest(dir: &Path) -> Result<Option<Manifest>, EngineError> {
    let path = dir.join("package.json");
    if fs::metadata(&path).await.is_err() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&path)
        .await
        .map_err(|e| EngineError::DetectionError(format!("{}: {}", path.display(), e)))?;
    let manifest = serde_json::from_str(&contents)
        .map_err(|e| EngineError::DetectionError(format!("{}: {}", path.display(), e)))?;
    Ok(Some(manifest))
}

type Rule<T> = (T, fn(&TreeProbe) -> bool);

/// Framework rules in priority order; manifest rules come before marker rules
pub const FRAMEWORK_RULES: &[Rule<Framework>] = &[
    (Framework::SvelteKit, |p| p.has_dep("@sveltejs/kit") || p.has_dep("svelte")),
    (Framework::NextJs, |p| p.has_dep("next")),
    (Framework::Nuxt, |p| p.has_dep("nuxt")),
    (Framework::React, |p| p.has_dep("react")),
    (Framework::Vue, |p| p.has_dep("vue")),
    (Framework::Angular, |p| p.has_dep("@angular/core")),
    (Framework::SvelteKit, |p| p.has_marker("svelte.config.js")),
    (Framework::NextJs, |p| {
        p.has_marker("next.config.js") || p.has_marker("next.config.mjs")
    }),
    (Framework::Nuxt, |p| {
        p.has_marker("nuxt.config.js") || p.has_marker("nuxt.config.ts")
    }),
    (Framework::Angular, |p| p.has_marker("angular.json")),
];

pub const BACKEND_RULES: &[Rule<BackendService>] = &[
    (BackendService::PocketBase, |p| p.has_dep("pocketbase")),
    (BackendService::Supabase, |p| p.has_dep("@supabase/supabase-js")),
    (BackendService::Firebase, |p| p.has_dep("firebase")),
    (BackendService::Appwrite, |p| p.has_dep("appwrite")),
    (BackendService::PocketBase, |p| p.has_marker("pocketbase")),
    (BackendService::Firebase, |p| p.has_marker("firebase.json")),
    (BackendService::Supabase, |p| p.has_marker("supabase")),
];

fn first_match<T: Copy>(rules: &[Rule<T>], probe: &TreeProbe) -> Option<T> {
    rules.iter().find(|(_, matches)| matches(probe)).map(|(kind, _)| *kind)
}

pub fn classify_framework(probe: &TreeProbe) -> Option<Framework> {
    first_match(FRAMEWORK_RULES, probe)
}

pub fn classify_backend(probe: &TreeProbe) -> Option<BackendService> {
    first_match(BACKEND_RULES, probe)
}

/// Build and run defaults of a framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkDefaults {
    pub build_command: &'static str,
    pub install_command: &'static str,
    pub output_dir: &'static str,
    pub start_command: &'static str,
    pub dev_command: &'static str,
    pub port: u16,
}

pub fn framework_defaults(framework: Framework) -> FrameworkDefaults {
    let (build_command, output_dir, start_command, dev_command, port) = match framework {
        Framework::SvelteKit => ("npm run build", "build", "node build", "npm run dev", 3000),
        Framework::NextJs => ("npm run build", ".next", "npm start", "npm run dev", 3000),
        Framework::Nuxt => (
            "npm run build",
            ".output",
            "node .output/server/index.mjs",
            "npm run dev",
            3000,
        ),
        Framework::React | Framework::Vue => {
            ("npm run build", "dist", "npm run preview", "npm run dev", 5173)
        }
        Framework::Angular => ("ng build", "dist", "npm start", "ng serve", 4200),
        Framework::Generic => ("npm run build", "dist", "npm start", "npm run dev", 3000),
    };

    FrameworkDefaults {
        build_command,
        install_command: "npm install",
        output_dir,
        start_command,
        dev_command,
        port,
    }
}

pub fn backend_default_port(service: Option<BackendService>) -> u16 {
    match service {
        Some(BackendService::PocketBase) => 8090,
        Some(BackendService::Supabase) => 54321,
        Some(BackendService::Firebase) => 9099,
        Some(BackendService::Appwrite) => 80,
        None => 8080,
    }
}

/// Outcome of inspecting a working tree
#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    pub framework: Option<Framework>,
    /// Subdirectory the framework was found in, empty for the root
    pub framework_dir: String,
    pub backend_service: Option<BackendService>,
    pub build_command: String,
    pub install_command: String,
    pub output_dir: String,
    pub start_command: String,
    pub dev_command: String,
    pub frontend_port: u16,
    pub backend_port: u16,
    pub runtime_version: String,
    /// Manifests that could not be read
    pub errors: Vec<String>,
}

/// Inspect a working tree. Never fails: unreadable manifests land in `errors`.
pub async fn detect(root: &Path) -> DetectionResult {
    let mut result = DetectionResult::default();

    let (root_probe, err) = TreeProbe::scan(root).await;
    result.errors.extend(err.map(|e| e.to_string()));
    result.framework = classify_framework(&root_probe);
    result.backend_service = classify_backend(&root_probe);

    if result.framework.is_none() {
        for dir in FRONTEND_DIRS {
            let path = root.join(dir);
            if !is_dir(&path).await {
                continue;
            }
            let (probe, err) = TreeProbe::scan(&path).await;
            result.errors.extend(err.map(|e| e.to_string()));
            if result.backend_service.is_none() {
                result.backend_service = classify_backend(&probe);
            }
            if let Some(framework) = classify_framework(&probe) {
                debug!("Detected {} in {}", framework, dir);
                result.framework = Some(framework);
                result.framework_dir = dir.to_string();
                break;
            }
        }
    }

    if result.backend_service.is_none() {
        for dir in BACKEND_DIRS {
            let path = root.join(dir);
            if !is_dir(&path).await {
                continue;
            }
            let (probe, err) = TreeProbe::scan(&path).await;
            result.errors.extend(err.map(|e| e.to_string()));
            if let Some(service) = classify_backend(&probe) {
                result.backend_service = Some(service);
                break;
            }
        }
    }

    if let Some(framework) = result.framework {
        let defaults = framework_defaults(framework);
        result.build_command = defaults.build_command.to_string();
        result.install_command = defaults.install_command.to_string();
        result.output_dir = defaults.output_dir.to_string();
        result.start_command = defaults.start_command.to_string();
        result.dev_command = defaults.dev_command.to_string();
        result.frontend_port = defaults.port;
        result.runtime_version = DEFAULT_NODE_VERSION.to_string();
    }
    if result.backend_service.is_some() {
        result.backend_port = backend_default_port(result.backend_service);
    }

    result
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

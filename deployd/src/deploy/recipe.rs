//! Container build recipe generation
//!
//! Projects without a `Dockerfile` get one synthesized from their manifest. Four
//! shapes exist: Angular (nested `dist/<name>/browser`), a Node server bundle
//! (`build/`), a static bundle served by `http-server` (`dist/`, `.output/`) and a
//! generic `npm start` server. A committed `Dockerfile` is never touched; one this
//! module wrote earlier starts with [`GENERATED_MARKER`] and is regenerated.

use std::path::Path;

use tracing::info;

use crate::deploy::detector::{TreeProbe, DEFAULT_NODE_VERSION};
use crate::errors::EngineError;
use crate::filesys::dir::Dir;
use crate::models::project::Project;

pub const DOCKERFILE: &str = "Dockerfile";

/// First line of every generated recipe
pub const GENERATED_MARKER: &str = "# Generated by deployd";

/// Which runtime image the recipe produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeKind {
    Angular,
    NodeServer { output_dir: String },
    StaticSite { output_dir: String },
    Server { output_dir: String },
}

impl RecipeKind {
    pub fn select(probe: &TreeProbe, output_dir: &str) -> Self {
        let output_dir = output_dir.to_string();
        if probe.has_dep("@angular/core") {
            return RecipeKind::Angular;
        }
        match output_dir.as_str() {
            "build" => RecipeKind::NodeServer { output_dir },
            "dist" | ".output" => RecipeKind::StaticSite { output_dir },
            _ => RecipeKind::Server { output_dir },
        }
    }

    pub fn render(&self, node_version: &str) -> String {
        match self {
            RecipeKind::Angular => angular_recipe(node_version),
            RecipeKind::NodeServer { output_dir } => node_server_recipe(node_version, output_dir),
            RecipeKind::StaticSite { output_dir } => static_site_recipe(node_version, output_dir),
            RecipeKind::Server { output_dir } => server_recipe(node_version, output_dir),
        }
    }
}

/// Output directory implied by the manifest's dependencies
pub fn default_output_dir(probe: &TreeProbe) -> &'static str {
    if probe.has_dep("@angular/core") {
        "dist"
    } else if probe.has_dep("@sveltejs/kit") || probe.has_dep("@sveltejs/adapter-node") {
        "build"
    } else if probe.has_dep("next") {
        ".next"
    } else if probe.has_dep("nuxt") {
        ".output"
    } else if probe.has_dep("vite") {
        "dist"
    } else {
        "build"
    }
}

/// Human readable framework name used in build failure hints
pub fn framework_label(probe: &TreeProbe) -> &'static str {
    let vite = probe.has_dep("vite");
    if probe.has_dep("@angular/core") {
        "Angular"
    } else if probe.has_dep("@sveltejs/kit") || probe.has_dep("@sveltejs/adapter-node") {
        "SvelteKit"
    } else if probe.has_dep("next") {
        "Next.js"
    } else if probe.has_dep("nuxt") {
        "Nuxt"
    } else if vite && probe.has_dep("react") {
        "Vite + React"
    } else if vite && probe.has_dep("vue") {
        "Vite + Vue"
    } else if vite {
        "Vite"
    } else {
        "Node.js (Generic)"
    }
}

/// Result of [`ensure_build_recipe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeOutcome {
    /// `None` when a committed Dockerfile was kept
    pub kind: Option<RecipeKind>,
    /// Output directory the project should record, when it had none
    pub detected_output_dir: Option<String>,
}

/// Write a Dockerfile into `dir` unless the repository provides one
pub async fn ensure_build_recipe(dir: &Path, project: &Project) -> Result<RecipeOutcome, EngineError> {
    let root = Dir::new(dir);
    let dockerfile = root.file(DOCKERFILE);
    if dockerfile.exists().await {
        let existing = dockerfile.read_string().await?;
        if !existing.starts_with(GENERATED_MARKER) {
            info!("Using existing Dockerfile in {}", dir.display());
            return Ok(RecipeOutcome {
                kind: None,
                detected_output_dir: None,
            });
        }
    }

    let (probe, _) = TreeProbe::scan(dir).await;
    let (output_dir, detected_output_dir) = if project.output_dir.is_empty() {
        let detected = default_output_dir(&probe).to_string();
        (detected.clone(), Some(detected))
    } else {
        (project.output_dir.clone(), None)
    };

    let node_version = if project.node_version.is_empty() {
        DEFAULT_NODE_VERSION
    } else {
        &project.node_version
    };

    let kind = RecipeKind::select(&probe, &output_dir);
    info!("Generating {:?} Dockerfile for project {}", kind, project.id);
    dockerfile
        .write_string(&format!("{}\n{}", GENERATED_MARKER, kind.render(node_version)))
        .await?;

    Ok(RecipeOutcome {
        kind: Some(kind),
        detected_output_dir,
    })
}

/// Extra context for image builds that failed on a missing path
pub fn missing_path_hint(error: &str, framework: &str, output_dir: &str) -> Option<String> {
    let lower = error.to_lowercase();
    if !lower.contains("file does not exist") && !lower.contains("no such file") {
        return None;
    }
    Some(format!(
        "Detected framework: {}. Configured output directory: {}. Check that the build produces this directory or set the output directory in the project settings.",
        framework,
        if output_dir.is_empty() { "(auto)" } else { output_dir }
    ))
}

fn node_server_recipe(node: &str, output_dir: &str) -> String {
    format!(
        r#"FROM node:{node}-alpine AS builder
WORKDIR /app
COPY package*.json ./
RUN if [ -f package-lock.json ]; then npm ci --legacy-peer-deps; else npm install --legacy-peer-deps; fi
COPY . .
RUN npm run build

FROM node:{node}-alpine
WORKDIR /app
COPY --from=builder /app/{output_dir} ./
COPY --from=builder /app/package*.json ./
RUN npm install --omit=dev --legacy-peer-deps
EXPOSE 3000
ENV PORT=3000
ENV HOST=0.0.0.0
ENV NODE_ENV=production
CMD ["node", "index.js"]
"#
    )
}

fn angular_recipe(node: &str) -> String {
    format!(
        r#"FROM node:{node}-alpine AS builder
WORKDIR /app
COPY package*.json ./
RUN npm ci --legacy-peer-deps
COPY . .
RUN npm run build

FROM node:{node}-alpine
WORKDIR /app
RUN npm install -g http-server
COPY --from=builder /app/dist ./dist
EXPOSE 3000
ENV PORT=3000
CMD ["sh", "-c", "cd /app/dist && http-server -p $PORT -a 0.0.0.0 --proxy http://localhost:$PORT? $(ls -d */ | head -1)browser"]
"#
    )
}

fn static_site_recipe(node: &str, output_dir: &str) -> String {
    format!(
        r#"FROM node:{node}-alpine AS builder
WORKDIR /app
COPY package*.json ./
RUN npm ci --legacy-peer-deps
COPY . .
RUN npm run build

FROM node:{node}-alpine
WORKDIR /app
RUN npm install -g http-server
COPY --from=builder /app/{output_dir} ./{output_dir}
EXPOSE 3000
ENV PORT=3000
CMD ["sh", "-c", "http-server ./{output_dir} -p $PORT -a 0.0.0.0 --proxy http://localhost:$PORT?"]
"#
    )
}

fn server_recipe(node: &str, output_dir: &str) -> String {
    format!(
        r#"FROM node:{node}-alpine AS builder
WORKDIR /app
COPY package*.json ./
RUN npm ci --legacy-peer-deps
COPY . .
RUN npm run build

FROM node:{node}-alpine
WORKDIR /app
COPY --from=builder /app/{output_dir} ./{output_dir}
COPY --from=builder /app/package*.json ./
COPY --from=builder /app/node_modules ./node_modules
EXPOSE 3000
ENV PORT=3000
ENV HOST=0.0.0.0
ENV NODE_ENV=production
CMD ["npm", "start"]
"#
    )
}

//! SvelteKit adapter adjustment
//!
//! Projects set up for a serverless adapter are switched to `@sveltejs/adapter-node`
//! so the build produces a standalone Node server.

use std::path::Path;

use crate::errors::EngineError;
use crate::filesys::dir::Dir;

pub const ADAPTER_NODE: &str = "@sveltejs/adapter-node";
const ADAPTER_NODE_VERSION: &str = "^5.2.12";

const SERVERLESS_ADAPTERS: &[&str] = &[
    "\"@sveltejs/adapter-cloudflare\"",
    "\"@sveltejs/adapter-vercel\"",
    "\"@sveltejs/adapter-auto\"",
];

const SVELTE_CONFIG: &str = r#"import adapter from '@sveltejs/adapter-node';
import { vitePreprocess } from '@sveltejs/vite-plugin-svelte';

/** @type {import('@sveltejs/kit').Config} */
const config = {
	preprocess: vitePreprocess(),
	kit: {
		adapter: adapter()
	}
};

export default config;
"#;

/// What [`adjust`] changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Adjustment {
    pub is_sveltekit: bool,
    pub had_adapter_node: bool,
    pub added_adapter_node: bool,
    pub removed_lockfile: bool,
    pub wrote_config: bool,
}

/// Switch a SvelteKit project in `dir` to adapter-node. Non-SvelteKit trees are left alone.
pub async fn adjust(dir: &Path) -> Result<Adjustment, EngineError> {
    let root = Dir::new(dir);
    let manifest = root.file("package.json");
    let mut result = Adjustment::default();

    let Ok(content) = manifest.read_string().await else {
        return Ok(result);
    };
    if !content.contains("\"@sveltejs/kit\"") {
        return Ok(result);
    }
    result.is_sveltekit = true;

    if content.contains(&format!("\"{}\"", ADAPTER_NODE)) {
        result.had_adapter_node = true;
        return Ok(result);
    }

    if SERVERLESS_ADAPTERS.iter().any(|a| content.contains(a)) {
        let updated = content.replacen(
            "\"@sveltejs/kit\"",
            &format!(
                "\"{}\": \"{}\",\n\t\t\"@sveltejs/kit\"",
                ADAPTER_NODE, ADAPTER_NODE_VERSION
            ),
            1,
        );
        manifest.write_string(&updated).await?;
        result.added_adapter_node = true;

        let lockfile = root.file("package-lock.json");
        if lockfile.exists().await {
            lockfile.delete().await?;
            result.removed_lockfile = true;
        }
    }

    let config = root.file("svelte.config.js");
    let configured = match config.read_string().await {
        Ok(existing) => existing.contains(ADAPTER_NODE),
        Err(_) => false,
    };
    if !configured {
        config.write_string(SVELTE_CONFIG).await?;
        result.wrote_config = true;
    }

    Ok(result)
}

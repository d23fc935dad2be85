//! Code enhancement cache
//!
//! Wraps the completion service: the base artifact of a template is rewritten
//! per workspace and the result is cached as a file whose mtime is the cache
//! timestamp. A fresh entry is served without any external call. A response
//! that fails the entry-point contract never replaces the cached entry.

use chrono::{DateTime, Utc};
use docforge_client::CompletionService;
use docforge_core::GenerationError;
use docforge_core::domain::artifact::{CodeArtifact, is_fresh};
use docforge_core::domain::template::TemplateDescriptor;
use docforge_core::dto::completion::{CompletionMode, CompletionRequest};
use docforge_lua::check_entry_point;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::repository::write_atomic;

/// Subdirectory of a template cache dir holding enhanced artifacts
const HYBRID_DIR: &str = "hybrid";
const SLUG_MAX_LEN: usize = 40;

static FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:lua|Lua|LUA)?[ \t]*\r?\n(.*?)```").unwrap());

/// Inputs for one enhancement lookup
#[derive(Debug, Clone, Default)]
pub struct EnhancementRequest {
    pub workspace_id: String,
    /// Job id, forwarded to the completion service
    pub session_id: String,
    /// Plain rendering of the template body
    pub skeleton: Option<String>,
    pub document_metadata: Option<String>,
    pub instructions: Option<String>,
    /// Regenerate even if the cached entry is fresh
    pub refresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Refreshed,
}

pub struct EnhancementCache {
    completion: Arc<dyn CompletionService>,
    ttl: Duration,
}

impl EnhancementCache {
    pub fn new(completion: Arc<dyn CompletionService>, ttl: Duration) -> Self {
        Self { completion, ttl }
    }

    /// Location of the entry for (`template_id`, `workspace_id`) under `cache_dir`
    pub fn cache_path(cache_dir: &Path, template_id: &str, workspace_id: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(template_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(workspace_id.as_bytes());
        let digest = hex::encode(hasher.finalize());

        cache_dir.join(HYBRID_DIR).join(format!(
            "hybrid-{}-{}-{}.lua",
            slug(template_id),
            slug(workspace_id),
            &digest[..16]
        ))
    }

    fn entry_path(template: &TemplateDescriptor, workspace_id: &str) -> PathBuf {
        Self::cache_path(&template.cache_dir, &template.id, workspace_id)
    }

    /// Returns the cached artifact if it exists and is fresh
    pub async fn lookup(
        &self,
        template: &TemplateDescriptor,
        workspace_id: &str,
    ) -> Result<Option<CodeArtifact>, GenerationError> {
        let path = Self::entry_path(template, workspace_id);
        let cached_at = match modified_at(&path).await {
            Ok(at) => at,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let base_modified_at = modified_at(&template.artifact_path).await?;

        if !is_fresh(Utc::now(), cached_at, base_modified_at, self.ttl) {
            debug!("Cache entry {} is stale", path.display());
            return Ok(None);
        }

        let source = tokio::fs::read_to_string(&path).await?;
        Ok(Some(CodeArtifact::enhanced(source, cached_at)))
    }

    /// Returns the enhanced artifact for `template`, regenerating it when the
    /// cache is stale, missing or a refresh is forced
    pub async fn obtain(
        &self,
        template: &TemplateDescriptor,
        request: &EnhancementRequest,
    ) -> Result<(CodeArtifact, CacheOutcome), GenerationError> {
        if !request.refresh {
            if let Some(artifact) = self.lookup(template, &request.workspace_id).await? {
                info!("Enhancement cache hit for {}/{}", template.id, request.workspace_id);
                return Ok((artifact, CacheOutcome::Hit));
            }
        }

        let base = tokio::fs::read_to_string(&template.artifact_path).await?;
        let prompt = build_prompt(&base, request);

        info!(
            "Requesting enhanced artifact for {}/{} ({} prompt chars)",
            template.id,
            request.workspace_id,
            prompt.len()
        );
        let response = self
            .completion
            .complete(&CompletionRequest {
                prompt,
                mode: CompletionMode::Enhance,
                session_id: request.session_id.clone(),
            })
            .await?;

        let source = extract_code(&response.text);
        if let Err(e) = check_entry_point(&source) {
            warn!("Rejected enhanced artifact for {}: {}", template.id, e);
            return Err(GenerationError::Enhancement(format!(
                "completion response failed the entry-point contract: {}",
                e
            )));
        }

        let path = Self::entry_path(template, &request.workspace_id);
        let bytes = source.clone().into_bytes();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| GenerationError::storage(format!("cache writer failed: {}", e)))??;

        let cached_at = modified_at(&path).await.unwrap_or_else(|_| Utc::now());
        debug!("Cached enhanced artifact at {}", path.display());
        Ok((CodeArtifact::enhanced(source, cached_at), CacheOutcome::Refreshed))
    }

    /// Deletes the entry; returns whether one existed
    pub async fn invalidate(&self, template: &TemplateDescriptor, workspace_id: &str) -> Result<bool, GenerationError> {
        let path = Self::entry_path(template, workspace_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Invalidated cache entry {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

async fn modified_at(path: &Path) -> std::io::Result<DateTime<Utc>> {
    let modified = tokio::fs::metadata(path).await?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}

fn slug(value: &str) -> String {
    let mut out = String::new();
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed: String = out.trim_matches('-').chars().take(SLUG_MAX_LEN).collect();
    if trimmed.is_empty() { "x".to_string() } else { trimmed }
}

/// Code inside the first fenced block, else the whole response
fn extract_code(text: &str) -> String {
    match FENCED_CODE.captures(text) {
        Some(caps) => caps[1].trim().to_string(),
        None => text.trim().to_string(),
    }
}

fn build_prompt(base: &str, request: &EnhancementRequest) -> String {
    let mut prompt = String::from(
        "Rewrite the following Lua transformation artifact so it produces a better document for this workspace.\n\
         Keep exactly one global function `generate(toolkit, builder, context)` and return the complete code \
         in a single ```lua fenced block.\n\n",
    );

    prompt.push_str("## Base artifact\n```lua\n");
    prompt.push_str(base.trim_end());
    prompt.push_str("\n```\n");

    let sections = [
        ("Template structure", &request.skeleton),
        ("Relevant documents", &request.document_metadata),
        ("Instructions", &request.instructions),
    ];
    for (title, body) in sections {
        if let Some(body) = body.as_deref().filter(|b| !b.trim().is_empty()) {
            prompt.push_str(&format!("\n## {}\n{}\n", title, body.trim_end()));
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docforge_client::ClientError;
    use docforge_core::domain::template::TemplateKind;
    use docforge_core::dto::completion::CompletionResponse;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::SystemTime;

    const BASE: &str = "function generate(toolkit, builder, context)\n  return \"<w:p/>\"\nend\n";
    const ENHANCED: &str = "function generate(toolkit, builder, context)\n  return \"<w:p><w:r><w:t>better</w:t></w:r></w:p>\"\nend";

    struct ScriptedCompletion {
        replies: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedCompletion {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedCompletion {
        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ClientError> {
            self.prompts.lock().unwrap().push(request.clone());
            let text = self.replies.lock().unwrap().pop_front().unwrap_or_default();
            Ok(CompletionResponse { text })
        }
    }

    fn set_age(path: &Path, age: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    fn template(root: &Path) -> TemplateDescriptor {
        let dir = root.join("quarterly");
        std::fs::create_dir_all(&dir).unwrap();
        let artifact_path = dir.join("generate.lua");
        std::fs::write(&artifact_path, BASE).unwrap();
        set_age(&artifact_path, Duration::from_secs(3600));
        TemplateDescriptor {
            id: "quarterly".to_string(),
            kind: TemplateKind::Document,
            template_path: dir.join("template.docx"),
            artifact_path,
            cache_dir: dir.join(".cache"),
        }
    }

    fn seed_entry(template: &TemplateDescriptor, age: Duration) -> PathBuf {
        let path = EnhancementCache::cache_path(&template.cache_dir, &template.id, "ws-1");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, ENHANCED).unwrap();
        set_age(&path, age);
        path
    }

    fn request(refresh: bool) -> EnhancementRequest {
        EnhancementRequest {
            workspace_id: "ws-1".to_string(),
            session_id: "job-1".to_string(),
            instructions: Some("use bullet points".to_string()),
            refresh,
            ..Default::default()
        }
    }

    #[test]
    fn test_cache_path_shape() {
        let path = EnhancementCache::cache_path(Path::new("/t/.cache"), "Quarterly Report", "ws_1");
        let name = path.file_name().unwrap().to_str().unwrap();

        assert_eq!(path.parent().unwrap(), Path::new("/t/.cache/hybrid"));
        assert!(name.starts_with("hybrid-quarterly-report-ws-1-"));
        assert!(name.ends_with(".lua"));
        assert_eq!(name.len(), "hybrid-quarterly-report-ws-1-".len() + 16 + ".lua".len());

        let other = EnhancementCache::cache_path(Path::new("/t/.cache"), "Quarterly Report", "ws-1");
        assert_ne!(path, other);
    }

    #[tokio::test]
    async fn test_fresh_entry_is_served_without_calls() {
        let root = tempfile::tempdir().unwrap();
        let template = template(root.path());
        seed_entry(&template, Duration::from_secs(14 * 60 + 59));

        let completion = ScriptedCompletion::new(&[]);
        let cache = EnhancementCache::new(completion.clone(), Duration::from_secs(15 * 60));
        let (artifact, outcome) = cache.obtain(&template, &request(false)).await.unwrap();

        assert_eq!(outcome, CacheOutcome::Hit);
        assert_eq!(artifact.source, ENHANCED);
        assert!(artifact.is_enhanced());
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn test_stale_entry_is_regenerated_once() {
        let root = tempfile::tempdir().unwrap();
        let template = template(root.path());
        let path = seed_entry(&template, Duration::from_secs(15 * 60 + 1));

        let reply = "Here you go:\n```lua\nfunction generate(toolkit, builder, context)\n  return \"new\"\nend\n```";
        let completion = ScriptedCompletion::new(&[reply]);
        let cache = EnhancementCache::new(completion.clone(), Duration::from_secs(15 * 60));
        let (artifact, outcome) = cache.obtain(&template, &request(false)).await.unwrap();

        assert_eq!(outcome, CacheOutcome::Refreshed);
        assert_eq!(completion.calls(), 1);
        assert!(artifact.source.starts_with("function generate"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), artifact.source);

        let prompts = completion.prompts.lock().unwrap();
        assert_eq!(prompts[0].mode, CompletionMode::Enhance);
        assert!(prompts[0].prompt.contains(BASE.trim_end()));
        assert!(prompts[0].prompt.contains("use bullet points"));

        // now fresh again
        drop(prompts);
        let (_, outcome) = cache.obtain(&template, &request(false)).await.unwrap();
        assert_eq!(outcome, CacheOutcome::Hit);
        assert_eq!(completion.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_response_keeps_existing_entry() {
        let root = tempfile::tempdir().unwrap();
        let template = template(root.path());
        let path = seed_entry(&template, Duration::from_secs(16 * 60));

        let completion = ScriptedCompletion::new(&["function main() return 1 end"]);
        let cache = EnhancementCache::new(completion.clone(), Duration::from_secs(15 * 60));
        let err = cache.obtain(&template, &request(false)).await.unwrap_err();

        assert_eq!(err.kind(), "EnhancementError");
        assert_eq!(completion.calls(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), ENHANCED);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_fresh_entry() {
        let root = tempfile::tempdir().unwrap();
        let template = template(root.path());
        seed_entry(&template, Duration::from_secs(60));

        let completion = ScriptedCompletion::new(&[ENHANCED]);
        let cache = EnhancementCache::new(completion.clone(), Duration::from_secs(15 * 60));
        let (_, outcome) = cache.obtain(&template, &request(true)).await.unwrap();

        assert_eq!(outcome, CacheOutcome::Refreshed);
        assert_eq!(completion.calls(), 1);
    }

    #[tokio::test]
    async fn test_entry_older_than_base_is_stale() {
        let root = tempfile::tempdir().unwrap();
        let template = template(root.path());
        seed_entry(&template, Duration::from_secs(60));
        set_age(&template.artifact_path, Duration::from_secs(10));

        let cache = EnhancementCache::new(ScriptedCompletion::new(&[]), Duration::from_secs(15 * 60));
        assert!(cache.lookup(&template, "ws-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let root = tempfile::tempdir().unwrap();
        let template = template(root.path());
        let path = seed_entry(&template, Duration::from_secs(60));

        let cache = EnhancementCache::new(ScriptedCompletion::new(&[]), Duration::from_secs(15 * 60));
        assert!(cache.invalidate(&template, "ws-1").await.unwrap());
        assert!(!path.exists());
        assert!(!cache.invalidate(&template, "ws-1").await.unwrap());
    }
}

//! `toolkit` capability
//!
//! Completion round trips and local conversions. Completion calls are async
//! functions: the artifact's coroutine yields while the request is in flight,
//! so the execution timeout also covers slow completions.

use docforge_client::CompletionService;
use docforge_core::dto::completion::{CompletionMode, CompletionRequest};
use docforge_lua::{CapabilityModule, ModuleMetadata};
use docforge_merge::SkeletonFormat;
use mlua::LuaSerdeExt;
use mlua::prelude::*;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::context::{CapabilityBinding, TemplateSnapshot};

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)```").unwrap());

/// Opening brackets tried as the start of an embedded payload
const MAX_JSON_CANDIDATES: usize = 16;

/// Pulls a JSON payload out of a completion response
///
/// Tries a fenced block, then the whole text, then the first balanced object
/// or array inside it.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    if let Some(value) = FENCED_JSON
        .captures(text)
        .and_then(|caps| serde_json::from_str(caps[1].trim()).ok())
    {
        return Some(value);
    }

    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Some(value);
    }

    text.char_indices()
        .filter(|(_, c)| matches!(c, '{' | '['))
        .take(MAX_JSON_CANDIDATES)
        .find_map(|(start, _)| {
            let end = balanced_end(text, start)?;
            serde_json::from_str(&text[start..end]).ok()
        })
}

/// End offset of the bracketed value opening at `start`
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut expected = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => expected.push('}'),
            '[' => expected.push(']'),
            '}' | ']' => {
                if expected.pop() != Some(c) {
                    return None;
                }
                if expected.is_empty() {
                    return Some(start + offset + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

pub struct ToolkitModule {
    session_id: String,
    completion: Arc<dyn CompletionService>,
    template: TemplateSnapshot,
}

impl ToolkitModule {
    pub fn new(binding: &CapabilityBinding) -> Self {
        Self {
            session_id: binding.session_id.clone(),
            completion: binding.completion.clone(),
            template: binding.template.clone(),
        }
    }

    fn completion_function(&self, lua: &Lua, mode: CompletionMode) -> LuaResult<LuaFunction> {
        let completion = self.completion.clone();
        let session_id = self.session_id.clone();

        lua.create_async_function(move |lua, prompt: String| {
            let completion = completion.clone();
            let request = CompletionRequest {
                prompt,
                mode,
                session_id: session_id.clone(),
            };
            async move {
                debug!("Artifact requested a {:?} completion", mode);
                let response = completion
                    .complete(&request)
                    .await
                    .map_err(LuaError::external)?;

                if mode == CompletionMode::Json {
                    if let Some(value) = extract_json(&response.text) {
                        return lua.to_value(&value);
                    }
                }
                Ok(LuaValue::String(lua.create_string(&response.text)?))
            }
        })
    }
}

impl CapabilityModule for ToolkitModule {
    fn id(&self) -> &'static str {
        "toolkit"
    }

    fn install(&self, lua: &Lua, target: &LuaTable) -> LuaResult<()> {
        target.set("json", self.completion_function(lua, CompletionMode::Json)?)?;
        target.set("query", self.completion_function(lua, CompletionMode::Query)?)?;
        target.set("text", self.completion_function(lua, CompletionMode::Text)?)?;

        let template = self.template.clone();
        target.set(
            "getSkeleton",
            lua.create_function(move |_, format: Option<String>| {
                let format: SkeletonFormat = format
                    .as_deref()
                    .unwrap_or_default()
                    .parse()
                    .map_err(LuaError::external)?;
                docforge_merge::skeleton(template.kind, &template.bytes, format).map_err(LuaError::external)
            })?,
        )?;

        target.set(
            "markdownToHtml",
            lua.create_function(|_, markdown: String| Ok(docforge_merge::markdown_to_html(&markdown)))?,
        )?;

        target.set(
            "htmlToDocx",
            lua.create_function(|lua, html: String| {
                let package = docforge_merge::html_to_docx(&html).map_err(LuaError::external)?;
                lua.create_string(&package)
            })?,
        )?;

        target.set("null", lua.null())?;
        Ok(())
    }

    fn stubs(&self) -> String {
        r#"---Completion returning parsed JSON (fenced, bare or embedded), else the raw text
---@param prompt string
---@return any
function Toolkit.json(prompt) end

---Completion returning text
---@param prompt string
---@return string
function Toolkit.query(prompt) end

---Completion returning text
---@param prompt string
---@return string
function Toolkit.text(prompt) end

---Plain rendering of the template body
---@param format? "text"|"markup"
---@return string
function Toolkit.getSkeleton(format) end

---@param markdown string
---@return string
function Toolkit.markdownToHtml(markdown) end

---Standalone .docx package built from HTML, usable as `{ docx = ... }`
---@param html string
---@return string
function Toolkit.htmlToDocx(html) end

---Sentinel for JSON null, e.g. to clear a cell
---@type lightuserdata
Toolkit.null = nil
"#
        .to_string()
    }

    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata {
            id: self.id(),
            version: "1.0.0",
            description: "Completion and conversion helpers for transformation artifacts",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::InMemoryLogBuffer;
    use async_trait::async_trait;
    use docforge_client::ClientError;
    use docforge_core::domain::template::TemplateKind;
    use docforge_core::dto::completion::CompletionResponse;
    use serde_json::json;
    use std::sync::Mutex;

    struct EchoCompletion {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionService for EchoCompletion {
        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ClientError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(CompletionResponse {
                text: self.reply.clone(),
            })
        }
    }

    fn toolkit(lua: &Lua, reply: &str) -> Arc<EchoCompletion> {
        let completion = Arc::new(EchoCompletion {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let binding = CapabilityBinding {
            session_id: "job-1".to_string(),
            completion: completion.clone(),
            template: TemplateSnapshot::new(TemplateKind::Document, Vec::new()),
            log_buffer: Arc::new(InMemoryLogBuffer::new()),
        };
        let table = lua.create_table().unwrap();
        ToolkitModule::new(&binding).install(lua, &table).unwrap();
        lua.globals().set("toolkit", table).unwrap();
        completion
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(
            extract_json("Sure:\n```json\n{\"a\": 1}\n```\nDone"),
            Some(json!({"a": 1}))
        );
        assert_eq!(extract_json("  [1, 2]  "), Some(json!([1, 2])));
        assert_eq!(
            extract_json("The rows are {\"rows\": [\"x}\", 2]} as requested."),
            Some(json!({"rows": ["x}", 2]}))
        );
        assert_eq!(extract_json("no payload here"), None);
        assert_eq!(
            extract_json("Use {name} or [id], then: {\"k\": 1}"),
            Some(json!({"k": 1}))
        );
    }

    #[test]
    fn test_extract_json_unbalanced_input_is_bounded() {
        let text = "{".repeat(200_000);
        assert_eq!(extract_json(&text), None);
    }

    #[tokio::test]
    async fn test_json_returns_lua_data() {
        let lua = Lua::new();
        let completion = toolkit(&lua, "```json\n{\"total\": 42, \"items\": [\"a\", \"b\"]}\n```");

        let (total, second): (i64, String) = lua
            .load(r#"local r = toolkit.json("numbers please"); return r.total, r.items[2]"#)
            .eval_async()
            .await
            .unwrap();
        assert_eq!(total, 42);
        assert_eq!(second, "b");

        let seen = completion.seen.lock().unwrap();
        assert_eq!(seen[0].mode, CompletionMode::Json);
        assert_eq!(seen[0].session_id, "job-1");
    }

    #[tokio::test]
    async fn test_json_falls_back_to_text() {
        let lua = Lua::new();
        toolkit(&lua, "I cannot answer that");

        let reply: String = lua
            .load(r#"return toolkit.json("?")"#)
            .eval_async()
            .await
            .unwrap();
        assert_eq!(reply, "I cannot answer that");
    }

    #[tokio::test]
    async fn test_text_and_query_modes() {
        let lua = Lua::new();
        let completion = toolkit(&lua, "plain");

        let reply: String = lua
            .load(r#"return toolkit.text("a") .. toolkit.query("b")"#)
            .eval_async()
            .await
            .unwrap();
        assert_eq!(reply, "plainplain");

        let modes: Vec<CompletionMode> = completion.seen.lock().unwrap().iter().map(|r| r.mode).collect();
        assert_eq!(modes, vec![CompletionMode::Text, CompletionMode::Query]);
    }

    #[test]
    fn test_local_conversions() {
        let lua = Lua::new();
        toolkit(&lua, "");

        let html: String = lua
            .load(r##"return toolkit.markdownToHtml("# Title")"##)
            .eval()
            .unwrap();
        assert!(html.contains("<h1>Title</h1>"));

        let is_zip: bool = lua
            .load(r#"return toolkit.htmlToDocx("<p>Hi</p>"):sub(1, 2) == "PK""#)
            .eval()
            .unwrap();
        assert!(is_zip);
    }

    #[test]
    fn test_unknown_skeleton_format_raises() {
        let lua = Lua::new();
        toolkit(&lua, "");

        let result: LuaResult<String> = lua.load(r#"return toolkit.getSkeleton("pdf")"#).eval();
        assert!(result.unwrap_err().to_string().contains("unknown skeleton format"));
    }
}

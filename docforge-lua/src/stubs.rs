//! LuaLS stub generation for artifact authors

use crate::module::ModuleRegistry;

const CONTEXT_STUB: &str = r#"---@class Context
---@field customer_id string
---@field workspace_id string
---@field template_id string
---@field job_id string
---@field now string RFC 3339 timestamp
---@field instructions? string
"#;

const ENTRY_POINT_STUB: &str = r#"---Entry point: return markup, { markup = ... }, { docx = ... },
---{ sheet_ops = { ... } } or the value of builder.save()
---@param toolkit Toolkit
---@param builder Builder
---@param context Context
---@return string|table|nil
function generate(toolkit, builder, context) end
"#;

/// Renders one stub file describing the whole entry-point contract
pub fn render_stubs(toolkit: &ModuleRegistry, builder: &ModuleRegistry) -> String {
    let mut out = String::from("---@meta\n\n");
    out.push_str(CONTEXT_STUB);
    out.push('\n');
    out.push_str(&toolkit.generate_stubs());
    out.push_str(&builder.generate_stubs());
    out.push_str(ENTRY_POINT_STUB);
    out
}

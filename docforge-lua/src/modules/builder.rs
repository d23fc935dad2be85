//! Builder capability
//!
//! The builder collects structural block nodes instead of markup. It is an
//! explicit two-state machine: nodes are appended while it is open, and
//! `save()` freezes the sequence. Appending to a frozen builder is a runtime
//! error inside the artifact.

use crate::module::{CapabilityModule, ModuleMetadata};
use docforge_core::domain::result::{BlockNode, Run};
use mlua::prelude::*;
use serde::Deserialize;
use std::sync::{Arc, Mutex};

/// Field set on the table returned by `builder.save()`
pub const SAVED_MARKER: &str = "__docforge_saved";

const MAX_HEADING_LEVEL: i64 = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum BuilderState {
    Open(Vec<BlockNode>),
    Frozen(Vec<BlockNode>),
}

/// Shared handle on one execution's builder state
#[derive(Debug, Clone)]
pub struct BuilderHandle {
    state: Arc<Mutex<BuilderState>>,
}

impl Default for BuilderHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl BuilderHandle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BuilderState::Open(Vec::new()))),
        }
    }

    fn lock(&self) -> LuaResult<std::sync::MutexGuard<'_, BuilderState>> {
        self.state
            .lock()
            .map_err(|e| LuaError::RuntimeError(format!("builder state poisoned: {}", e)))
    }

    /// Appends nodes, failing once the builder is frozen
    pub fn push(&self, nodes: impl IntoIterator<Item = BlockNode>) -> LuaResult<()> {
        match &mut *self.lock()? {
            BuilderState::Open(existing) => {
                existing.extend(nodes);
                Ok(())
            }
            BuilderState::Frozen(_) => Err(LuaError::RuntimeError(
                "builder is frozen: save() was already called".to_string(),
            )),
        }
    }

    /// Freezes the builder and returns the number of collected nodes
    ///
    /// Saving twice keeps the first frozen sequence.
    pub fn save(&self) -> LuaResult<usize> {
        let mut state = self.lock()?;
        let nodes = match &mut *state {
            BuilderState::Open(nodes) => std::mem::take(nodes),
            BuilderState::Frozen(nodes) => return Ok(nodes.len()),
        };
        let count = nodes.len();
        *state = BuilderState::Frozen(nodes);
        Ok(count)
    }

    /// Nodes of a frozen builder, `None` while it is still open
    pub fn frozen_nodes(&self) -> Option<Vec<BlockNode>> {
        match &*self.state.lock().ok()? {
            BuilderState::Frozen(nodes) => Some(nodes.clone()),
            BuilderState::Open(_) => None,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen_nodes().is_some()
    }

    /// Whether `table` is the value returned by `builder.save()`
    pub fn is_save_marker(table: &LuaTable) -> bool {
        matches!(table.raw_get::<Option<bool>>(SAVED_MARKER), Ok(Some(true)))
    }
}

/// Optional run formatting accepted as the `style` argument
#[derive(Debug, Default, Deserialize)]
struct RunStyle {
    bold: Option<bool>,
    italic: Option<bool>,
    underline: Option<bool>,
    strike: Option<bool>,
    color: Option<String>,
    font: Option<String>,
    size: Option<f64>,
}

impl RunStyle {
    fn from_lua_value(lua: &Lua, value: Option<LuaValue>) -> LuaResult<Self> {
        match value {
            None | Some(LuaValue::Nil) => Ok(Self::default()),
            Some(LuaValue::Table(table)) => lua.from_value(LuaValue::Table(table)),
            // "bold italic" style shorthand
            Some(LuaValue::String(s)) => {
                let words = s.to_string_lossy().to_lowercase();
                let has = |w: &str| words.split_whitespace().any(|x| x == w).then_some(true);
                Ok(Self {
                    bold: has("bold"),
                    italic: has("italic"),
                    underline: has("underline"),
                    strike: has("strike"),
                    ..Self::default()
                })
            }
            Some(other) => Err(LuaError::RuntimeError(format!(
                "style must be a table or string, got {}",
                other.type_name()
            ))),
        }
    }

    fn apply(&self, mut run: Run) -> Run {
        run.bold |= self.bold.unwrap_or(false);
        run.italic |= self.italic.unwrap_or(false);
        run.underline |= self.underline.unwrap_or(false);
        run.strike |= self.strike.unwrap_or(false);
        if run.color.is_none() {
            run.color = self.color.clone();
        }
        if run.font.is_none() {
            run.font = self.font.clone();
        }
        if run.size.is_none() {
            run.size = self.size;
        }
        run
    }
}

/// Deepest nesting of run sequences accepted from an artifact
const MAX_RUN_DEPTH: usize = 16;

/// Converts text, a run table, or a sequence of either into runs
fn runs_from_value(lua: &Lua, value: LuaValue, style: &RunStyle) -> LuaResult<Vec<Run>> {
    let mut runs = Vec::new();
    collect_runs(lua, value, style, 0, &mut runs)?;
    Ok(runs)
}

fn collect_runs(lua: &Lua, value: LuaValue, style: &RunStyle, depth: usize, runs: &mut Vec<Run>) -> LuaResult<()> {
    match value {
        LuaValue::String(s) => runs.push(style.apply(Run::plain(s.to_string_lossy().to_string()))),
        LuaValue::Integer(_) | LuaValue::Number(_) => runs.push(style.apply(Run::plain(cell_text(&value)))),
        LuaValue::Table(table) => {
            if table.contains_key("text")? {
                let run: Run = lua.from_value(LuaValue::Table(table))?;
                runs.push(style.apply(run));
                return Ok(());
            }
            if depth >= MAX_RUN_DEPTH {
                return Err(LuaError::RuntimeError("runs nested too deeply".to_string()));
            }
            for item in table.sequence_values::<LuaValue>() {
                collect_runs(lua, item?, style, depth + 1, runs)?;
            }
        }
        other => {
            return Err(LuaError::RuntimeError(format!(
                "expected text or runs, got {}",
                other.type_name()
            )));
        }
    }
    Ok(())
}

/// Text shown in a table cell
fn cell_text(value: &LuaValue) -> String {
    match value {
        LuaValue::String(s) => s.to_string_lossy().to_string(),
        LuaValue::Integer(i) => i.to_string(),
        LuaValue::Number(n) => n.to_string(),
        LuaValue::Boolean(b) => b.to_string(),
        _ => String::new(),
    }
}

fn list_items<F>(lua: &Lua, items: LuaTable, make: F) -> LuaResult<Vec<BlockNode>>
where
    F: Fn(Vec<Run>) -> BlockNode,
{
    let style = RunStyle::default();
    let mut nodes = Vec::new();
    for item in items.sequence_values::<LuaValue>() {
        nodes.push(make(runs_from_value(lua, item?, &style)?));
    }
    Ok(nodes)
}

/// Builder capability bound to one execution
pub struct BuilderModule {
    handle: BuilderHandle,
}

impl BuilderModule {
    pub fn new(handle: BuilderHandle) -> Self {
        Self { handle }
    }
}

impl CapabilityModule for BuilderModule {
    fn id(&self) -> &'static str {
        "builder"
    }

    fn install(&self, lua: &Lua, target: &LuaTable) -> LuaResult<()> {
        {
            let handle = self.handle.clone();
            target.set(
                "addHeading",
                lua.create_function(
                    move |lua, (text, level, style): (LuaValue, Option<i64>, Option<LuaValue>)| {
                        let style = RunStyle::from_lua_value(lua, style)?;
                        let level = level.unwrap_or(1).clamp(1, MAX_HEADING_LEVEL) as u8;
                        let runs = runs_from_value(lua, text, &style)?;
                        handle.push([BlockNode::Heading { level, runs }])
                    },
                )?,
            )?;
        }

        {
            let handle = self.handle.clone();
            target.set(
                "addParagraph",
                lua.create_function(move |lua, (content, style): (LuaValue, Option<LuaValue>)| {
                    let style = RunStyle::from_lua_value(lua, style)?;
                    let runs = runs_from_value(lua, content, &style)?;
                    handle.push([BlockNode::Paragraph { runs }])
                })?,
            )?;
        }

        {
            let handle = self.handle.clone();
            target.set(
                "addBulletList",
                lua.create_function(move |lua, items: LuaTable| {
                    handle.push(list_items(lua, items, |runs| BlockNode::BulletItem { runs })?)
                })?,
            )?;
        }

        {
            let handle = self.handle.clone();
            target.set(
                "addNumberedList",
                lua.create_function(move |lua, items: LuaTable| {
                    handle.push(list_items(lua, items, |runs| BlockNode::NumberedItem { runs })?)
                })?,
            )?;
        }

        {
            let handle = self.handle.clone();
            target.set(
                "addTable",
                lua.create_function(move |_, (rows, opts): (LuaTable, Option<LuaTable>)| {
                    let mut grid = Vec::new();
                    for row in rows.sequence_values::<LuaTable>() {
                        let mut cells = Vec::new();
                        for cell in row?.sequence_values::<LuaValue>() {
                            cells.push(cell_text(&cell?));
                        }
                        grid.push(cells);
                    }
                    let widths = match opts {
                        Some(opts) => opts.get::<Option<Vec<u32>>>("widths")?,
                        None => None,
                    };
                    handle.push([BlockNode::Table { rows: grid, widths }])
                })?,
            )?;
        }

        {
            let handle = self.handle.clone();
            target.set(
                "pageBreak",
                lua.create_function(move |_, ()| handle.push([BlockNode::PageBreak]))?,
            )?;
        }

        {
            let handle = self.handle.clone();
            target.set(
                "save",
                lua.create_function(move |lua, ()| {
                    let count = handle.save()?;
                    let marker = lua.create_table()?;
                    marker.set(SAVED_MARKER, true)?;
                    marker.set("nodes", count)?;
                    Ok(marker)
                })?,
            )?;
        }

        Ok(())
    }

    fn stubs(&self) -> String {
        r#"---@class Run
---@field text string
---@field bold? boolean
---@field italic? boolean
---@field underline? boolean
---@field strike? boolean
---@field color? string hex colour, e.g. "1F4E79"
---@field font? string
---@field size? number points

---@alias RunStyle { bold?: boolean, italic?: boolean, underline?: boolean, strike?: boolean, color?: string, font?: string, size?: number }|string
---@alias Inline string|Run|(string|Run)[]

---Append a heading (level 1-6, default 1)
---@param text Inline
---@param level? integer
---@param style? RunStyle
function Builder.addHeading(text, level, style) end

---Append a paragraph
---@param content Inline
---@param style? RunStyle
function Builder.addParagraph(content, style) end

---Append one bullet item per entry
---@param items Inline[]
function Builder.addBulletList(items) end

---Append one numbered item per entry
---@param items Inline[]
function Builder.addNumberedList(items) end

---Append a table; widths are in twentieths of a point
---@param rows (string|number|boolean)[][]
---@param opts? { widths?: integer[] }
function Builder.addTable(rows, opts) end

---Append a page break
function Builder.pageBreak() end

---Freeze the document; return the result from generate()
---@return table
function Builder.save() end
"#
        .to_string()
    }

    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata {
            id: self.id(),
            version: "1.0.0",
            description: "Structural document builder",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lua_with_builder() -> (Lua, BuilderHandle) {
        let lua = Lua::new();
        let handle = BuilderHandle::new();
        let table = lua.create_table().unwrap();
        BuilderModule::new(handle.clone())
            .install(&lua, &table)
            .unwrap();
        lua.globals().set("builder", table).unwrap();
        (lua, handle)
    }

    #[test]
    fn test_heading_and_paragraph_then_save() {
        let (lua, handle) = lua_with_builder();

        let saved: LuaTable = lua
            .load(
                r#"
                builder.addHeading("Title", 1)
                builder.addParagraph("Body")
                return builder.save()
            "#,
            )
            .eval()
            .unwrap();

        assert!(BuilderHandle::is_save_marker(&saved));
        assert_eq!(
            handle.frozen_nodes().unwrap(),
            vec![
                BlockNode::Heading {
                    level: 1,
                    runs: vec![Run::plain("Title")]
                },
                BlockNode::Paragraph {
                    runs: vec![Run::plain("Body")]
                },
            ]
        );
    }

    #[test]
    fn test_add_after_save_fails() {
        let (lua, handle) = lua_with_builder();

        let result = lua
            .load(
                r#"
                builder.addParagraph("one")
                builder.save()
                builder.addParagraph("two")
            "#,
            )
            .exec();

        let err = result.unwrap_err().to_string();
        assert!(err.contains("frozen"), "unexpected error: {}", err);
        assert_eq!(handle.frozen_nodes().unwrap().len(), 1);
    }

    #[test]
    fn test_open_builder_has_no_frozen_nodes() {
        let (lua, handle) = lua_with_builder();
        lua.load(r#"builder.addParagraph("draft")"#).exec().unwrap();
        assert!(!handle.is_frozen());
        assert!(handle.frozen_nodes().is_none());
    }

    #[test]
    fn test_self_referencing_runs_are_rejected() {
        let (lua, handle) = lua_with_builder();

        let err = lua
            .load(
                r#"
                local t = {}
                t[1] = t
                builder.addParagraph(t)
            "#,
            )
            .exec()
            .unwrap_err()
            .to_string();

        assert!(err.contains("nested too deeply"), "unexpected error: {}", err);
        assert!(!handle.is_frozen());
    }

    #[test]
    fn test_nested_runs_within_depth_are_flattened() {
        let (lua, handle) = lua_with_builder();

        lua.load(
            r#"
            builder.addParagraph({ { { "a" }, "b" }, "c" })
            builder.save()
        "#,
        )
        .exec()
        .unwrap();

        let nodes = handle.frozen_nodes().unwrap();
        assert_eq!(
            nodes[0],
            BlockNode::Paragraph {
                runs: vec![Run::plain("a"), Run::plain("b"), Run::plain("c")]
            }
        );
    }

    #[test]
    fn test_runs_and_styles() {
        let (lua, handle) = lua_with_builder();

        lua.load(
            r#"
            builder.addParagraph({ "Total: ", { text = "42", bold = true, color = "FF0000" } }, { italic = true })
            builder.addHeading("Appendix", 9, "bold")
            builder.save()
        "#,
        )
        .exec()
        .unwrap();

        let nodes = handle.frozen_nodes().unwrap();
        match &nodes[0] {
            BlockNode::Paragraph { runs } => {
                assert_eq!(runs.len(), 2);
                assert!(runs[0].italic && !runs[0].bold);
                assert!(runs[1].italic && runs[1].bold);
                assert_eq!(runs[1].color.as_deref(), Some("FF0000"));
            }
            other => panic!("unexpected node: {:?}", other),
        }
        match &nodes[1] {
            BlockNode::Heading { level, runs } => {
                assert_eq!(*level, 6);
                assert!(runs[0].bold);
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_lists_tables_and_breaks() {
        let (lua, handle) = lua_with_builder();

        lua.load(
            r#"
            builder.addBulletList({ "a", "b" })
            builder.addNumberedList({ "first" })
            builder.addTable({ { "Region", "Revenue" }, { "EMEA", 1200.5 }, { "APAC", 900 } }, { widths = { 3000, 2000 } })
            builder.pageBreak()
            builder.save()
        "#,
        )
        .exec()
        .unwrap();

        let nodes = handle.frozen_nodes().unwrap();
        assert_eq!(nodes.len(), 5);
        assert!(matches!(nodes[0], BlockNode::BulletItem { .. }));
        assert!(matches!(nodes[2], BlockNode::NumberedItem { .. }));
        assert_eq!(
            nodes[3],
            BlockNode::Table {
                rows: vec![
                    vec!["Region".to_string(), "Revenue".to_string()],
                    vec!["EMEA".to_string(), "1200.5".to_string()],
                    vec!["APAC".to_string(), "900".to_string()],
                ],
                widths: Some(vec![3000, 2000]),
            }
        );
        assert_eq!(nodes[4], BlockNode::PageBreak);
    }

    #[test]
    fn test_save_twice_keeps_nodes() {
        let (lua, handle) = lua_with_builder();
        lua.load(
            r#"
            builder.addParagraph("x")
            builder.save()
            builder.save()
        "#,
        )
        .exec()
        .unwrap();
        assert_eq!(handle.frozen_nodes().unwrap().len(), 1);
    }
}

//! Conversion of the entry point's return value into a [`GenerationResult`]

use docforge_core::GenerationError;
use docforge_core::domain::result::{GenerationResult, SheetOp};
use mlua::prelude::*;

use crate::modules::builder::BuilderHandle;

/// Interprets the value returned by `generate`
///
/// Accepted shapes:
/// - a string: document markup
/// - `{ markup = "..." }`
/// - `{ docx = <bytes> }`: a standalone package, merged by its body window
/// - `{ sheet_ops = {...} }` or `{ sheetOps = {...} }`
/// - the value of `builder.save()`, or `nil` once the builder was saved
pub fn convert_result(
    lua: &Lua,
    value: LuaValue,
    builder: &BuilderHandle,
) -> Result<GenerationResult, GenerationError> {
    match value {
        LuaValue::Nil => builder_document(builder).ok_or_else(|| unrecognized("nil")),
        LuaValue::String(s) => Ok(GenerationResult::document(s.to_string_lossy().to_string())),
        LuaValue::Table(table) => convert_table(lua, table, builder),
        other => Err(unrecognized(other.type_name())),
    }
}

fn convert_table(
    lua: &Lua,
    table: LuaTable,
    builder: &BuilderHandle,
) -> Result<GenerationResult, GenerationError> {
    if BuilderHandle::is_save_marker(&table) {
        return builder_document(builder).ok_or_else(|| unrecognized("unsaved builder marker"));
    }

    if let Some(markup) = get_field::<LuaString>(lua, &table, "markup")? {
        return Ok(GenerationResult::document(markup.to_string_lossy().to_string()));
    }

    if let Some(package) = get_field::<LuaString>(lua, &table, "docx")? {
        return Ok(GenerationResult::Document {
            markup: String::new(),
            source_package: Some(package.as_bytes().to_vec()),
        });
    }

    let ops = match get_field::<LuaValue>(lua, &table, "sheet_ops")? {
        Some(ops) => Some(ops),
        None => get_field::<LuaValue>(lua, &table, "sheetOps")?,
    };
    if let Some(ops) = ops {
        return Ok(GenerationResult::Spreadsheet {
            sheet_ops: sheet_ops_from_lua(lua, ops)?,
        });
    }

    Err(unrecognized("table without markup, docx, sheet_ops or builder result"))
}

fn get_field<V: FromLua>(
    lua: &Lua,
    table: &LuaTable,
    key: &str,
) -> Result<Option<V>, GenerationError> {
    match table.raw_get::<LuaValue>(key) {
        Ok(LuaValue::Nil) => Ok(None),
        Ok(value) => V::from_lua(value, lua)
            .map(Some)
            .map_err(|e| GenerationError::ResultShape {
                expected: format!("`{}` of the right type", key),
                actual: e.to_string(),
            }),
        Err(e) => Err(GenerationError::Runtime(e.to_string())),
    }
}

/// Deserializes sheet operations through JSON so empty Lua tables read as
/// empty lists
pub fn sheet_ops_from_lua(lua: &Lua, value: LuaValue) -> Result<Vec<SheetOp>, GenerationError> {
    check_nesting(&value).map_err(|actual| GenerationError::ResultShape {
        expected: "sheet operations".to_string(),
        actual,
    })?;
    let options = LuaDeserializeOptions::new().deny_unsupported_types(false);
    let mut json: serde_json::Value =
        lua.from_value_with(value, options)
            .map_err(|e| GenerationError::ResultShape {
                expected: "sheet operations".to_string(),
                actual: e.to_string(),
            })?;
    empty_objects_to_arrays(&mut json);

    serde_json::from_value(json).map_err(|e| GenerationError::ResultShape {
        expected: "sheet operations".to_string(),
        actual: e.to_string(),
    })
}

/// Deepest table nesting accepted in sheet operations
const MAX_NESTING: usize = 32;
/// Tables visited before a result is considered too large to walk
const MAX_TABLES: usize = 100_000;

/// Bounds the nesting of `value` without recursing, so deeply nested or
/// self-referencing tables are rejected before deserialization walks them
fn check_nesting(value: &LuaValue) -> Result<(), String> {
    let LuaValue::Table(root) = value else {
        return Ok(());
    };
    let mut pending = vec![(root.clone(), 1usize)];
    let mut visited = 0usize;
    while let Some((table, depth)) = pending.pop() {
        if depth > MAX_NESTING {
            return Err("tables nested too deeply".to_string());
        }
        visited += 1;
        if visited > MAX_TABLES {
            return Err("too many tables".to_string());
        }
        for pair in table.pairs::<LuaValue, LuaValue>() {
            let (_, item) = pair.map_err(|e| e.to_string())?;
            if let LuaValue::Table(child) = item {
                pending.push((child, depth + 1));
            }
        }
    }
    Ok(())
}

fn empty_objects_to_arrays(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) if map.is_empty() => {
            *value = serde_json::Value::Array(Vec::new());
        }
        serde_json::Value::Object(map) => map.values_mut().for_each(empty_objects_to_arrays),
        serde_json::Value::Array(items) => items.iter_mut().for_each(empty_objects_to_arrays),
        _ => {}
    }
}

fn builder_document(builder: &BuilderHandle) -> Option<GenerationResult> {
    builder
        .frozen_nodes()
        .map(|nodes| GenerationResult::BuilderDocument { nodes })
}

fn unrecognized(actual: &str) -> GenerationError {
    GenerationError::ResultShape {
        expected: "generation result".to_string(),
        actual: actual.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::CapabilityModule;
    use crate::modules::builder::BuilderModule;
    use docforge_core::domain::result::{BlockNode, CellValue};

    fn eval(lua: &Lua, source: &str) -> LuaValue {
        lua.load(source).eval().unwrap()
    }

    #[test]
    fn test_string_is_document_markup() {
        let lua = Lua::new();
        let value = eval(&lua, r#"return "<w:p/>""#);
        let result = convert_result(&lua, value, &BuilderHandle::new()).unwrap();
        assert_eq!(result, GenerationResult::document("<w:p/>"));
    }

    #[test]
    fn test_markup_table_is_document() {
        let lua = Lua::new();
        let value = eval(&lua, r#"return { markup = "<w:p/>" }"#);
        let result = convert_result(&lua, value, &BuilderHandle::new()).unwrap();
        assert_eq!(result, GenerationResult::document("<w:p/>"));
    }

    #[test]
    fn test_docx_table_carries_package() {
        let lua = Lua::new();
        let value = eval(&lua, r#"return { docx = "PK\3\4" }"#);
        match convert_result(&lua, value, &BuilderHandle::new()).unwrap() {
            GenerationResult::Document {
                source_package: Some(bytes),
                ..
            } => assert_eq!(bytes, b"PK\x03\x04".to_vec()),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_sheet_ops_table() {
        let lua = Lua::new();
        let value = eval(
            &lua,
            r#"
            return {
                sheetOps = {
                    { op = "insert_rows", at = 5, count = 2, copy_style_from_row = 4 },
                    { op = "set_cells", cells = { { address = "B5", value = 12.5 } } },
                    { op = "write_range", start = "A1", values = { { "x", 1, true } } },
                    { op = "set_cells", cells = {} },
                }
            }
        "#,
        );
        match convert_result(&lua, value, &BuilderHandle::new()).unwrap() {
            GenerationResult::Spreadsheet { sheet_ops } => {
                assert_eq!(sheet_ops.len(), 4);
                assert!(matches!(
                    sheet_ops[0],
                    SheetOp::InsertRows {
                        at: 5,
                        count: 2,
                        copy_style_from_row: Some(4),
                        ..
                    }
                ));
                match &sheet_ops[1] {
                    SheetOp::SetCells { cells, .. } => {
                        assert_eq!(cells[0].value, CellValue::Number(12.5))
                    }
                    other => panic!("unexpected op: {:?}", other),
                }
                assert!(matches!(&sheet_ops[3], SheetOp::SetCells { cells, .. } if cells.is_empty()));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_deeply_nested_sheet_ops_are_shape_error() {
        let lua = Lua::new();
        let value = eval(
            &lua,
            r#"
            local t = {}
            for _ = 1, 10000 do t = { t } end
            return { sheet_ops = t }
        "#,
        );
        let err = convert_result(&lua, value, &BuilderHandle::new()).unwrap_err();
        assert!(matches!(err, GenerationError::ResultShape { .. }), "unexpected error: {:?}", err);
    }

    #[test]
    fn test_self_referencing_sheet_ops_are_shape_error() {
        let lua = Lua::new();
        let value = eval(
            &lua,
            r#"
            local t = {}
            t[1] = t
            return { sheet_ops = t }
        "#,
        );
        let err = convert_result(&lua, value, &BuilderHandle::new()).unwrap_err();
        assert!(matches!(err, GenerationError::ResultShape { .. }), "unexpected error: {:?}", err);
    }

    #[test]
    fn test_builder_save_value_and_nil() {
        let lua = Lua::new();
        let handle = BuilderHandle::new();
        let table = lua.create_table().unwrap();
        BuilderModule::new(handle.clone())
            .install(&lua, &table)
            .unwrap();
        lua.globals().set("builder", table).unwrap();

        let value = eval(
            &lua,
            r#"
            builder.addParagraph("Body")
            return builder.save()
        "#,
        );
        let result = convert_result(&lua, value, &handle).unwrap();
        assert_eq!(
            result,
            GenerationResult::BuilderDocument {
                nodes: vec![BlockNode::Paragraph {
                    runs: vec![docforge_core::domain::result::Run::plain("Body")]
                }]
            }
        );

        let again = convert_result(&lua, LuaValue::Nil, &handle).unwrap();
        assert_eq!(again, result);
    }

    #[test]
    fn test_nil_without_save_is_shape_error() {
        let lua = Lua::new();
        let err = convert_result(&lua, LuaValue::Nil, &BuilderHandle::new()).unwrap_err();
        assert!(matches!(err, GenerationError::ResultShape { .. }));
    }

    #[test]
    fn test_unknown_table_is_shape_error() {
        let lua = Lua::new();
        let value = eval(&lua, r#"return { rows = 3 }"#);
        let err = convert_result(&lua, value, &BuilderHandle::new()).unwrap_err();
        assert_eq!(err.kind(), "ResultShapeError");
    }
}

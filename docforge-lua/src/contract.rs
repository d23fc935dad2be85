//! Entry-point contract check
//!
//! An artifact must declare exactly one global `generate(toolkit, builder,
//! context)` function. The check is structural: it runs on the source text
//! before anything is executed, so it is also used to validate enhanced code
//! coming back from the completion service.

use docforge_core::GenerationError;
use regex::Regex;
use std::sync::LazyLock;

/// Name of the entry point global
pub const ENTRY_POINT: &str = "generate";

/// Number of positional parameters the entry point takes
pub const ENTRY_POINT_ARITY: usize = 3;

static LONG_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--\[(=*)\[[\s\S]*?\][=]*\]").expect("valid regex"));

static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)--.*$").expect("valid regex"));

// `function generate(...)` and `generate = function(...)` at the start of a line
static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?:function[ \t]+generate[ \t]*\(([^)]*)\)|generate[ \t]*=[ \t]*function[ \t]*\(([^)]*)\))",
    )
    .expect("valid regex")
});

/// Verifies that `source` declares the entry point exactly once with three
/// parameters
pub fn check_entry_point(source: &str) -> Result<(), GenerationError> {
    let stripped = LONG_COMMENT.replace_all(source, "");
    let stripped = LINE_COMMENT.replace_all(&stripped, "");

    let declarations: Vec<_> = DECLARATION.captures_iter(&stripped).collect();

    let params = match declarations.as_slice() {
        [] => {
            return Err(GenerationError::ContractViolation(format!(
                "no global `{}` function found",
                ENTRY_POINT
            )));
        }
        [single] => single
            .get(1)
            .or_else(|| single.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default(),
        many => {
            return Err(GenerationError::ContractViolation(format!(
                "`{}` is declared {} times",
                ENTRY_POINT,
                many.len()
            )));
        }
    };

    let names: Vec<&str> = params
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if names.len() != ENTRY_POINT_ARITY || names.contains(&"...") {
        return Err(GenerationError::ContractViolation(format!(
            "`{}` must take exactly {} parameters (toolkit, builder, context), found {}",
            ENTRY_POINT,
            ENTRY_POINT_ARITY,
            names.len()
        )));
    }

    Ok(())
}

//! Lua sandbox creation
//!
//! Transformation code is untrusted. It runs in a fresh state that only has the
//! pure standard libraries loaded: no I/O, no OS access, no way to load more
//! code. Capabilities are never installed as globals; the executor hands them
//! to the entry point as arguments.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib};

/// Globals removed from the base library after the state is created
const REMOVED_GLOBALS: &[&str] = &[
    "require",
    "dofile",
    "loadfile",
    "load",
    "print",
    "collectgarbage",
];

/// Limits applied to a sandbox
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxLimits {
    /// Upper bound on memory used by the Lua allocator, in bytes
    pub memory_limit: Option<usize>,
}

impl SandboxLimits {
    pub fn with_memory_limit_mb(mb: usize) -> Self {
        Self {
            memory_limit: Some(mb.saturating_mul(1024 * 1024)),
        }
    }
}

/// Create a restricted Lua sandbox
///
/// Only `table`, `string`, `math`, `coroutine` and `utf8` are available.
///
/// # Example
/// ```no_run
/// use docforge_lua::sandbox::{create_sandbox, SandboxLimits};
///
/// let lua = create_sandbox(SandboxLimits::default())?;
/// let upper: String = lua.load(r#"return string.upper("q3 report")"#).eval()?;
/// assert_eq!(upper, "Q3 REPORT");
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox(limits: SandboxLimits) -> LuaResult<Lua> {
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE | StdLib::UTF8,
        LuaOptions::default(),
    )?;

    let globals = lua.globals();
    for name in REMOVED_GLOBALS {
        globals.set(*name, mlua::Nil)?;
    }

    if let Some(bytes) = limits.memory_limit {
        lua.set_memory_limit(bytes)?;
    }

    Ok(lua)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_basic_lua() {
        let lua = create_sandbox(SandboxLimits::default()).unwrap();

        let result: i32 = lua
            .load(
                r#"
                local t = {a = 1, b = 2}
                return t.a + t.b
            "#,
            )
            .eval()
            .unwrap();
        assert_eq!(result, 3);

        let result: String = lua.load(r#"return string.upper("hello")"#).eval().unwrap();
        assert_eq!(result, "HELLO");

        let result: f64 = lua.load(r#"return math.sqrt(16)"#).eval().unwrap();
        assert_eq!(result, 4.0);

        let result: i64 = lua.load(r#"return utf8.len("héllo")"#).eval().unwrap();
        assert_eq!(result, 5);
    }

    #[test]
    fn test_sandbox_no_io() {
        let lua = create_sandbox(SandboxLimits::default()).unwrap();

        let has_io: bool = lua.load(r#"return io ~= nil"#).eval().unwrap();
        assert!(!has_io);

        let has_os: bool = lua.load(r#"return os ~= nil"#).eval().unwrap();
        assert!(!has_os);

        let has_debug: bool = lua.load(r#"return debug ~= nil"#).eval().unwrap();
        assert!(!has_debug);
    }

    #[test]
    fn test_sandbox_cannot_load_code() {
        let lua = create_sandbox(SandboxLimits::default()).unwrap();

        for name in REMOVED_GLOBALS {
            let present: bool = lua
                .load(format!("return {} ~= nil", name))
                .eval()
                .unwrap();
            assert!(!present, "{} should be removed", name);
        }

        let result: LuaResult<()> = lua.load(r#"require("os")"#).exec();
        assert!(result.is_err());
    }

    #[test]
    fn test_sandbox_has_no_capabilities_as_globals() {
        let lua = create_sandbox(SandboxLimits::default()).unwrap();

        let leaked: bool = lua
            .load(r#"return toolkit ~= nil or builder ~= nil or log ~= nil"#)
            .eval()
            .unwrap();
        assert!(!leaked);
    }

    #[test]
    fn test_memory_limit_is_enforced() {
        let lua = create_sandbox(SandboxLimits::with_memory_limit_mb(8)).unwrap();

        let result: LuaResult<()> = lua
            .load(
                r#"
                local t = {}
                for i = 1, 10000000 do
                    t[i] = string.rep("x", 64) .. i
                end
            "#,
            )
            .exec();
        assert!(result.is_err());
    }
}

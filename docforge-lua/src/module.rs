use mlua::prelude::*;

/// Trait for capability modules.
///
/// A capability module contributes functions to one of the tables handed to
/// the `generate(toolkit, builder, context)` entry point. Modules never touch
/// the global scope: the sandbox stays empty apart from the pure standard
/// libraries, and every effect an artifact has goes through these tables.
///
/// # Example
///
/// ```rust
/// use docforge_lua::module::CapabilityModule;
/// use mlua::prelude::*;
///
/// struct ClockModule;
///
/// impl CapabilityModule for ClockModule {
///     fn id(&self) -> &'static str {
///         "clock"
///     }
///
///     fn install(&self, lua: &Lua, target: &LuaTable) -> LuaResult<()> {
///         target.set("year", lua.create_function(|_, ()| Ok(2024))?)?;
///         Ok(())
///     }
///
///     fn stubs(&self) -> String {
///         "---@return integer\nfunction Toolkit.year() end\n".to_string()
///     }
/// }
/// ```
pub trait CapabilityModule: Send + Sync {
    /// Returns the unique identifier for this module.
    fn id(&self) -> &'static str;

    /// Installs this module's functions into `target`.
    ///
    /// `target` is the capability table the module belongs to (toolkit or
    /// builder). Functions are called with dot syntax, so they must not
    /// expect a `self` argument.
    fn install(&self, lua: &Lua, target: &LuaTable) -> LuaResult<()>;

    /// Generates Lua Language Server annotations for the installed functions.
    ///
    /// Stubs describe fields of the capability class; the registry prepends
    /// the class header.
    fn stubs(&self) -> String;

    /// Optional: Returns module metadata
    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata {
            id: self.id(),
            version: "0.1.0",
            description: "",
        }
    }
}

/// Metadata about a capability module
#[derive(Debug, Clone)]
pub struct ModuleMetadata {
    pub id: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

/// Ordered set of modules that together form one capability table
pub struct ModuleRegistry {
    /// LuaLS class name of the table (e.g. `Toolkit`)
    class: &'static str,
    modules: Vec<Box<dyn CapabilityModule>>,
}

impl ModuleRegistry {
    /// Creates a new empty registry for the capability class `class`
    pub fn new(class: &'static str) -> Self {
        Self {
            class,
            modules: Vec::new(),
        }
    }

    pub fn class(&self) -> &'static str {
        self.class
    }

    /// Registers a module
    ///
    /// # Panics
    /// Panics if a module with the same ID is already registered
    pub fn register<M: CapabilityModule + 'static>(&mut self, module: M) {
        let id = module.id();
        if self.modules.iter().any(|m| m.id() == id) {
            panic!("Module with id '{}' is already registered", id);
        }
        self.modules.push(Box::new(module));
    }

    /// Gets a module by its ID
    pub fn get(&self, id: &str) -> Option<&dyn CapabilityModule> {
        self.modules
            .iter()
            .find(|m| m.id() == id)
            .map(|m| m.as_ref())
    }

    pub fn modules(&self) -> &[Box<dyn CapabilityModule>] {
        &self.modules
    }

    /// Builds the capability table with every module installed
    ///
    /// # Errors
    /// Returns the first error encountered during installation
    pub fn build_table(&self, lua: &Lua) -> LuaResult<LuaTable> {
        let table = lua.create_table()?;
        for module in &self.modules {
            module.install(lua, &table)?;
        }
        Ok(table)
    }

    /// Generates the stub section for this capability class
    pub fn generate_stubs(&self) -> String {
        let mut stubs = format!("---@class {}\nlocal {} = {{}}\n\n", self.class, self.class);
        for module in &self.modules {
            stubs.push_str(&module.stubs());
            stubs.push('\n');
        }
        stubs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestModule;

    impl CapabilityModule for TestModule {
        fn id(&self) -> &'static str {
            "test"
        }

        fn install(&self, lua: &Lua, target: &LuaTable) -> LuaResult<()> {
            target.set("answer", lua.create_function(|_, ()| Ok(42))?)?;
            Ok(())
        }

        fn stubs(&self) -> String {
            "---@return integer\nfunction Toolkit.answer() end\n".to_string()
        }
    }

    #[test]
    fn test_module_registration() {
        let mut registry = ModuleRegistry::new("Toolkit");
        registry.register(TestModule);

        assert!(registry.get("test").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_registration() {
        let mut registry = ModuleRegistry::new("Toolkit");
        registry.register(TestModule);
        registry.register(TestModule);
    }

    #[test]
    fn test_build_table_does_not_touch_globals() {
        let mut registry = ModuleRegistry::new("Toolkit");
        registry.register(TestModule);

        let lua = Lua::new();
        let table = registry.build_table(&lua).unwrap();
        lua.globals().set("t", table).unwrap();

        let answer: i32 = lua.load("return t.answer()").eval().unwrap();
        assert_eq!(answer, 42);
        let leaked: bool = lua.load("return answer ~= nil").eval().unwrap();
        assert!(!leaked);
    }

    #[test]
    fn test_stub_generation() {
        let mut registry = ModuleRegistry::new("Toolkit");
        registry.register(TestModule);

        let stubs = registry.generate_stubs();
        assert!(stubs.starts_with("---@class Toolkit"));
        assert!(stubs.contains("function Toolkit.answer() end"));
    }
}

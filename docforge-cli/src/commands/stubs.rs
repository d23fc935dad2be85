//! Stubs command handler
//!
//! Writes the LuaLS stub file describing the artifact API, plus a
//! .luarc.json pointing the language server at it.

use anyhow::{Context, Result};
use colored::*;
use std::fs;
use std::path::Path;

const STUBS_DIR: &str = ".docforge/stubs";

/// Write the stub file and, unless `stubs_only`, the .luarc.json
pub fn write_stubs(output_path: &Path, stubs_only: bool) -> Result<()> {
    if !stubs_only {
        generate_luarc_json(output_path)?;
    }
    generate_stub_file(output_path)?;

    println!("{}", "✓ Lua development files generated!".green().bold());
    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Install Lua Language Server in your editor");
    println!("  2. Open a template's generate.lua to see autocomplete and type hints");
    println!(
        "  3. Use {} to try it",
        "docforge generate --template <id>".cyan()
    );

    Ok(())
}

/// Generate .luarc.json for Lua LSP configuration
fn generate_luarc_json(output_path: &Path) -> Result<()> {
    fs::create_dir_all(output_path)
        .with_context(|| format!("Failed to create output directory {:?}", output_path))?;
    let luarc_path = output_path.join(".luarc.json");

    let luarc_content = format!(
        r#"{{
  "$schema": "https://raw.githubusercontent.com/sumneko/vscode-lua/master/setting/schema.json",
  "runtime": {{
    "version": "Lua 5.4"
  }},
  "diagnostics": {{
    "globals": ["generate"]
  }},
  "workspace": {{
    "library": ["{}"],
    "checkThirdParty": false
  }},
  "completion": {{
    "callSnippet": "Both"
  }}
}}
"#,
        STUBS_DIR
    );

    fs::write(&luarc_path, luarc_content)
        .with_context(|| format!("Failed to write .luarc.json to {:?}", luarc_path))?;

    println!("  {} .luarc.json", "Created".green());

    Ok(())
}

/// Generate the stub file from the live module registries
fn generate_stub_file(output_path: &Path) -> Result<()> {
    let stubs_dir = output_path.join(STUBS_DIR);
    fs::create_dir_all(&stubs_dir)
        .with_context(|| format!("Failed to create stubs directory at {:?}", stubs_dir))?;

    let stub_path = stubs_dir.join("docforge.lua");
    fs::write(&stub_path, docforge_runner::lua::render_stubs())
        .with_context(|| format!("Failed to write stub file {:?}", stub_path))?;

    println!("  {} docforge.lua", "Created".green());
    println!(
        "  {} in {}",
        "Stubs ready".green(),
        stubs_dir.display().to_string().cyan()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_luarc_and_stubs() {
        let dir = tempfile::tempdir().unwrap();
        write_stubs(dir.path(), false).unwrap();

        let luarc = fs::read_to_string(dir.path().join(".luarc.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&luarc).unwrap();
        assert_eq!(parsed["workspace"]["library"][0], STUBS_DIR);

        let stubs = fs::read_to_string(dir.path().join(STUBS_DIR).join("docforge.lua")).unwrap();
        assert!(stubs.contains("toolkit"));
    }

    #[test]
    fn test_stubs_only_skips_luarc() {
        let dir = tempfile::tempdir().unwrap();
        write_stubs(dir.path(), true).unwrap();

        assert!(!dir.path().join(".luarc.json").exists());
        assert!(dir.path().join(STUBS_DIR).join("docforge.lua").exists());
    }
}

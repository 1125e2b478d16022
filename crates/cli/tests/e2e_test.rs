use anyhow::Result;
use clap::Parser;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use treeidx_cli::Cli;

/// A configured deployment with one small C tree.
struct E2ETestHelper {
    temp_dir: TempDir,
    config_path: PathBuf,
}

impl E2ETestHelper {
    fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        let src = root.join("src");
        fs::create_dir_all(src.join("include"))?;
        fs::write(
            src.join("main.c"),
            "#include \"util.h\"\n\nint main(void) {\n  return helper();\n}\n",
        )?;
        fs::write(src.join("include/util.h"), "int helper(void);\n")?;
        fs::write(src.join("icon.png"), [0x89, b'P', b'N', b'G', 0x0d, 0x0a])?;

        let config = json!({
            "www_root": "/code",
            "store_path": root.join("store"),
            "trees": {
                "demo": {
                    "description": "Demo tree",
                    "source_folder": src,
                    "object_folder": root.join("obj"),
                    "temp_folder": root.join("tmp"),
                    "build_command": "true"
                }
            }
        });
        let config_path = root.join("treeidx.json");
        fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;
        Ok(Self {
            temp_dir,
            config_path,
        })
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        let config = self.config_path.to_string_lossy().into_owned();
        let mut argv = vec!["treeidx", "--config", config.as_str()];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv)?.run()
    }

    fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

#[test]
fn test_build_then_query() -> Result<()> {
    let helper = E2ETestHelper::new()?;
    helper.run(&["build"])?;

    helper.run(&["search", "helper"])?;
    helper.run(&["--format", "json", "search", "path:include"])?;
    helper.run(&["--format", "grep", "search", "-t", "demo", "return", "--limit", "5000"])?;
    helper.run(&["browse"])?;
    helper.run(&["browse", "include/util.h"])?;
    helper.run(&["parallel", "demo", "main.c"])?;
    helper.run(&["filters"])?;
    Ok(())
}

#[test]
fn test_raw_writes_image_bytes() -> Result<()> {
    let helper = E2ETestHelper::new()?;
    helper.run(&["build", "demo"])?;

    let out = helper.path().join("out.png");
    let out_arg = out.to_string_lossy().into_owned();
    helper.run(&["raw", "icon.png", "-o", out_arg.as_str()])?;
    assert_eq!(fs::read(&out)?, vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a]);
    Ok(())
}

#[test]
fn test_bad_query_fails() -> Result<()> {
    let helper = E2ETestHelper::new()?;
    helper.run(&["build"])?;
    assert!(helper.run(&["search", "regexp:("]).is_err());
    assert!(helper.run(&["--format", "json", "search", "path:"]).is_err());
    Ok(())
}

#[test]
fn test_unknown_tree_fails() -> Result<()> {
    let helper = E2ETestHelper::new()?;
    assert!(helper.run(&["build", "nope"]).is_err());
    helper.run(&["build"])?;
    assert!(helper.run(&["browse", "-t", "nope"]).is_err());
    Ok(())
}

//! Shared fixtures: a deployment on disk with a C++ tree whose "build"
//! copies pre-made analyzer dumps into the analyzer's output folder.

#![allow(dead_code)]

use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use treeidx::{Config, TreeConfig};

pub const SHAPE_CPP: &str = r#"namespace geom {
class Shape {};
class Circle : public Shape {
  double area();
};
double Circle::area() { return 0; }
}
"#;

pub struct Fixture {
    pub temp: TempDir,
    pub config: Config,
}

impl Fixture {
    /// One tree named `geom` with the clang plugin enabled.
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();

        let plugin_dir = root.join("plugins").join("clang");
        fs::create_dir_all(&plugin_dir).unwrap();
        fs::write(plugin_dir.join("libclang-index-plugin.so"), b"").unwrap();

        let config = json!({
            "www_root": "/dxr",
            "plugin_folder": root.join("plugins"),
            "store_path": root.join("store"),
            "trees": {}
        });
        let config = Config::from_json(&config.to_string()).unwrap();
        let mut fixture = Self { temp, config };
        fixture.add_tree("geom", &["clang"]);
        fixture
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn source(&self, tree: &str) -> PathBuf {
        self.root().join(tree).join("src")
    }

    fn dumps(&self, tree: &str) -> PathBuf {
        self.root().join(tree).join("dumps")
    }

    /// Add a tree whose source holds `shape.cpp` and whose build copies the
    /// dumps folder into the clang output folder.
    pub fn add_tree(&mut self, name: &str, plugins: &[&str]) {
        let src = self.source(name);
        fs::create_dir_all(src.join("include")).unwrap();
        fs::write(src.join("shape.cpp"), SHAPE_CPP).unwrap();
        fs::write(src.join("include").join("shape.h"), "#pragma once\n").unwrap();

        let dumps = self.dumps(name);
        fs::create_dir_all(&dumps).unwrap();
        let f = src.join("shape.cpp");
        let f = f.display();
        let dump = format!(
            concat!(
                "namespace,name,\"geom\",qualname,\"geom\",loc,\"{f}:1:11\"\n",
                "type,name,\"Shape\",qualname,\"geom::Shape\",loc,\"{f}:2:7\",kind,\"class\"\n",
                "type,name,\"Circle\",qualname,\"geom::Circle\",loc,\"{f}:3:7\",kind,\"class\"\n",
                "impl,tcname,\"geom::Circle\",tcloc,\"{f}:3:7\",tbname,\"geom::Shape\",tbloc,\"{f}:2:7\",access,\"public\"\n",
                "ref,qualname,\"geom::Shape\",declloc,\"{f}:2:7\",loc,\"{f}:3:23\",kind,\"type\",extent,60:65\n",
                "function,name,\"area\",qualname,\"geom::Circle::area()\",type,\"double\",args,\"()\",loc,\"{f}:6:16\"\n",
            ),
            f = f
        );
        fs::write(dumps.join("0a1b.2c3d.csv"), dump).unwrap();

        let tree = TreeConfig {
            name: name.to_string(),
            description: format!("The {} tree", name),
            source_folder: src,
            object_folder: self.root().join(name).join("obj"),
            temp_folder: self.root().join(name).join("tmp"),
            plugin_folder: self.root().join("plugins"),
            enabled_plugins: plugins.iter().map(|p| p.to_string()).collect(),
            build_command: Some(format!(
                "[ -z \"$DXR_CXX_CLANG_TEMP_FOLDER\" ] || cp {}/*.csv \"$DXR_CXX_CLANG_TEMP_FOLDER\"/",
                dumps.display()
            )),
            ignore_patterns: vec!["*.o".into()],
        };
        self.config.trees.insert(name.to_string(), tree);
        self.config.normalize();
    }

    pub fn write_source(&self, tree: &str, path: &str, contents: &str) {
        let file = self.source(tree).join(path);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(file, contents).unwrap();
    }

    pub fn write_dump(&self, tree: &str, name: &str, contents: &str) {
        fs::write(self.dumps(tree).join(name), contents).unwrap();
    }

    pub fn remove_analyzer(&self) {
        fs::remove_file(
            self.root()
                .join("plugins")
                .join("clang")
                .join("libclang-index-plugin.so"),
        )
        .unwrap();
    }

    pub fn tree(&self, name: &str) -> &TreeConfig {
        self.config.tree(name).unwrap()
    }
}

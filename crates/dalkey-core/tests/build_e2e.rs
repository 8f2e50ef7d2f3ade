//! End-to-end build tests over a real project layout on disk.

use dalkey_core::plugin::{
    HookResult, Plugin, PluginContainer, PluginContext, ReplacePlugin, TransformResult,
    VirtualPlugin,
};
use dalkey_core::{BuildEngine, Config, ModuleOutput};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

fn write_project(root: &std::path::Path, files: &[(&str, &str)]) {
    for (path, contents) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, contents).unwrap();
    }
}

#[test]
fn test_two_module_project_builds_and_hooks_fire() {
    let dir = tempdir().unwrap();
    write_project(
        dir.path(),
        &[
            (
                "src/index.ts",
                "import { greet } from \"./util\";\nconsole.log(greet());\n",
            ),
            (
                "src/util.ts",
                "export function greet() { return \"hi\"; }\n",
            ),
        ],
    );

    #[derive(Default)]
    struct HookLog {
        build_start: Mutex<u32>,
        build_end_modules: Mutex<usize>,
        close_bundle: Mutex<u32>,
    }

    struct Observer(Arc<HookLog>);
    impl Plugin for Observer {
        fn name(&self) -> &str {
            "observer"
        }
        fn build_start(&self, _ctx: &PluginContext) -> HookResult<()> {
            *self.0.build_start.lock().unwrap() += 1;
            Ok(())
        }
        fn build_end(
            &self,
            outputs: &HashMap<String, ModuleOutput>,
            _ctx: &PluginContext,
        ) -> HookResult<()> {
            *self.0.build_end_modules.lock().unwrap() = outputs.len();
            Ok(())
        }
        fn close_bundle(&self, _ctx: &PluginContext) -> HookResult<()> {
            *self.0.close_bundle.lock().unwrap() += 1;
            Ok(())
        }
    }

    let mut config = Config::new(dir.path().to_path_buf());
    config.entries = vec![PathBuf::from("src/index.ts")];
    let config = Arc::new(config);

    let log = Arc::new(HookLog::default());
    let mut plugins = PluginContainer::new(Arc::clone(&config));
    plugins.add(Box::new(Observer(Arc::clone(&log))));

    let engine = BuildEngine::new(config, plugins).unwrap();
    let summary = engine.build().unwrap();

    assert_eq!(summary.modules, 2);
    assert_eq!(*log.build_start.lock().unwrap(), 1);
    assert_eq!(*log.build_end_modules.lock().unwrap(), 2);
    assert_eq!(*log.close_bundle.lock().unwrap(), 1);

    // Outputs mirror the source layout with .ts rewritten to .js.
    let index_out = dir.path().join("dist/src/index.js");
    let util_out = dir.path().join("dist/src/util.js");
    assert!(index_out.is_file());
    assert!(util_out.is_file());
    assert!(std::fs::read_to_string(util_out)
        .unwrap()
        .contains("greet"));
}

#[test]
fn test_define_replacements_apply_during_build() {
    let dir = tempdir().unwrap();
    write_project(
        dir.path(),
        &[("main.ts", "if (__DEV__) { console.log(\"dev\"); }\n")],
    );

    let mut config = Config::new(dir.path().to_path_buf());
    config.entries = vec![PathBuf::from("main.ts")];
    let config = Arc::new(config);

    let mut plugins = PluginContainer::new(Arc::clone(&config));
    plugins.add(Box::new(ReplacePlugin::new().replace("__DEV__", "false")));

    let engine = BuildEngine::new(config, plugins).unwrap();
    engine.build().unwrap();

    let out = std::fs::read_to_string(dir.path().join("dist/main.js")).unwrap();
    assert!(out.contains("if (false)"));
    assert!(!out.contains("__DEV__"));
}

#[test]
fn test_virtual_modules_participate_in_the_graph() {
    let dir = tempdir().unwrap();
    write_project(
        dir.path(),
        &[(
            "main.ts",
            "import { mode } from \"virtual:env\";\nconsole.log(mode);\n",
        )],
    );

    let mut config = Config::new(dir.path().to_path_buf());
    config.entries = vec![PathBuf::from("main.ts")];
    let config = Arc::new(config);

    let mut plugins = PluginContainer::new(Arc::clone(&config));
    plugins.add(Box::new(
        VirtualPlugin::new().module("env", "export const mode = \"development\";"),
    ));

    let engine = BuildEngine::new(config, plugins).unwrap();
    let summary = engine.build().unwrap();

    // The virtual module is in the graph but never written to disk.
    assert_eq!(summary.modules, 2);
    assert_eq!(summary.outputs_written, 1);
}

#[test]
fn test_transform_chain_order_is_plugin_order() {
    let dir = tempdir().unwrap();
    write_project(dir.path(), &[("main.ts", "START\n")]);

    struct Append(&'static str);
    impl Plugin for Append {
        fn name(&self) -> &str {
            "append"
        }
        fn transform(
            &self,
            code: &str,
            _id: &str,
            _ctx: &PluginContext,
        ) -> HookResult<Option<TransformResult>> {
            Ok(Some(TransformResult::code(format!(
                "{}{}\n",
                code, self.0
            ))))
        }
    }

    let mut config = Config::new(dir.path().to_path_buf());
    config.entries = vec![PathBuf::from("main.ts")];
    let config = Arc::new(config);

    let mut plugins = PluginContainer::new(Arc::clone(&config));
    plugins.add(Box::new(Append("FIRST")));
    plugins.add(Box::new(Append("SECOND")));

    let engine = BuildEngine::new(config, plugins).unwrap();
    engine.build().unwrap();

    let out = std::fs::read_to_string(dir.path().join("dist/main.js")).unwrap();
    let first = out.find("FIRST").unwrap();
    let second = out.find("SECOND").unwrap();
    assert!(first < second);
}

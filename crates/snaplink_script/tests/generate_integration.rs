//! End-to-end generation against on-disk fixtures.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use snaplink_cache::{fingerprint, CacheRecord, TransformCache};
use snaplink_graph::{HookError, ModuleRequest, TranspileOutput};
use snaplink_script::{
    generate_snapshot_script, GenerateOptions, RowIndex, SnapshotArtifact, TranslatedRow,
    EMBEDDED, SECTIONS_FIELD,
};

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

/// `project/index.js` requiring a local module, a JSON file and a package.
fn project(root: &Path) -> PathBuf {
    let project = root.join("project");
    write(
        &project,
        "index.js",
        "const a = require('./dir/a')\nconst b = require('b')\nglobal.initialize = () => a + b()\n",
    );
    write(
        &project,
        "dir/a.js",
        "// a\nmodule.exports = 'a' + require('./c.json').value\n",
    );
    write(&project, "dir/c.json", "{\"value\": \"c\"}\n");
    write(
        &project,
        "node_modules/b/package.json",
        "{\"main\": \"lib/main.js\"}",
    );
    write(
        &project,
        "node_modules/b/lib/main.js",
        "const path = require('path')\nmodule.exports = () => 'b' + path.sep\n",
    );
    project
}

fn generate(cache_root: &Path, key: &str, options: GenerateOptions<'_>) -> SnapshotArtifact {
    let mut cache = TransformCache::load_or_create(cache_root, key).unwrap();
    let artifact = generate_snapshot_script(&mut cache, options).unwrap();
    cache.dispose().unwrap();
    artifact
}

fn relative_paths(artifact: &SnapshotArtifact) -> Vec<&str> {
    artifact
        .row_index
        .ranges()
        .iter()
        .map(|r| r.relative_path.as_str())
        .collect()
}

fn auxiliary_data(script: &str) -> Value {
    let line = script
        .lines()
        .find_map(|l| l.strip_prefix("var snapshotAuxiliaryData = "))
        .unwrap();
    serde_json::from_str(line.trim_end_matches(';')).unwrap()
}

#[test]
fn embeds_reachable_modules_in_pre_order() {
    let dir = tempfile::tempdir().unwrap();
    let project = project(dir.path());

    let artifact = generate(
        &dir.path().join("cache"),
        "v1",
        GenerateOptions::new(&project, "index.js").platform("linux"),
    );

    assert_eq!(
        artifact.included_file_paths.iter().cloned().collect::<Vec<_>>(),
        vec![
            project.join("index.js"),
            project.join("dir/a.js"),
            project.join("dir/c.json"),
            project.join("node_modules/b/lib/main.js"),
        ]
    );
    assert_eq!(
        relative_paths(&artifact),
        vec![
            "./index.js",
            "./dir/a.js",
            "./dir/c.json",
            "./node_modules/b/lib/main.js",
        ]
    );

    let script = &artifact.snapshot_script;
    assert!(script.contains("  }, {\"./dir/a\":\"./dir/a.js\",\"b\":\"./node_modules/b/lib/main.js\"});"));
    assert!(script.contains("module.exports = {\"value\": \"c\"}\n"));
    assert!(script.contains("  }, {\"path\":\"path\"});"));
    assert!(script.contains("\n  customRequire(\"./index.js\")\n"));
}

#[test]
fn keys_are_relative_to_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    let project = project(dir.path());
    let base = dir.path().join("test");
    fs::create_dir_all(&base).unwrap();

    let artifact = generate(
        &dir.path().join("cache"),
        "v1",
        GenerateOptions::new(&base, project.join("index.js")),
    );
    assert_eq!(relative_paths(&artifact)[0], "../project/index.js");
    assert_eq!(relative_paths(&artifact)[1], "../project/dir/a.js");
    assert!(artifact
        .snapshot_script
        .contains("\n  customRequire(\"../project/index.js\")\n"));
}

#[test]
fn cold_generations_are_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let project = project(dir.path());
    let aux = json!({"z": 1, "a": [true, null]});

    let first = generate(
        &dir.path().join("cache-1"),
        "v1",
        GenerateOptions::new(&project, "index.js").auxiliary_data(aux.clone()),
    );
    let second = generate(
        &dir.path().join("cache-2"),
        "v1",
        GenerateOptions::new(&project, "index.js").auxiliary_data(aux),
    );

    assert_eq!(first.snapshot_script, second.snapshot_script);
    assert_eq!(first.included_file_paths, second.included_file_paths);
    assert_eq!(first.row_index, second.row_index);
}

#[test]
fn warm_generation_matches_cold_generation() {
    let dir = tempfile::tempdir().unwrap();
    let project = project(dir.path());
    let cache_root = dir.path().join("cache");

    let cold = generate(&cache_root, "v1", GenerateOptions::new(&project, "index.js"));
    let warm = generate(&cache_root, "v1", GenerateOptions::new(&project, "index.js"));
    assert_eq!(cold.snapshot_script, warm.snapshot_script);
}

#[test]
fn overwritten_record_is_embedded_verbatim_and_halts_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let project = project(dir.path());
    let cache_root = dir.path().join("cache");
    generate(&cache_root, "v1", GenerateOptions::new(&project, "index.js"));

    let index = project.join("index.js");
    let mut cache = TransformCache::load_or_create(&cache_root, "v1").unwrap();
    cache
        .put(&CacheRecord {
            path: index.clone(),
            original: fs::read_to_string(&index).unwrap(),
            transformed: "global.initialize = () => \"cached\"".to_string(),
            requires: Vec::new(),
            source_map: None,
        })
        .unwrap();
    let artifact =
        generate_snapshot_script(&mut cache, GenerateOptions::new(&project, "index.js")).unwrap();
    cache.dispose().unwrap();

    assert_eq!(
        artifact.included_file_paths.iter().cloned().collect::<Vec<_>>(),
        vec![index]
    );
    let lines: Vec<&str> = artifact.snapshot_script.lines().collect();
    let range = &artifact.row_index.ranges()[0];
    assert_eq!(range.start_row, range.end_row);
    assert_eq!(
        lines[range.start_row],
        "global.initialize = () => \"cached\""
    );
}

#[test]
fn namespaces_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let project = project(dir.path());
    let cache_root = dir.path().join("cache");
    let calls = RefCell::new(0usize);
    let counting = |_: &ModuleRequest<'_>, _: &str| -> Result<Option<TranspileOutput>, HookError> {
        *calls.borrow_mut() += 1;
        Ok(None)
    };

    generate(
        &cache_root,
        "k1",
        GenerateOptions::new(&project, "index.js").transpiler(&counting),
    );
    // JSON files bypass the transpiler.
    assert_eq!(*calls.borrow(), 3);

    generate(
        &cache_root,
        "k1",
        GenerateOptions::new(&project, "index.js").transpiler(&counting),
    );
    assert_eq!(*calls.borrow(), 3);

    generate(
        &cache_root,
        "k2",
        GenerateOptions::new(&project, "index.js").transpiler(&counting),
    );
    assert_eq!(*calls.borrow(), 6);

    let k1 = TransformCache::load_or_create(&cache_root, "k1").unwrap();
    let k2 = TransformCache::load_or_create(&cache_root, "k2").unwrap();
    assert_eq!(k1.persisted_keys().len(), 4);
    assert_eq!(k2.persisted_keys().len(), 4);
    assert!(k1.persisted_keys().is_disjoint(&k2.persisted_keys()));
}

#[test]
fn dispose_keeps_exactly_the_touched_records() {
    let dir = tempfile::tempdir().unwrap();
    let project = project(dir.path());
    let cache_root = dir.path().join("cache");
    generate(&cache_root, "v1", GenerateOptions::new(&project, "index.js"));

    let index = project.join("index.js");
    let trimmed = "global.initialize = () => require('./dir/a')\n";
    fs::write(&index, trimmed).unwrap();

    let mut cache = TransformCache::load_or_create(&cache_root, "v1").unwrap();
    generate_snapshot_script(&mut cache, GenerateOptions::new(&project, "index.js")).unwrap();
    let touched = cache.touched_keys().clone();
    cache.dispose().unwrap();

    let key = |rel: &str, content: &str| fingerprint("v1", &project.join(rel), content).to_string();
    let expected: std::collections::BTreeSet<String> = [
        key("index.js", trimmed),
        key(
            "dir/a.js",
            "// a\nmodule.exports = 'a' + require('./c.json').value\n",
        ),
        key("dir/c.json", "{\"value\": \"c\"}\n"),
    ]
    .into_iter()
    .collect();

    let reopened = TransformCache::load_or_create(&cache_root, "v1").unwrap();
    assert_eq!(reopened.persisted_keys(), expected);
    assert_eq!(touched, expected);
}

#[test]
fn cyclic_graph_embeds_each_module_once() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("cyclic");
    write(
        &root,
        "a.js",
        "exports.a = 'a'\nrequire('./b')\nrequire('./c')\n",
    );
    write(&root, "b.js", "exports.b = 'b'\nrequire('./d')\nrequire('./e')\n");
    write(&root, "c.js", "exports.c = require('./a').a\nrequire('./d')\n");
    write(&root, "d.js", "exports.d = 'd'\n");
    write(&root, "e.js", "exports.e = 'e'\n");
    let exclude = |req: &ModuleRequest<'_>| {
        req.relative_path.ends_with("d.js") || req.relative_path.ends_with("e.js")
    };

    let artifact = generate(
        &dir.path().join("cache"),
        "v1",
        GenerateOptions::new(&root, "a.js").exclusion(&exclude),
    );

    assert_eq!(
        artifact.included_file_paths.iter().cloned().collect::<Vec<_>>(),
        vec![root.join("a.js"), root.join("b.js"), root.join("c.js")]
    );
    let script = &artifact.snapshot_script;
    assert_eq!(script.matches("  customRequire.define(").count(), 3);
    assert!(!script.contains("customRequire.define(\"./d.js\""));
    assert!(!script.contains("customRequire.define(\"./e.js\""));
    assert!(script.contains("  }, {\"./d\":\"./d.js\",\"./e\":\"./e.js\"});"));
    assert!(script.contains("  }, {\"./a\":\"./a.js\",\"./d\":\"./d.js\"});"));
    // Placeholder exports are cached before the body runs.
    let placeholder = script.find("customRequire.cache[key] = module").unwrap();
    let body_call = script.find("definition.body.call(").unwrap();
    assert!(placeholder < body_call);
}

#[test]
fn row_translation_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let project = project(dir.path());
    let artifact = generate(
        &dir.path().join("cache"),
        "v1",
        GenerateOptions::new(&project, "index.js"),
    );
    let index = &artifact.row_index;
    let total_rows = artifact.snapshot_script.lines().count();

    for range in index.ranges() {
        let path = project.join(range.relative_path.trim_start_matches("./"));
        let original = fs::read_to_string(path).unwrap();
        let original_rows = original.trim_end_matches('\n').split('\n').count();
        assert_eq!(range.end_row - range.start_row + 1, original_rows);
        for offset in 0..original_rows {
            assert_eq!(
                index.translate(range.start_row + offset),
                TranslatedRow {
                    relative_path: range.relative_path.clone(),
                    row: offset,
                }
            );
        }
    }

    let covered: usize = index
        .ranges()
        .iter()
        .map(|r| r.end_row - r.start_row + 1)
        .sum();
    let embedded = (0..total_rows)
        .filter(|&row| index.translate(row).relative_path == EMBEDDED)
        .count();
    assert_eq!(covered + embedded, total_rows);
    assert_eq!(index.translate(0).relative_path, EMBEDDED);
    assert_eq!(index.translate(total_rows - 1).relative_path, EMBEDDED);

    assert_eq!(&RowIndex::from_script(&artifact.snapshot_script).unwrap(), index);
}

#[test]
fn auxiliary_data_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let project = project(dir.path());
    let aux = json!({
        "nested": {"list": [1, 2.5, "three", {"four": [null, false]}]},
        "unicode": "snapshot \u{2028} ✓",
        "empty": {}
    });

    let artifact = generate(
        &dir.path().join("cache"),
        "v1",
        GenerateOptions::new(&project, "index.js").auxiliary_data(aux.clone()),
    );

    let mut embedded = auxiliary_data(&artifact.snapshot_script);
    let sections = embedded
        .as_object_mut()
        .unwrap()
        .remove(SECTIONS_FIELD)
        .unwrap();
    assert_eq!(embedded, aux);
    assert_eq!(sections, serde_json::to_value(&artifact.row_index).unwrap());
}

#[test]
fn null_auxiliary_data_holds_only_sections() {
    let dir = tempfile::tempdir().unwrap();
    let project = project(dir.path());
    let artifact = generate(
        &dir.path().join("cache"),
        "v1",
        GenerateOptions::new(&project, "index.js"),
    );
    let embedded = auxiliary_data(&artifact.snapshot_script);
    let keys: Vec<&String> = embedded.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec![SECTIONS_FIELD]);
}

#[test]
fn transpiled_rows_map_through_source_maps() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("ts");
    write(&root, "main.js", "one\ntwo\n");
    let transpile =
        |req: &ModuleRequest<'_>, source: &str| -> Result<Option<TranspileOutput>, HookError> {
            assert_eq!(req.relative_path, "./main.js");
            Ok(Some(TranspileOutput {
                code: format!("\"use strict\";\n{source}"),
                source_map: Some(
                    r#"{"version":3,"sources":["main.ts"],"names":[],"mappings":"AAAA;AAAA;AACA"}"#
                        .to_string(),
                ),
            }))
        };

    let artifact = generate(
        &dir.path().join("cache"),
        "v1",
        GenerateOptions::new(&root, "main.js").transpiler(&transpile),
    );

    let range = &artifact.row_index.ranges()[0];
    assert_eq!(range.end_row - range.start_row, 2);
    let rows: Vec<usize> = (range.start_row..=range.end_row)
        .map(|r| artifact.row_index.translate(r).row)
        .collect();
    assert_eq!(rows, vec![0, 0, 1]);
    assert_eq!(range.original_rows, Some(vec![0, 0, 1]));
    assert!(artifact
        .snapshot_script
        .contains("\"originalRows\":[0,0,1]"));
}

#[test]
fn unresolvable_require_aborts_generation() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("broken");
    write(&root, "main.js", "require('./nowhere')\n");

    let mut cache = TransformCache::load_or_create(&dir.path().join("cache"), "v1").unwrap();
    let err = generate_snapshot_script(&mut cache, GenerateOptions::new(&root, "main.js"))
        .unwrap_err();
    assert!(err.to_string().contains("./nowhere"));
    assert!(err.to_string().contains("main.js"));
}

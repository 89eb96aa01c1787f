//! Renders walked modules into one snapshot script.
//!
//! Layout of the output, top to bottom:
//!
//! 1. Prologue: `function generateSnapshot () {`, placeholder ambient
//!    bindings and the `customRequire` loader.
//! 2. One `customRequire.define(...)` block per module in visit order. The
//!    module's code, with `import`/`export` syntax lowered by
//!    [`lower_module_syntax`], is copied line for line between the opening
//!    and closing lines of the block, and those rows form the module's
//!    [`RowRange`].
//! 3. Epilogue: `setGlobals`, `translateSnapshotRow`, the call that runs the
//!    entry module, then the global `snapshotAuxiliaryData` and
//!    `snapshotResult` bindings.
//!
//! Output depends only on the modules and [`AssemblerOptions`].

use serde::Serialize;
use serde_json::{Map, Value};
use snaplink_graph::ModuleNode;

use crate::error::ScriptError;
use crate::esm::lower_module_syntax;
use crate::row_index::{RowIndex, RowRange, SECTIONS_FIELD};
use crate::source_map::SourceMap;

const PLATFORM_PLACEHOLDER: &str = "__SNAPLINK_PLATFORM__";

/// Runtime shim preceding the module blocks.
///
/// A module's first `customRequire` installs `{exports: {}}` in the cache
/// before running its body, so a circular require sees the in-progress
/// exports. Keys with no definition are loaded through the host `require`
/// and memoized in the same cache.
///
/// The host `require` only exists once `setGlobals` has run. Until then a
/// module requiring a delegated key gets a deferred binding: a proxy that
/// loads the key on first use. Using it while the snapshot builds throws.
/// Deferred bindings report `typeof` as `"function"`.
///
/// Module bodies receive their module key as `__filename` and the key's
/// directory as `__dirname`, both relative to the base directory.
const PROLOGUE: &str = r#"// Snapshot script generated by snaplink. Do not edit.
function generateSnapshot () {
  let global = {}
  let process = {platform: __SNAPLINK_PLATFORM__, env: {}, argv: [], versions: {}}
  let window = {}
  let document = {}
  let console = {log: noop, info: noop, warn: noop, error: noop, debug: noop, trace: noop}
  let require = function (moduleName) {
    throw new Error('Cannot require "' + moduleName + '" before snapshotResult.setGlobals is called.')
  }
  let globalsSet = false
  const deferredModules = new WeakSet()

  function noop () {}

  function dirnameOf (key) {
    const slash = key.lastIndexOf('/')
    return slash === -1 ? '.' : key.slice(0, slash)
  }

  function customRequire (key) {
    let module = customRequire.cache[key]
    if (module === undefined) {
      const definition = customRequire.definitions[key]
      module = {exports: {}}
      customRequire.cache[key] = module
      try {
        if (definition === undefined) {
          module.exports = require(key)
        } else {
          definition.body.call(module.exports, module.exports, module, key, dirnameOf(key), definition.require)
        }
      } catch (error) {
        delete customRequire.cache[key]
        throw error
      }
    }
    return module.exports
  }

  customRequire.cache = Object.create(null)
  customRequire.definitions = Object.create(null)
  customRequire.deferred = Object.create(null)
  customRequire.define = function (key, body, dependencies) {
    function moduleRequire (specifier) {
      if (Object.prototype.hasOwnProperty.call(dependencies, specifier)) {
        const target = dependencies[specifier]
        if (!globalsSet && customRequire.definitions[target] === undefined) {
          return deferredModule(target)
        }
        return customRequire(target)
      }
      return require(specifier)
    }
    customRequire.definitions[key] = {body, require: moduleRequire}
  }

  function deferredModule (key) {
    let binding = customRequire.deferred[key]
    if (binding === undefined) {
      const load = function () {
        if (!globalsSet) {
          throw new Error('Cannot use "' + key + '" before snapshotResult.setGlobals is called.')
        }
        return customRequire(key)
      }
      binding = new Proxy(function () { 'use strict' }, {
        get: (target, property) => load()[property],
        set: (target, property, value) => {
          load()[property] = value
          return true
        },
        has: (target, property) => property in load(),
        apply: (target, thisArg, args) => Reflect.apply(load(), thisArg, args),
        construct: (target, args) => Reflect.construct(load(), args)
      })
      deferredModules.add(binding)
      customRequire.deferred[key] = binding
    }
    return binding
  }

  function __snaplinkDefault (exports) {
    if (deferredModules.has(exports) || !(exports && exports.__esModule)) {
      return exports
    }
    return exports.default
  }

  function __snaplinkExport (exports, getters) {
    Object.defineProperty(exports, '__esModule', {value: true})
    for (const name of Object.keys(getters)) {
      Object.defineProperty(exports, name, {enumerable: true, configurable: true, get: getters[name]})
    }
  }

  function __snaplinkExportStar (exports, source) {
    for (const name of Object.keys(source)) {
      if (name !== 'default' && !Object.prototype.hasOwnProperty.call(exports, name)) {
        Object.defineProperty(exports, name, {enumerable: true, configurable: true, get: () => source[name]})
      }
    }
  }
"#;

/// Shim between the last module block and the entry call.
const EPILOGUE: &str = r#"
  function copyOwnProperties (from, to) {
    for (const key of Object.keys(from)) {
      to[key] = from[key]
    }
  }

  function setGlobals (newGlobal, newProcess, newWindow, newDocument, newConsole, nodeRequire) {
    copyOwnProperties(global, newGlobal)
    copyOwnProperties(window, newWindow)
    copyOwnProperties(document, newDocument)
    global = newGlobal
    process = newProcess
    window = newWindow
    document = newDocument
    console = newConsole
    require = nodeRequire
    globalsSet = true
  }

  const snapshotSections = snapshotAuxiliaryData.snapshotSections

  function translateSnapshotRow (row) {
    let low = 0
    let high = snapshotSections.length - 1
    while (low <= high) {
      const mid = (low + high) >> 1
      const section = snapshotSections[mid]
      if (row < section.startRow) {
        high = mid - 1
      } else if (row > section.endRow) {
        low = mid + 1
      } else {
        const offset = row - section.startRow
        return {relativePath: section.relativePath, row: section.originalRows ? section.originalRows[offset] : offset}
      }
    }
    return {relativePath: '<embedded>', row}
  }
"#;

/// Rendering options.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblerOptions {
    /// Value of `process.platform` while the snapshot is built.
    pub platform: String,
    /// Caller data exposed as `snapshotAuxiliaryData`; an object or null.
    pub auxiliary_data: Value,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            platform: host_platform().to_string(),
            auxiliary_data: Value::Null,
        }
    }
}

/// The running platform under the name the script runtime uses for it.
pub fn host_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

/// Accumulates script text and counts emitted rows.
#[derive(Default)]
struct ScriptWriter {
    text: String,
    rows: usize,
}

impl ScriptWriter {
    fn line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
        self.rows += 1;
    }

    fn block(&mut self, block: &str) {
        for line in block.lines() {
            self.line(line);
        }
    }

    /// Row the next line will occupy.
    fn next_row(&self) -> usize {
        self.rows
    }
}

/// Renders the snapshot script.
pub struct ScriptAssembler<'a> {
    options: &'a AssemblerOptions,
}

impl<'a> ScriptAssembler<'a> {
    /// Creates an assembler.
    pub fn new(options: &'a AssemblerOptions) -> Self {
        Self { options }
    }

    /// Renders `modules` in order and runs `main_key` at build time.
    ///
    /// Returns the script text and the row index of its module bodies.
    pub fn assemble(
        &self,
        modules: &[ModuleNode],
        main_key: &str,
    ) -> Result<(String, RowIndex), ScriptError> {
        if !modules.iter().any(|m| m.relative_path == main_key) {
            return Err(ScriptError::MissingEntry {
                key: main_key.to_string(),
            });
        }
        let mut auxiliary = match &self.options.auxiliary_data {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(ScriptError::AuxiliaryData {
                    found: json_type(other),
                })
            }
        };

        let mut writer = ScriptWriter::default();
        writer.block(&PROLOGUE.replace(
            PLATFORM_PLACEHOLDER,
            &js_literal(&self.options.platform)?,
        ));

        let mut index = RowIndex::new();
        for node in modules {
            let range = write_module(&mut writer, node)?;
            index.push(range)?;
        }

        writer.block(EPILOGUE);
        writer.line("");
        writer.line(&format!("  customRequire({})", js_literal(main_key)?));
        writer.line("");
        writer.line("  return {customRequire, setGlobals, translateSnapshotRow}");
        writer.line("}");
        writer.line("");

        auxiliary.insert(SECTIONS_FIELD.to_string(), serde_json::to_value(&index)?);
        writer.line(&format!(
            "var snapshotAuxiliaryData = {};",
            js_literal(&auxiliary)?
        ));
        writer.line("var snapshotResult = generateSnapshot.call({});");

        log::debug!(
            "assembled {} module(s) into {} row(s)",
            modules.len(),
            writer.rows
        );
        Ok((writer.text, index))
    }
}

/// Emits one module block and returns the rows of its body.
fn write_module(writer: &mut ScriptWriter, node: &ModuleNode) -> Result<RowRange, ScriptError> {
    let source_map = node
        .source_map
        .as_deref()
        .map(SourceMap::parse)
        .transpose()
        .map_err(|source| ScriptError::SourceMap {
            key: node.relative_path.clone(),
            source,
        })?;
    let code = lower_module_syntax(&node.transformed_code).map_err(|source| {
        ScriptError::ModuleSyntax {
            key: node.relative_path.clone(),
            source,
        }
    })?;

    writer.line(&format!(
        "  customRequire.define({}, function (exports, module, __filename, __dirname, require) {{",
        js_literal(&node.relative_path)?
    ));
    let start_row = writer.next_row();
    for line in body_lines(&code) {
        writer.line(line);
    }
    let end_row = writer.next_row() - 1;

    let dependencies: Map<String, Value> = node
        .dependencies
        .iter()
        .map(|dep| (dep.specifier.clone(), Value::from(dep.target.key())))
        .collect();
    writer.line(&format!("  }}, {});", js_literal(&dependencies)?));

    Ok(RowRange::new(
        start_row,
        end_row,
        &node.relative_path,
        source_map,
    ))
}

/// Splits code into the lines copied into a module body. A single trailing
/// newline does not start a line; empty code is one empty line.
fn body_lines(code: &str) -> impl Iterator<Item = &str> {
    let code = code.strip_suffix('\n').unwrap_or(code);
    code.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
}

/// Renders `value` as a single-line JS literal.
fn js_literal<T: Serialize + ?Sized>(value: &T) -> Result<String, ScriptError> {
    Ok(serde_json::to_string(value)?
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029"))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

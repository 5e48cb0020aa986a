//! Source-to-source compiler for TSX component modules.
//!
//! [`Compiler::compile`] parses with swc, lowers JSX to classic runtime
//! calls, strips TypeScript and rewrites `import`/`export` into
//! `require`/`exports` for the host's sandbox loader. Syntax and transform
//! errors never escape: they turn into a module that renders the message.
//! Native builds also recover from internal panics. On wasm32 a panic
//! aborts the instance instead, so the host's worker must be restarted.

mod modules;

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::string::FromUtf8Error;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use swc_core::common::comments::SingleThreadedComments;
use swc_core::common::errors::{HANDLER, Handler};
use swc_core::common::sync::Lrc;
use swc_core::common::{FileName, GLOBALS, Globals, Mark, SourceMap, Spanned};
use swc_core::ecma::ast::{EsVersion, Program};
use swc_core::ecma::codegen::text_writer::JsWriter;
use swc_core::ecma::codegen::{Config as CodegenConfig, Emitter};
use swc_core::ecma::parser::error::Error as ParseError;
use swc_core::ecma::parser::lexer::Lexer;
use swc_core::ecma::parser::{Parser, StringInput, Syntax, TsSyntax};
use swc_core::ecma::transforms::base::fixer::fixer;
use swc_core::ecma::transforms::base::hygiene::hygiene;
use swc_core::ecma::transforms::base::resolver;
use swc_core::ecma::transforms::react::{Options as ReactOptions, Runtime, react};
use swc_core::ecma::transforms::typescript::strip;
use thiserror::Error;

use self::modules::ModuleRewriter;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

/// Marker embedded in every fallback module.
pub const COMPILE_ERROR_MARKER: &str = "__VECTRA_COMPILE_ERROR__";

/// Source files and hygiene marks accumulate in the retained state; it is
/// rebuilt after this many compiles.
const RECYCLE_AFTER: u64 = 256;

/// Errors raised while transpiling. Never surfaced to the host.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{message} (line {line}, column {column})")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("{0}")]
    Transform(String),

    #[error("{0} are not supported")]
    Unsupported(&'static str),

    #[error("Failed to emit output: {0}")]
    Emit(#[from] io::Error),

    #[error("Emitted output is not UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("Internal compiler error: {0}")]
    Internal(String),
}

/// Compiler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Function called for each JSX element.
    pub pragma: String,
    /// Tag used for `<>...</>` fragments.
    pub pragma_frag: String,
    /// Object receiving exports.
    pub exports_ident: String,
    /// Function used to load imports.
    pub require_ident: String,
    /// Rewrite `import`/`export` for the loader. When off, module syntax is
    /// kept and only types and JSX are lowered.
    pub rewrite_modules: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            pragma: "React.createElement".to_string(),
            pragma_frag: "React.Fragment".to_string(),
            exports_ident: "exports".to_string(),
            require_ident: "require".to_string(),
            rewrite_modules: true,
        }
    }
}

/// Counters kept across compilations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileStats {
    pub compiles: u64,
    pub failures: u64,
    /// Times the retained source map and globals were rebuilt.
    pub resets: u64,
}

/// Persistent compiler instance.
///
/// Holds one swc source map and one set of hygiene globals across calls.
pub struct Compiler {
    options: CompilerOptions,
    cm: Lrc<SourceMap>,
    globals: Globals,
    since_reset: u64,
    stats: CompileStats,
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("options", &self.options)
            .field("since_reset", &self.since_reset)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompilerOptions::default())
    }
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            cm: Lrc::default(),
            globals: Globals::new(),
            since_reset: 0,
            stats: CompileStats::default(),
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn stats(&self) -> CompileStats {
        self.stats
    }

    /// Compile a module. Blank input yields an empty string; failures yield
    /// a fallback module carrying [`COMPILE_ERROR_MARKER`].
    pub fn compile(&mut self, source: &str) -> String {
        if source.trim().is_empty() {
            return String::new();
        }
        if self.since_reset >= RECYCLE_AFTER {
            self.reset();
        }
        self.stats.compiles += 1;
        self.since_reset += 1;
        let started = Instant::now();

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.transpile(source)))
            .unwrap_or_else(|payload| Err(CompileError::Internal(panic_message(payload.as_ref()))));

        match result {
            Ok(output) => {
                log::debug!(
                    "Compiled {} bytes in {:?}",
                    source.len(),
                    started.elapsed()
                );
                output
            }
            Err(err) => {
                self.stats.failures += 1;
                if matches!(err, CompileError::Internal(_)) {
                    self.reset();
                }
                log::warn!("Compile failed: {err}");
                fallback_module(&err.to_string(), &self.options)
            }
        }
    }

    fn reset(&mut self) {
        log::debug!("Rebuilding compiler state after {} compiles", self.since_reset);
        self.cm = Lrc::default();
        self.globals = Globals::new();
        self.since_reset = 0;
        self.stats.resets += 1;
    }

    fn transpile(&self, source: &str) -> Result<String, CompileError> {
        let fm = self.cm.new_source_file(
            FileName::Custom("component.tsx".into()).into(),
            source.to_string(),
        );
        let comments = SingleThreadedComments::default();
        let diagnostics = Diagnostics::default();
        let handler =
            Handler::with_emitter_writer(Box::new(diagnostics.clone()), Some(self.cm.clone()));

        GLOBALS.set(&self.globals, || {
            HANDLER.set(&handler, || {
                let lexer = Lexer::new(
                    Syntax::Typescript(TsSyntax {
                        tsx: true,
                        decorators: true,
                        ..Default::default()
                    }),
                    EsVersion::latest(),
                    StringInput::from(&*fm),
                    Some(&comments),
                );
                let mut parser = Parser::new_from(lexer);
                let parsed = parser.parse_program();
                if let Some(err) = parser.take_errors().into_iter().next() {
                    return Err(syntax_error(&self.cm, err));
                }
                let mut program = parsed.map_err(|err| syntax_error(&self.cm, err))?;

                let unresolved_mark = Mark::new();
                let top_level_mark = Mark::new();
                program.mutate(resolver(unresolved_mark, top_level_mark, true));
                // JSX goes first so the pragma counts as a use of its import.
                program.mutate(react(
                    self.cm.clone(),
                    Some(comments.clone()),
                    self.react_options(),
                    top_level_mark,
                    unresolved_mark,
                ));
                program.mutate(strip(unresolved_mark, top_level_mark));
                program.mutate(hygiene());
                if handler.has_errors() {
                    return Err(CompileError::Transform(diagnostics.take()));
                }

                if self.options.rewrite_modules {
                    if let Program::Module(module) = &mut program {
                        ModuleRewriter::new(&self.cm, &self.options).rewrite(module)?;
                    }
                }
                program.mutate(fixer(Some(&comments)));

                self.emit(&program, &comments)
            })
        })
    }

    fn react_options(&self) -> ReactOptions {
        ReactOptions {
            runtime: Some(Runtime::Classic),
            pragma: Some(self.options.pragma.clone().into()),
            pragma_frag: Some(self.options.pragma_frag.clone().into()),
            use_spread: Some(true),
            ..Default::default()
        }
    }

    fn emit(
        &self,
        program: &Program,
        comments: &SingleThreadedComments,
    ) -> Result<String, CompileError> {
        let mut buf = Vec::new();
        {
            let mut emitter = Emitter {
                cfg: CodegenConfig::default().with_minify(false),
                cm: self.cm.clone(),
                comments: Some(comments),
                wr: JsWriter::new(self.cm.clone(), "\n", &mut buf, None),
            };
            emitter.emit_program(program)?;
        }
        Ok(String::from_utf8(buf)?)
    }
}

/// Rendered transform diagnostics.
#[derive(Clone, Default)]
struct Diagnostics(Arc<Mutex<Vec<u8>>>);

impl Diagnostics {
    fn take(&self) -> String {
        let text = match self.0.lock() {
            Ok(mut buf) => String::from_utf8_lossy(&std::mem::take(&mut *buf)).into_owned(),
            Err(_) => String::new(),
        };
        let text = text.trim();
        if text.is_empty() {
            "Transform failed".to_string()
        } else {
            text.to_string()
        }
    }
}

impl io::Write for Diagnostics {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("diagnostics buffer poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn syntax_error(cm: &SourceMap, err: ParseError) -> CompileError {
    let loc = cm.lookup_char_pos(err.span().lo);
    CompileError::Syntax {
        message: err.kind().msg().into_owned(),
        line: loc.line,
        column: loc.col_display + 1,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// JavaScript string literal for `text`.
fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_owned()).to_string()
}

/// Module whose default export renders `message` as a visible placeholder.
pub fn fallback_module(message: &str, options: &CompilerOptions) -> String {
    let text = quote(&format!("Compile error: {message}"));
    format!(
        "/* {COMPILE_ERROR_MARKER} */\n\
         {exports}.__compileError = {text};\n\
         {exports}.default = function CompileError() {{\n  \
         return {pragma}(\"pre\", {{ \"data-vectra-error\": true, style: {{ color: \"#b91c1c\", background: \"#fef2f2\", border: \"1px solid #fca5a5\", padding: 8, margin: 0, whiteSpace: \"pre-wrap\" }} }}, {text});\n\
         }};\n",
        exports = options.exports_ident,
        pragma = options.pragma,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(src: &str) -> String {
        Compiler::default().compile(src)
    }

    /// Drop whitespace and purity annotations so assertions ignore layout.
    fn compact(s: &str) -> String {
        s.replace("/*#__PURE__*/", "")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    }

    fn assert_contains(out: &str, expected: &str) {
        assert!(
            compact(out).contains(&compact(expected)),
            "expected `{expected}` in:\n{out}"
        );
    }

    #[test]
    fn test_blank_source_is_empty() {
        let mut compiler = Compiler::default();
        assert_eq!(compiler.compile(""), "");
        assert_eq!(compiler.compile("  \n\t "), "");
        assert_eq!(compiler.stats().compiles, 0);
    }

    #[test]
    fn test_plain_javascript_passes_through() {
        let src = "const a = 1;\nfunction add(x, y) { return x + y; }\n";
        assert_eq!(compact(&compile(src)), compact(src));
    }

    #[test]
    fn test_strips_variable_and_parameter_annotations() {
        let out = compile("const n: number = 1;\nfunction f(a: string, b?: number): boolean { return !!a; }");
        assert_eq!(
            compact(&out),
            compact("const n = 1; function f(a, b) { return !!a; }")
        );
    }

    #[test]
    fn test_strips_type_declarations() {
        let out = compile(
            "type Props = { label: string };\ninterface State extends Base<T> { open: boolean }\ndeclare const VERSION: string;\nconst x = 1;",
        );
        assert_eq!(compact(&out), compact("const x = 1;"));
    }

    #[test]
    fn test_strips_arrow_types_and_generics() {
        let out = compile("const f = <T,>(items: T[], pick: (t: T) => boolean): T[] => items.filter(pick);");
        assert_eq!(
            compact(&out),
            compact("const f = (items, pick) => items.filter(pick);")
        );
    }

    #[test]
    fn test_strips_call_type_arguments() {
        let out = compile("const [v, setV] = useState<string | null>(null);\nconst m = new Map<string, number[]>();");
        assert_eq!(
            compact(&out),
            compact("const [v, setV] = useState(null); const m = new Map();")
        );
    }

    #[test]
    fn test_comparisons_are_not_type_arguments() {
        let src = "for (let i = 0; i < n; i++) { if (a < b && c > d) x(); }";
        assert_eq!(compact(&compile(src)), compact(src));
    }

    #[test]
    fn test_strips_assertions() {
        let out = compile("const el = ref.current! as HTMLDivElement;\nconst cfg = { a: 1 } satisfies Config;\nconst k = key as const;");
        assert_eq!(
            compact(&out),
            compact("const el = ref.current; const cfg = { a: 1 }; const k = key;")
        );
    }

    #[test]
    fn test_strips_destructured_parameter_annotation() {
        let out = compile("function Card({ title, size = 2 }: CardProps) { return title; }");
        assert_eq!(
            compact(&out),
            compact("function Card({ title, size = 2 }) { return title; }")
        );
    }

    #[test]
    fn test_strips_this_parameter() {
        let out = compile("function f(this: Window, x = 1 as number) { return x; }");
        assert_eq!(compact(&out), compact("function f(x = 1) { return x; }"));
    }

    #[test]
    fn test_type_only_names_are_not_exported() {
        let out = compile("type A = string;\nconst b = 1;\nexport { A, b };");
        assert!(!out.contains(COMPILE_ERROR_MARKER), "{out}");
        assert!(!out.contains("exports.A"), "{out}");
        assert_contains(&out, "exports.b = b;");
    }

    #[test]
    fn test_ternary_is_not_an_annotation() {
        let out = compile("const v = ok ? a : b;\nconst w = { a: 1, b: c ? d : e };");
        assert_contains(&out, "const v = ok ? a : b;");
        assert_contains(&out, "b: c ? d : e");
    }

    #[test]
    fn test_strips_class_syntax() {
        let out = compile(
            "class Store<T> extends Base<T> implements Api {\n  private items: T[] = [];\n  readonly name?: string;\n  constructor(private id: number) { super(); }\n  get(i: number): T { return this.items[i]; }\n}",
        );
        assert_contains(&out, "class Store extends Base {");
        assert_contains(&out, "get(i) { return this.items[i]; }");
        assert_contains(&out, "this.id = id");
        for gone in ["private", "readonly", "implements", "<T>", ": number"] {
            assert!(!out.contains(gone), "`{gone}` left in:\n{out}");
        }
    }

    #[test]
    fn test_enums_are_lowered() {
        let out = compile("export enum Color { Red, Green }");
        assert!(!out.contains(COMPILE_ERROR_MARKER), "{out}");
        assert_contains(&out, r#"Color["Red"] = 0"#);
        assert_contains(&out, "exports.Color = Color;");
    }

    #[test]
    fn test_jsx_element_with_props_and_children() {
        let out = compile(r#"const el = <div className="box" hidden data-id={id}>Hello {name}!</div>;"#);
        assert_contains(
            &out,
            r#"React.createElement("div", { className: "box", hidden: true, "data-id": id }, "Hello ", name, "!")"#,
        );
    }

    #[test]
    fn test_jsx_components_fragments_and_spreads() {
        let out = compile("const el = <><Button {...rest} onClick={() => go(1)} /><ui.Icon /></>;");
        assert_contains(
            &out,
            "React.createElement(React.Fragment, null, React.createElement(Button, { ...rest, onClick: () => go(1) }), React.createElement(ui.Icon, null))",
        );
    }

    #[test]
    fn test_jsx_whitespace_and_entities() {
        let out = compile("const el = (\n  <p>\n    Tom &amp; Jerry\n    <b>x</b>\n  </p>\n);");
        assert_contains(
            &out,
            r#"React.createElement("p", null, "Tom & Jerry", React.createElement("b", null, "x"))"#,
        );
    }

    #[test]
    fn test_jsx_nested_expressions_are_transformed() {
        let out = compile("const list = <ul>{items.map((item: Item) => <li key={item.id}>{item.label}</li>)}</ul>;");
        assert_contains(
            &out,
            r#"React.createElement("ul", null, items.map((item) => React.createElement("li", { key: item.id }, item.label)))"#,
        );
    }

    #[test]
    fn test_custom_pragma() {
        let mut compiler = Compiler::new(CompilerOptions {
            pragma: "h".into(),
            pragma_frag: "Fragment".into(),
            ..CompilerOptions::default()
        });
        let out = compiler.compile("const el = <><a /></>;");
        assert_contains(&out, r#"h(Fragment, null, h("a", null))"#);
        assert!(!out.contains("React"), "{out}");
    }

    #[test]
    fn test_imports_become_require() {
        let out = compile(
            "import React, { useState as useS, type FC } from \"react\";\nimport * as utils from './utils';\nimport type { Props } from './types';\nimport './styles.css';\nimport { helper } from './helper';\nexport const App: FC<Props> = () => <div>{useS(1)}{utils.x}{helper()}</div>;",
        );
        assert_contains(
            &out,
            r#"const __vectra_import_0 = require("react"); const React = __vectra_import_0 && __vectra_import_0.__esModule ? __vectra_import_0.default : __vectra_import_0; const { useState: useS } = __vectra_import_0;"#,
        );
        assert_contains(&out, r#"const utils = require("./utils");"#);
        assert_contains(&out, r#"require("./styles.css");"#);
        assert_contains(&out, r#"const { helper } = require("./helper");"#);
        assert!(!out.contains("./types"), "{out}");
        assert!(!out.contains("import "), "{out}");
    }

    #[test]
    fn test_exports_are_rewritten() {
        let out = compile(
            "export const size = 2;\nexport function Button() { return null; }\nexport type Kind = 'a' | 'b';\nconst hidden = 1;\nexport { hidden as visible };\nexport default function App() { return <Button />; }",
        );
        assert_contains(&out, "const size = 2;");
        assert_contains(&out, "function Button() { return null; }");
        assert_contains(&out, "function App() { return React.createElement(Button, null); }");
        assert_contains(
            &out,
            "exports.size = size; exports.Button = Button; exports.visible = hidden; exports.default = App;",
        );
        assert!(!out.contains("export "), "{out}");
        assert!(!out.contains("Kind"), "{out}");
    }

    #[test]
    fn test_export_default_expression() {
        let out = compile("export default () => <div />;");
        assert_contains(&out, r#"exports.default = () => React.createElement("div", null);"#);

        let out = compile("export default function () { return 1; }");
        assert_contains(&out, "exports.default = function() { return 1; };");
    }

    #[test]
    fn test_reexports() {
        let out = compile("export * from './a';\nexport { b as c } from './b';");
        assert_contains(&out, r#"Object.assign(exports, require("./a"));"#);
        assert_contains(
            &out,
            r#"const __vectra_import_0 = require("./b"); exports.c = __vectra_import_0.b;"#,
        );
    }

    #[test]
    fn test_custom_module_identifiers() {
        let mut compiler = Compiler::new(CompilerOptions {
            exports_ident: "mod.exports".into(),
            require_ident: "load".into(),
            ..CompilerOptions::default()
        });
        let out = compiler.compile("import { a } from 'm';\nexport const x = a;");
        assert_contains(&out, r#"const { a } = load("m");"#);
        assert_contains(&out, "mod.exports.x = x;");
    }

    #[test]
    fn test_module_rewriting_can_be_disabled() {
        let mut compiler = Compiler::new(CompilerOptions {
            rewrite_modules: false,
            ..CompilerOptions::default()
        });
        let out = compiler.compile(
            "import { a, type B } from 'm';\nexport const x: number = a;\nexport default x;",
        );
        assert_eq!(
            compact(&out),
            compact("import { a } from 'm'; export const x = a; export default x;")
        );
    }

    #[test]
    fn test_broken_source_yields_fallback() {
        let mut compiler = Compiler::default();
        let out = compiler.compile("const el = <div>unclosed");
        assert!(out.contains(COMPILE_ERROR_MARKER));
        assert!(out.contains("exports.default = function CompileError()"));
        assert_eq!(compiler.stats().failures, 1);

        let out = compiler.compile("const s = 'unterminated;\n");
        assert!(out.contains(COMPILE_ERROR_MARKER));
        assert!(out.contains("line 1"), "{out}");
        assert_eq!(compiler.stats().failures, 2);
    }

    #[test]
    fn test_mismatched_tag_is_reported() {
        let out = compile("const el = <div></span>;");
        assert!(out.contains(COMPILE_ERROR_MARKER));
        assert!(out.contains("div"), "{out}");
    }

    #[test]
    fn test_state_is_recycled() {
        let mut compiler = Compiler::default();
        for _ in 0..RECYCLE_AFTER + 2 {
            let out = compiler.compile("const alpha: number = beta;");
            assert_eq!(compact(&out), compact("const alpha = beta;"));
        }
        let stats = compiler.stats();
        assert_eq!(stats.compiles, RECYCLE_AFTER + 2);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.resets, 1);
    }

    #[test]
    fn test_fallback_module_quotes_message() {
        let out = fallback_module("bad \"quote\"", &CompilerOptions::default());
        assert!(out.starts_with("/* __VECTRA_COMPILE_ERROR__ */"));
        assert!(out.contains(r#""Compile error: bad \"quote\"""#));
    }

    #[test]
    fn test_options_accept_partial_json() {
        let options: CompilerOptions = serde_json::from_str(r#"{"pragma":"h"}"#).unwrap();
        assert_eq!(options.pragma, "h");
        assert_eq!(options.pragma_frag, "React.Fragment");
        assert!(options.rewrite_modules);
    }
}

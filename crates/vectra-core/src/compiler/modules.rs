//! Lowers ES module syntax to `require` calls and `exports` assignments.
//!
//! Runs after hygiene, so bindings already carry their final names.
//! Replacement statements are written as source text and parsed back, which
//! keeps the rewriter independent of AST constructor details.

use swc_core::common::sync::Lrc;
use swc_core::common::{FileName, SourceMap};
use swc_core::ecma::ast::{
    ClassDecl, ClassExpr, Decl, DefaultDecl, EsVersion, ExportSpecifier, Expr, FnDecl, FnExpr,
    ImportDecl, ImportNamedSpecifier, ImportSpecifier, Module, ModuleDecl, ModuleExportName,
    ModuleItem, NamedExport, ObjectPatProp, Pat, Stmt,
};
use swc_core::ecma::parser::lexer::Lexer;
use swc_core::ecma::parser::{Parser, StringInput, Syntax};

use super::{CompileError, CompilerOptions, quote, syntax_error};

pub(super) struct ModuleRewriter<'a> {
    cm: &'a Lrc<SourceMap>,
    options: &'a CompilerOptions,
    temps: usize,
    /// `exports.x = x;` lines appended after the module body.
    trailing: Vec<String>,
}

impl<'a> ModuleRewriter<'a> {
    pub(super) fn new(cm: &'a Lrc<SourceMap>, options: &'a CompilerOptions) -> Self {
        Self {
            cm,
            options,
            temps: 0,
            trailing: Vec::new(),
        }
    }

    pub(super) fn rewrite(mut self, module: &mut Module) -> Result<(), CompileError> {
        let items = std::mem::take(&mut module.body);
        let mut body = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ModuleItem::Stmt(stmt) => body.push(ModuleItem::Stmt(stmt)),
                ModuleItem::ModuleDecl(decl) => self.lower(decl, &mut body)?,
            }
        }
        if !self.trailing.is_empty() {
            let text = self.trailing.join("\n");
            body.extend(self.parse(text)?);
        }
        module.body = body;
        Ok(())
    }

    fn lower(&mut self, decl: ModuleDecl, body: &mut Vec<ModuleItem>) -> Result<(), CompileError> {
        match decl {
            ModuleDecl::Import(import) => {
                if !import.type_only {
                    let text = self.import(&import);
                    body.extend(self.parse(text)?);
                }
            }
            ModuleDecl::ExportDecl(export) => {
                let mut names = Vec::new();
                declared_names(&export.decl, &mut names)?;
                for name in &names {
                    self.export_binding(name, name);
                }
                body.push(ModuleItem::Stmt(Stmt::Decl(export.decl)));
            }
            ModuleDecl::ExportNamed(named) => {
                if !named.type_only {
                    let text = self.named_export(&named)?;
                    if !text.is_empty() {
                        body.extend(self.parse(text)?);
                    }
                }
            }
            ModuleDecl::ExportDefaultDecl(export) => match export.decl {
                DefaultDecl::Fn(FnExpr {
                    ident: Some(ident),
                    function,
                }) => {
                    self.export_binding("default", &ident.sym);
                    body.push(ModuleItem::Stmt(Stmt::Decl(Decl::Fn(FnDecl {
                        ident,
                        declare: false,
                        function,
                    }))));
                }
                DefaultDecl::Class(ClassExpr {
                    ident: Some(ident),
                    class,
                }) => {
                    self.export_binding("default", &ident.sym);
                    body.push(ModuleItem::Stmt(Stmt::Decl(Decl::Class(ClassDecl {
                        ident,
                        declare: false,
                        class,
                    }))));
                }
                DefaultDecl::Fn(f) => body.extend(self.assign_default(Box::new(Expr::Fn(f)))?),
                DefaultDecl::Class(c) => {
                    body.extend(self.assign_default(Box::new(Expr::Class(c)))?)
                }
                DefaultDecl::TsInterfaceDecl(_) => {}
            },
            ModuleDecl::ExportDefaultExpr(export) => {
                body.extend(self.assign_default(export.expr)?);
            }
            ModuleDecl::ExportAll(all) => {
                if !all.type_only {
                    let text = format!(
                        "Object.assign({}, {}({}));",
                        self.options.exports_ident,
                        self.options.require_ident,
                        quote(&all.src.value)
                    );
                    body.extend(self.parse(text)?);
                }
            }
            // `export as namespace` only describes globals for type checkers.
            ModuleDecl::TsNamespaceExport(_) => {}
            _ => return Err(CompileError::Unsupported("`import =` and `export =` forms")),
        }
        Ok(())
    }

    fn import(&mut self, import: &ImportDecl) -> String {
        let require = format!("{}({})", self.options.require_ident, quote(&import.src.value));
        let specifiers = import.specifiers.as_slice();

        if specifiers.is_empty() {
            return format!("{require};");
        }
        if let [ImportSpecifier::Namespace(ns)] = specifiers {
            return format!("const {} = {require};", ns.local.sym);
        }
        let named: Vec<&ImportNamedSpecifier> = specifiers
            .iter()
            .filter_map(|s| match s {
                ImportSpecifier::Named(n) if !n.is_type_only => Some(n),
                _ => None,
            })
            .collect();
        if named.len() == specifiers.len() {
            return format!("const {} = {require};", destructure(&named));
        }

        let temp = self.temp();
        let mut out = format!("const {temp} = {require};");
        for spec in specifiers {
            match spec {
                ImportSpecifier::Default(d) => out.push_str(&format!(
                    " const {} = {temp} && {temp}.__esModule ? {temp}.default : {temp};",
                    d.local.sym
                )),
                ImportSpecifier::Namespace(ns) => {
                    out.push_str(&format!(" const {} = {temp};", ns.local.sym))
                }
                ImportSpecifier::Named(_) => {}
            }
        }
        if !named.is_empty() {
            out.push_str(&format!(" const {} = {temp};", destructure(&named)));
        }
        out
    }

    fn named_export(&mut self, named: &NamedExport) -> Result<String, CompileError> {
        let Some(src) = &named.src else {
            for spec in &named.specifiers {
                if let ExportSpecifier::Named(n) = spec {
                    if n.is_type_only {
                        continue;
                    }
                    let ModuleExportName::Ident(local) = &n.orig else {
                        return Err(CompileError::Unsupported(
                            "string export names without `from`",
                        ));
                    };
                    let local = local.sym.to_string();
                    let exported = n.exported.as_ref().map_or_else(|| local.clone(), export_name);
                    self.export_binding(&exported, &local);
                }
            }
            return Ok(String::new());
        };

        let exports = self.options.exports_ident.clone();
        let temp = self.temp();
        let mut out = format!(
            "const {temp} = {}({});",
            self.options.require_ident,
            quote(&src.value)
        );
        for spec in &named.specifiers {
            let line = match spec {
                ExportSpecifier::Named(n) if !n.is_type_only => {
                    let orig = export_name(&n.orig);
                    let exported = n.exported.as_ref().map_or_else(|| orig.clone(), export_name);
                    format!("{} = {};", member(&exports, &exported), member(&temp, &orig))
                }
                ExportSpecifier::Namespace(ns) => {
                    format!("{} = {temp};", member(&exports, &export_name(&ns.name)))
                }
                ExportSpecifier::Default(d) => {
                    format!("{} = {temp}.default;", member(&exports, &d.exported.sym))
                }
                ExportSpecifier::Named(_) => continue,
            };
            out.push(' ');
            out.push_str(&line);
        }
        Ok(out)
    }

    fn export_binding(&mut self, exported: &str, local: &str) {
        self.trailing.push(format!(
            "{} = {local};",
            member(&self.options.exports_ident, exported)
        ));
    }

    /// `<exports>.default = <expr>;`
    fn assign_default(&self, expr: Box<Expr>) -> Result<Vec<ModuleItem>, CompileError> {
        let mut items = self.parse(format!("{}.default = 0;", self.options.exports_ident))?;
        if let Some(ModuleItem::Stmt(Stmt::Expr(stmt))) = items.first_mut() {
            if let Expr::Assign(assign) = &mut *stmt.expr {
                assign.right = expr;
                return Ok(items);
            }
        }
        Err(CompileError::Internal(format!(
            "`{}` is not assignable",
            self.options.exports_ident
        )))
    }

    fn temp(&mut self) -> String {
        let name = format!("__vectra_import_{}", self.temps);
        self.temps += 1;
        name
    }

    fn parse(&self, text: String) -> Result<Vec<ModuleItem>, CompileError> {
        let fm = self.cm.new_source_file(FileName::Anon.into(), text);
        let lexer = Lexer::new(
            Syntax::Es(Default::default()),
            EsVersion::latest(),
            StringInput::from(&*fm),
            None,
        );
        let mut parser = Parser::new_from(lexer);
        let module = parser
            .parse_module()
            .map_err(|err| syntax_error(self.cm, err))?;
        Ok(module.body)
    }
}

fn destructure(named: &[&ImportNamedSpecifier]) -> String {
    let fields: Vec<String> = named
        .iter()
        .map(|n| {
            let local = n.local.sym.to_string();
            let key = match &n.imported {
                Some(ModuleExportName::Ident(i)) => i.sym.to_string(),
                Some(ModuleExportName::Str(s)) => quote(&s.value),
                None => local.clone(),
            };
            if key == local {
                local
            } else {
                format!("{key}: {local}")
            }
        })
        .collect();
    format!("{{ {} }}", fields.join(", "))
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::Ident(i) => i.sym.to_string(),
        ModuleExportName::Str(s) => s.value.to_string(),
    }
}

/// `obj.prop`, or `obj["prop"]` when `prop` is not an identifier.
fn member(obj: &str, prop: &str) -> String {
    let mut chars = prop.chars();
    let is_ident = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if is_ident {
        format!("{obj}.{prop}")
    } else {
        format!("{obj}[{}]", quote(prop))
    }
}

fn declared_names(decl: &Decl, out: &mut Vec<String>) -> Result<(), CompileError> {
    match decl {
        Decl::Fn(f) => out.push(f.ident.sym.to_string()),
        Decl::Class(c) => out.push(c.ident.sym.to_string()),
        Decl::Var(v) => {
            for declarator in &v.decls {
                pattern_names(&declarator.name, out);
            }
        }
        _ => return Err(CompileError::Unsupported("exported `using` declarations")),
    }
    Ok(())
}

fn pattern_names(pat: &Pat, out: &mut Vec<String>) {
    match pat {
        Pat::Ident(binding) => out.push(binding.id.sym.to_string()),
        Pat::Array(array) => {
            for elem in array.elems.iter().flatten() {
                pattern_names(elem, out);
            }
        }
        Pat::Object(object) => {
            for prop in &object.props {
                match prop {
                    ObjectPatProp::KeyValue(kv) => pattern_names(&kv.value, out),
                    ObjectPatProp::Assign(assign) => out.push(assign.key.sym.to_string()),
                    ObjectPatProp::Rest(rest) => pattern_names(&rest.arg, out),
                }
            }
        }
        Pat::Rest(rest) => pattern_names(&rest.arg, out),
        Pat::Assign(assign) => pattern_names(&assign.left, out),
        _ => {}
    }
}

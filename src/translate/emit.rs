//! WGSL emission.
//!
//! Each stage lowers its own statements with a stage-local scope stack; the
//! shared module header (uniform struct, texture bindings, proxies, entry
//! functions) is assembled from the linked tables.

use std::fmt::Write;

use hashbrown::HashMap;

use super::layout::LinkedModule;
use super::{Stage, StageData};
use crate::error::Error;
use crate::glsl::ast::{
    AssignOp, CallExpr, Declaration, Expr, ForStmt, FunctionDecl, LogicalOp, Qualifier, Stmt,
    UnOp, UpdateOp,
};
use crate::types::{pad_wrapper_name, GlslType};

pub(crate) fn emit(module: &LinkedModule) -> Result<String, Error> {
    let mut vertex = StageEmitter::new(module, &module.vertex);
    let vertex_globals = vertex.module_globals()?;
    let vertex_functions = vertex.functions()?;

    let mut fragment = StageEmitter::new(module, &module.fragment);
    let fragment_globals = fragment.module_globals()?;
    let fragment_functions = fragment.functions()?;

    let mut out = String::new();
    uniform_block(&mut out, module);
    texture_bindings(&mut out, module);
    proxies(&mut out, module);
    out.push_str(&vertex_globals);
    out.push_str(&fragment_globals);
    struct_decls(&mut out, module);
    helpers(
        &mut out,
        vertex.need_mat3_from_mat4 || fragment.need_mat3_from_mat4,
        vertex.need_modf || fragment.need_modf,
    );
    out.push_str(&vertex_functions);
    out.push_str(&fragment_functions);
    vertex_entry(&mut out, module);
    fragment_entry(&mut out, module);

    Ok(out)
}

/// Rewrites identifiers that collide with WGSL keywords or reserved
/// prefixes.
pub(crate) fn sanitize(name: &str) -> String {
    const RESERVED: &[&str] = &[
        "alias", "attribute", "bitcast", "break", "case", "const", "continue", "continuing",
        "default", "diagnostic", "discard", "else", "enable", "false", "flat", "fn", "for",
        "highp", "if", "layout", "let", "loop", "lowp", "mediump", "mod", "override", "precision",
        "ptr", "ref", "requires", "return", "sampler", "smooth", "struct", "switch", "true",
        "type", "uniform", "var", "varying", "while", "workgroup",
    ];

    if RESERVED.contains(&name) || name.starts_with("__") {
        format!("{name}_")
    } else {
        name.to_owned()
    }
}

fn format_float(value: f64) -> String {
    // `{:?}` keeps the shortest representation that round-trips and always
    // spells a valid WGSL float literal (`1.0`, `0.5`, `1e20`).
    format!("{value:?}")
}

fn uniform_block(out: &mut String, module: &LinkedModule) {
    let Some(layout) = module.uniform_buffer else {
        return;
    };

    // Padded element wrappers for uniform arrays whose natural stride is
    // not a multiple of 16.
    let mut emitted_pads: Vec<String> = Vec::new();
    for uniform in &module.uniforms {
        if let GlslType::Array(elem, _) = &uniform.ty {
            if elem.needs_uniform_pad() {
                let name = pad_wrapper_name(elem);
                if !emitted_pads.contains(&name) {
                    let _ = writeln!(
                        out,
                        "struct {name} {{\n    @size(16) el: {},\n}}",
                        elem.wgsl_uniform(),
                    );
                    emitted_pads.push(name);
                }
            }
        }
    }

    out.push_str("struct _Uniforms {\n");
    for uniform in &module.uniforms {
        let _ = writeln!(
            out,
            "    @align(16) {}: {},",
            sanitize(&uniform.name),
            uniform.ty.wgsl_uniform(),
        );
    }
    out.push_str("}\n");
    let _ = writeln!(
        out,
        "@group(0) @binding({}) var<uniform> _uniforms: _Uniforms;",
        layout.binding,
    );
}

fn texture_bindings(out: &mut String, module: &LinkedModule) {
    for texture in &module.textures {
        let name = sanitize(&texture.name);
        let _ = writeln!(
            out,
            "@group(0) @binding({}) var {}: {};",
            texture.binding,
            name,
            texture.sampler.wgsl_texture(),
        );
        let _ = writeln!(
            out,
            "@group(0) @binding({}) var {}_sampler: sampler;",
            texture.sampler_binding, name,
        );
    }
}

fn proxies(out: &mut String, module: &LinkedModule) {
    for attribute in &module.attributes {
        let _ = writeln!(
            out,
            "var<private> {}: {};",
            sanitize(&attribute.name),
            attribute.ty.wgsl(),
        );
    }
    for varying in &module.varyings {
        let _ = writeln!(
            out,
            "var<private> {}: {};",
            sanitize(&varying.name),
            varying.ty.wgsl(),
        );
    }
    for (name, ty) in &module.fragment.frag_outputs {
        let _ = writeln!(out, "var<private> {}: {};", sanitize(name), ty.wgsl());
    }
    out.push_str("var<private> gl_Position: vec4f;\n");
    out.push_str("var<private> gl_PointSize: f32;\n");
    out.push_str("var<private> gl_FragColor: vec4f;\n");
    out.push_str("var<private> gl_FragDepth: f32;\n");
    out.push_str("var<private> gl_FrontFacing: bool;\n");
}

fn struct_decls(out: &mut String, module: &LinkedModule) {
    for (orig, def) in module
        .vertex
        .struct_order
        .iter()
        .chain(&module.fragment.struct_order)
    {
        let _ = writeln!(out, "struct {} {{", def.name);
        for field in &def.fields {
            let _ = writeln!(out, "    {}: {},", sanitize(&field.name), field.ty.wgsl());
        }
        out.push_str("}\n");

        // Declaration-site alias, kept when the original name is unique
        // across the two stages.
        let other = match def.name.starts_with(Stage::Vertex.prefix()) {
            true => &module.fragment,
            false => &module.vertex,
        };
        if !other.structs.contains_key(orig) {
            let _ = writeln!(out, "alias {} = {};", sanitize(orig), def.name);
        }
    }
}

fn helpers(out: &mut String, mat3_from_mat4: bool, modf: bool) {
    if mat3_from_mat4 {
        out.push_str(
            "fn _mat3_from_mat4(m: mat4x4f) -> mat3x3f {\n    \
             return mat3x3f(m[0].xyz, m[1].xyz, m[2].xyz);\n}\n",
        );
    }
    if modf {
        out.push_str(
            "fn _modf(x: f32, whole: ptr<function, f32>) -> f32 {\n    \
             let parts = modf(x);\n    *whole = parts.whole;\n    return parts.fract;\n}\n",
        );
    }
}

fn interpolate_attr(ty: &GlslType) -> &'static str {
    match ty {
        GlslType::Int
        | GlslType::Uint
        | GlslType::IVec2
        | GlslType::IVec3
        | GlslType::IVec4
        | GlslType::UVec2
        | GlslType::UVec3
        | GlslType::UVec4 => " @interpolate(flat)",
        _ => "",
    }
}

fn vertex_entry(out: &mut String, module: &LinkedModule) {
    if !module.attributes.is_empty() {
        out.push_str("struct VertexInput {\n");
        for attribute in &module.attributes {
            let _ = writeln!(
                out,
                "    @location({}) {}: {},",
                attribute.location,
                sanitize(&attribute.name),
                attribute.ty.wgsl(),
            );
        }
        out.push_str("}\n");
    }

    out.push_str("struct VertexOutput {\n    @builtin(position) position: vec4f,\n");
    for varying in &module.varyings {
        let _ = writeln!(
            out,
            "    @location({}){} {}: {},",
            varying.location,
            interpolate_attr(&varying.ty),
            sanitize(&varying.name),
            varying.ty.wgsl(),
        );
    }
    out.push_str("}\n");

    out.push_str("@vertex\n");
    if module.attributes.is_empty() {
        out.push_str("fn vs_main() -> VertexOutput {\n");
    } else {
        out.push_str("fn vs_main(in: VertexInput) -> VertexOutput {\n");
    }
    for attribute in &module.attributes {
        let name = sanitize(&attribute.name);
        let _ = writeln!(out, "    {name} = in.{name};");
    }
    let _ = writeln!(out, "    {}main();", Stage::Vertex.prefix());
    out.push_str("    var out: VertexOutput;\n");
    out.push_str("    out.position = gl_Position;\n");
    // The legacy clip space spans [-1, 1] in z; the target spans [0, 1].
    out.push_str("    out.position.z = out.position.z * 0.5 + 0.5;\n");
    for varying in &module.varyings {
        let name = sanitize(&varying.name);
        let _ = writeln!(out, "    out.{name} = {name};");
    }
    out.push_str("    return out;\n}\n");
}

fn fragment_entry(out: &mut String, module: &LinkedModule) {
    out.push_str("struct FragmentInput {\n    @builtin(front_facing) front_facing: bool,\n");
    for varying in &module.varyings {
        let _ = writeln!(
            out,
            "    @location({}){} {}: {},",
            varying.location,
            interpolate_attr(&varying.ty),
            sanitize(&varying.name),
            varying.ty.wgsl(),
        );
    }
    out.push_str("}\n");

    out.push_str("struct FragmentOutput {\n");
    if module.fragment.frag_outputs.is_empty() {
        out.push_str("    @location(0) color: vec4f,\n");
    } else {
        for (location, (name, ty)) in module.fragment.frag_outputs.iter().enumerate() {
            let _ = writeln!(
                out,
                "    @location({location}) {}: {},",
                sanitize(name),
                ty.wgsl(),
            );
        }
    }
    if module.fragment.uses_frag_depth {
        out.push_str("    @builtin(frag_depth) frag_depth: f32,\n");
    }
    out.push_str("}\n");

    out.push_str("@fragment\nfn fs_main(in: FragmentInput) -> FragmentOutput {\n");
    out.push_str("    gl_FrontFacing = in.front_facing;\n");
    for varying in &module.varyings {
        let name = sanitize(&varying.name);
        let _ = writeln!(out, "    {name} = in.{name};");
    }
    let _ = writeln!(out, "    {}main();", Stage::Fragment.prefix());
    out.push_str("    var out: FragmentOutput;\n");
    if module.fragment.frag_outputs.is_empty() {
        out.push_str("    out.color = gl_FragColor;\n");
    } else {
        for (name, _) in &module.fragment.frag_outputs {
            let name = sanitize(name);
            let _ = writeln!(out, "    out.{name} = {name};");
        }
    }
    if module.fragment.uses_frag_depth {
        out.push_str("    out.frag_depth = gl_FragDepth;\n");
    }
    out.push_str("    return out;\n}\n");
}

/// How an identifier in scope lowers to WGSL.
#[derive(Clone, Debug)]
enum Repr {
    Plain(String),
    UniformMember(String),
    Ptr(String),
}

#[derive(Clone, Debug)]
struct Binding {
    ty: GlslType,
    repr: Repr,
}

struct StageEmitter<'a> {
    module: &'a LinkedModule,
    data: &'a StageData,
    scopes: Vec<HashMap<String, Binding>>,
    trace: Vec<String>,
    indent: usize,
    need_mat3_from_mat4: bool,
    need_modf: bool,
}

impl<'a> StageEmitter<'a> {
    fn new(module: &'a LinkedModule, data: &'a StageData) -> Self {
        let mut globals = HashMap::new();

        for uniform in &module.uniforms {
            globals.insert(
                uniform.name.clone(),
                Binding {
                    ty: uniform.ty.clone(),
                    repr: Repr::UniformMember(sanitize(&uniform.name)),
                },
            );
        }
        for texture in &module.textures {
            globals.insert(
                texture.name.clone(),
                Binding {
                    ty: GlslType::Sampler(texture.sampler),
                    repr: Repr::Plain(sanitize(&texture.name)),
                },
            );
        }
        for varying in &module.varyings {
            globals.insert(
                varying.name.clone(),
                Binding {
                    ty: varying.ty.clone(),
                    repr: Repr::Plain(sanitize(&varying.name)),
                },
            );
        }
        if data.stage == Stage::Vertex {
            for attribute in &module.attributes {
                globals.insert(
                    attribute.name.clone(),
                    Binding {
                        ty: attribute.ty.clone(),
                        repr: Repr::Plain(sanitize(&attribute.name)),
                    },
                );
            }
            for (name, ty) in [
                ("gl_Position", GlslType::Vec4),
                ("gl_PointSize", GlslType::Float),
            ] {
                globals.insert(
                    name.to_owned(),
                    Binding {
                        ty,
                        repr: Repr::Plain(name.to_owned()),
                    },
                );
            }
        } else {
            for (name, ty) in &data.frag_outputs {
                globals.insert(
                    name.clone(),
                    Binding {
                        ty: ty.clone(),
                        repr: Repr::Plain(sanitize(name)),
                    },
                );
            }
            for (name, ty) in [
                ("gl_FragColor", GlslType::Vec4),
                ("gl_FragDepth", GlslType::Float),
                ("gl_FrontFacing", GlslType::Bool),
            ] {
                globals.insert(
                    name.to_owned(),
                    Binding {
                        ty,
                        repr: Repr::Plain(name.to_owned()),
                    },
                );
            }
        }

        Self {
            module,
            data,
            scopes: vec![globals],
            trace: Vec::new(),
            indent: 0,
            need_mat3_from_mat4: false,
            need_modf: false,
        }
    }

    fn err(&self, message: impl Into<String>) -> Error {
        Error::translation(message, self.trace.clone())
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn bind(&mut self, name: &str, ty: GlslType, repr: Repr) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.to_owned(), Binding { ty, repr });
    }

    /// Fork-state: push a scope delta, run `f`, restore.
    fn scoped<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.scopes.push(HashMap::new());
        let result = f(self);
        self.scopes.pop();
        result
    }

    // Module-scope constants and private variables of this stage, names
    // prefixed so both stages can coexist in one module.

    fn module_globals(&mut self) -> Result<String, Error> {
        let mut out = String::new();
        let data = self.data;

        for decl in &data.consts {
            for declarator in &decl.declarators {
                let ty = data.resolve_type(
                    &decl.ty,
                    declarator.array_len.as_ref(),
                    &data.preprocessor,
                )?;
                let Some(init) = &declarator.init else {
                    return Err(self.err(format!(
                        "const {} is missing an initializer",
                        declarator.name
                    )));
                };
                let init = self.expr(init)?;
                let name = format!("{}{}", self.data.stage.prefix(), declarator.name);
                let _ = writeln!(out, "const {}: {} = {};", name, ty.wgsl(), init);
                self.bind(&declarator.name, ty, Repr::Plain(name));
            }
        }

        for decl in &data.privates {
            for declarator in &decl.declarators {
                let ty = data.resolve_type(
                    &decl.ty,
                    declarator.array_len.as_ref(),
                    &data.preprocessor,
                )?;
                let name = format!("{}{}", self.data.stage.prefix(), declarator.name);
                match &declarator.init {
                    Some(init) => {
                        let init = self.expr(init)?;
                        let _ = writeln!(out, "var<private> {}: {} = {};", name, ty.wgsl(), init);
                    }
                    None => {
                        let _ = writeln!(out, "var<private> {}: {};", name, ty.wgsl());
                    }
                }
                self.bind(&declarator.name, ty, Repr::Plain(name));
            }
        }

        Ok(out)
    }

    fn functions(&mut self) -> Result<String, Error> {
        let mut out = String::new();
        let data = self.data;
        for func in &data.functions {
            self.function(&mut out, func)?;
        }
        Ok(out)
    }

    fn function(&mut self, out: &mut String, func: &FunctionDecl) -> Result<(), Error> {
        self.trace.push(format!("fn {}", func.name));

        let return_type = self.data.resolve_type(
            &func.return_type,
            None,
            &self.data.preprocessor,
        )?;

        let mut params = Vec::with_capacity(func.params.len());
        let mut shadows = Vec::new();
        let mut bindings = Vec::new();
        for param in &func.params {
            let ty = self
                .data
                .resolve_type(&param.ty, None, &self.data.preprocessor)?;
            let name = sanitize(&param.name);
            if param.direction.is_pointer() {
                params.push(format!("{name}: ptr<function, {}>", ty.wgsl()));
                bindings.push((param.name.clone(), ty, Repr::Ptr(name)));
            } else {
                // GLSL value parameters are mutable locals; rebind them.
                params.push(format!("_p_{name}: {}", ty.wgsl()));
                shadows.push(format!("var {name}: {} = _p_{name};", ty.wgsl()));
                bindings.push((param.name.clone(), ty, Repr::Plain(name)));
            }
        }

        let _ = write!(
            out,
            "fn {}{}({})",
            self.data.stage.prefix(),
            func.name,
            params.join(", "),
        );
        if return_type != GlslType::Void {
            let _ = write!(out, " -> {}", return_type.wgsl());
        }
        out.push_str(" {\n");

        self.indent = 1;
        let body = func.body.as_deref().unwrap_or(&[]);
        self.scoped(|this| -> Result<(), Error> {
            for (name, ty, repr) in bindings {
                this.bind(&name, ty, repr);
            }
            for shadow in &shadows {
                this.push_line(out, shadow);
            }
            for stmt in body {
                this.stmt(out, stmt)?;
            }
            Ok(())
        })?;

        out.push_str("}\n");
        self.trace.pop();
        Ok(())
    }

    fn push_line(&self, out: &mut String, line: &str) {
        for _ in 0..self.indent {
            out.push_str("    ");
        }
        out.push_str(line);
        out.push('\n');
    }

    // Statements

    fn stmt(&mut self, out: &mut String, stmt: &Stmt) -> Result<(), Error> {
        match stmt {
            Stmt::Empty | Stmt::Precision | Stmt::Directive(_) => Ok(()),
            Stmt::Declaration(decl) => self.local_declaration(out, decl),
            Stmt::Expr(expr) => {
                let line = self.expr_stmt(expr)?;
                self.push_line(out, &line);
                Ok(())
            }
            Stmt::Return(None) => {
                self.push_line(out, "return;");
                Ok(())
            }
            Stmt::Return(Some(expr)) => {
                let value = self.expr(expr)?;
                self.push_line(out, &format!("return {value};"));
                Ok(())
            }
            Stmt::Discard => {
                self.push_line(out, "discard;");
                Ok(())
            }
            Stmt::Break => {
                self.push_line(out, "break;");
                Ok(())
            }
            Stmt::Continue => {
                self.push_line(out, "continue;");
                Ok(())
            }
            Stmt::Block(stmts) => {
                self.push_line(out, "{");
                self.indent += 1;
                self.scoped(|this| -> Result<(), Error> {
                    for stmt in stmts {
                        this.stmt(out, stmt)?;
                    }
                    Ok(())
                })?;
                self.indent -= 1;
                self.push_line(out, "}");
                Ok(())
            }
            Stmt::If(if_stmt) => {
                self.trace.push("if".to_owned());
                let cond = self.scalar_bool(&if_stmt.cond)?;
                self.push_line(out, &format!("if ({cond}) {{"));
                self.indent += 1;
                self.scoped(|this| -> Result<(), Error> {
                    for stmt in &if_stmt.then {
                        this.stmt(out, stmt)?;
                    }
                    Ok(())
                })?;
                self.indent -= 1;
                match &if_stmt.otherwise {
                    Some(otherwise) => {
                        self.push_line(out, "} else {");
                        self.indent += 1;
                        self.scoped(|this| -> Result<(), Error> {
                            for stmt in otherwise {
                                this.stmt(out, stmt)?;
                            }
                            Ok(())
                        })?;
                        self.indent -= 1;
                        self.push_line(out, "}");
                    }
                    None => self.push_line(out, "}"),
                }
                self.trace.pop();
                Ok(())
            }
            Stmt::For(for_stmt) => self.for_stmt(out, for_stmt),
            other => Err(self.err(format!("unsupported statement: {other:?}"))),
        }
    }

    fn local_declaration(&mut self, out: &mut String, decl: &Declaration) -> Result<(), Error> {
        for declarator in &decl.declarators {
            let ty = self.data.resolve_type(
                &decl.ty,
                declarator.array_len.as_ref(),
                &self.data.preprocessor,
            )?;
            let name = sanitize(&declarator.name);

            let line = match (&decl.qualifier, &declarator.init) {
                (Some(Qualifier::Const), Some(init)) => {
                    let init = self.expr(init)?;
                    format!("let {name}: {} = {};", ty.wgsl(), init)
                }
                (_, Some(init)) => {
                    let init = self.expr(init)?;
                    format!("var {name}: {} = {};", ty.wgsl(), init)
                }
                (_, None) => format!("var {name}: {};", ty.wgsl()),
            };
            self.push_line(out, &line);
            self.bind(&declarator.name, ty, Repr::Plain(name));
        }
        Ok(())
    }

    /// Lowers an expression used as a statement.
    fn expr_stmt(&mut self, expr: &Expr) -> Result<String, Error> {
        match expr {
            Expr::Assign { op, target, value } => {
                self.check_store_target(target)?;
                let target = self.expr(target)?;
                let value = self.expr(value)?;
                let op = match op {
                    AssignOp::Assign => "=",
                    AssignOp::Add => "+=",
                    AssignOp::Sub => "-=",
                    AssignOp::Mul => "*=",
                    AssignOp::Div => "/=",
                    AssignOp::Rem => "%=",
                };
                Ok(format!("{target} {op} {value};"))
            }
            Expr::Update { op, expr, .. } => {
                let place = self.expr(expr)?;
                let op = match op {
                    UpdateOp::Inc => "++",
                    UpdateOp::Dec => "--",
                };
                Ok(format!("{place}{op};"))
            }
            Expr::Call(_) => {
                let ty = self.infer(expr);
                let lowered = self.expr(expr)?;
                match ty {
                    Some(GlslType::Void) | None => Ok(format!("{lowered};")),
                    // Discarded results need the phony assignment.
                    Some(_) => Ok(format!("_ = {lowered};")),
                }
            }
            other => {
                let lowered = self.expr(other)?;
                Ok(format!("_ = {lowered};"))
            }
        }
    }

    /// Multi-component swizzle stores have no WGSL counterpart.
    fn check_store_target(&mut self, target: &Expr) -> Result<(), Error> {
        if let Expr::Member { base, member } = target {
            let is_swizzle = member.len() > 1
                && member
                    .chars()
                    .all(|c| "xyzwrgbastpq".contains(c));
            if is_swizzle && self.infer(base).is_some_and(|ty| ty.is_vector()) {
                return Err(self.err(format!(
                    "assignment to a multi-component swizzle (.{member}) is not supported"
                )));
            }
        }
        Ok(())
    }

    fn for_stmt(&mut self, out: &mut String, for_stmt: &ForStmt) -> Result<(), Error> {
        self.trace.push("for".to_owned());
        self.scopes.push(HashMap::new());

        let init = match &for_stmt.init {
            None => String::new(),
            Some(stmt) => match &**stmt {
                Stmt::Declaration(decl) if decl.declarators.len() == 1 => {
                    let declarator = &decl.declarators[0];
                    let ty = self.data.resolve_type(
                        &decl.ty,
                        declarator.array_len.as_ref(),
                        &self.data.preprocessor,
                    )?;
                    let name = sanitize(&declarator.name);
                    let init = match &declarator.init {
                        Some(init) => self.expr(init)?,
                        None => {
                            return Err(self.err("for-loop declaration without initializer"));
                        }
                    };
                    self.bind(&declarator.name, ty.clone(), Repr::Plain(name.clone()));
                    format!("var {name}: {} = {}", ty.wgsl(), init)
                }
                Stmt::Expr(expr) => {
                    let line = self.expr_stmt(expr)?;
                    line.trim_end_matches(';').to_owned()
                }
                other => {
                    return Err(self.err(format!("unsupported for-loop initializer: {other:?}")));
                }
            },
        };

        let cond = match &for_stmt.cond {
            Some(cond) => self.scalar_bool(cond)?,
            None => String::new(),
        };
        let step = match &for_stmt.step {
            Some(step) => {
                let line = self.expr_stmt(step)?;
                line.trim_end_matches(';').to_owned()
            }
            None => String::new(),
        };

        self.push_line(out, &format!("for ({init}; {cond}; {step}) {{"));
        self.indent += 1;
        for stmt in &for_stmt.body {
            self.stmt(out, stmt)?;
        }
        self.indent -= 1;
        self.push_line(out, "}");

        self.scopes.pop();
        self.trace.pop();
        Ok(())
    }

    // Expressions

    fn expr(&mut self, expr: &Expr) -> Result<String, Error> {
        self.trace.push(expr.label());
        if self.trace.len() > 256 {
            return Err(self.err("expression nesting too deep (recursive macro?)"));
        }
        let result = self.expr_inner(expr);
        if result.is_ok() {
            self.trace.pop();
        }
        result
    }

    fn expr_inner(&mut self, expr: &Expr) -> Result<String, Error> {
        match expr {
            Expr::Int(v) => Ok(v.to_string()),
            Expr::Uint(v) => Ok(format!("{v}u")),
            Expr::Float(v) => Ok(format_float(*v)),
            Expr::Bool(v) => Ok(v.to_string()),
            Expr::Ident(name) => self.ident(name),
            Expr::Call(call) => self.call(call),
            Expr::ArrayCtor { ty, len, args } => {
                let elem = self
                    .data
                    .resolve_type(ty, None, &self.data.preprocessor)?;
                let len = match len {
                    Some(len) => self.data.preprocessor.eval(len, 0) as usize,
                    None => args.len(),
                };
                let args = self.args(args)?;
                Ok(format!("array<{}, {}>({})", elem.wgsl(), len, args))
            }
            Expr::Assign { .. } => Err(self.err("assignment used as an expression")),
            Expr::Update { .. } => Err(self.err("increment used as an expression")),
            Expr::Binary { op, left, right } => {
                let left = self.expr(left)?;
                let right = self.expr(right)?;
                Ok(format!("({left} {} {right})", op.wgsl()))
            }
            Expr::Unary { op, expr } => {
                let inner = self.expr(expr)?;
                let op = match op {
                    UnOp::Neg => "-",
                    UnOp::Not => "!",
                    UnOp::BitNot => "~",
                };
                Ok(format!("({op}{inner})"))
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                // GLSL `a ? b : c` picks `b` when `a` holds; WGSL `select`
                // takes the false operand first.
                let cond = self.scalar_bool(cond)?;
                let then = self.expr(then)?;
                let otherwise = self.expr(otherwise)?;
                Ok(format!("select({otherwise}, {then}, {cond})"))
            }
            Expr::Logical { op, left, right } => {
                let left = self.scalar_bool(left)?;
                let right = self.scalar_bool(right)?;
                let op = match op {
                    LogicalOp::And => "&&",
                    LogicalOp::Or => "||",
                };
                Ok(format!("({left} {op} {right})"))
            }
            Expr::Member { base, member } => {
                let lowered = self.expr(base)?;
                Ok(format!("{lowered}.{}", sanitize(member)))
            }
            Expr::Index { base, index } => {
                let index_str = self.expr(index)?;

                // Uniform arrays with padded elements store the value in
                // the wrapper's `el` field.
                if let Expr::Ident(name) = &**base {
                    if let Some(binding) = self.lookup(name) {
                        if let (Repr::UniformMember(member), GlslType::Array(elem, _)) =
                            (&binding.repr, &binding.ty)
                        {
                            if elem.needs_uniform_pad() {
                                let access =
                                    format!("_uniforms.{member}[{index_str}].el");
                                return Ok(if elem.is_bool() {
                                    format!("({access} != 0u)")
                                } else {
                                    access
                                });
                            }
                        }
                    }
                }

                let base = self.expr(base)?;
                Ok(format!("{base}[{index_str}]"))
            }
        }
    }

    fn ident(&mut self, name: &str) -> Result<String, Error> {
        // The preprocessor define table wins over variables in scope.
        if let Some(define) = self.data.preprocessor.define(name) {
            if define.params.is_none() {
                let Some(body) = define.body.clone() else {
                    return Err(self.err(format!("macro {name} has no value")));
                };
                return self.expr(&body);
            }
        }

        match self.lookup(name) {
            Some(binding) => Ok(match &binding.repr {
                Repr::Plain(repr) => repr.clone(),
                Repr::UniformMember(member) => {
                    if binding.ty.is_bool() {
                        format!("(_uniforms.{member} != 0u)")
                    } else {
                        format!("_uniforms.{member}")
                    }
                }
                Repr::Ptr(repr) => format!("(*{repr})"),
            }),
            None => Err(self.err(format!("unknown identifier {name}"))),
        }
    }

    fn args(&mut self, args: &[Expr]) -> Result<String, Error> {
        let mut lowered = Vec::with_capacity(args.len());
        for arg in args {
            lowered.push(self.expr(arg)?);
        }
        Ok(lowered.join(", "))
    }

    fn call(&mut self, call: &CallExpr) -> Result<String, Error> {
        let name = call.callee.as_str();

        // Function-like macros expand before anything else.
        if let Some(expanded) = self.data.preprocessor.expand_call(name, &call.args) {
            return self.expr(&expanded);
        }

        // Type constructors.
        if let Some(ty) = GlslType::from_glsl_name(name) {
            return self.constructor(&ty, call);
        }
        if let Some(def) = self.data.structs.get(name) {
            let ctor = def.name.clone();
            let args = self.args(&call.args)?;
            return Ok(format!("{ctor}({args})"));
        }

        match name {
            "texture2D" | "texture" | "textureCube" => self.texture_sample(call),
            "modf" => {
                if call.args.len() != 2 {
                    return Err(self.err("modf takes two arguments"));
                }
                self.need_modf = true;
                let x = self.expr(&call.args[0])?;
                let whole = self.expr(&call.args[1])?;
                Ok(format!("_modf({x}, &{whole})"))
            }
            "mod" => {
                if call.args.len() != 2 {
                    return Err(self.err("mod takes two arguments"));
                }
                let a = self.expr(&call.args[0])?;
                let b = self.expr(&call.args[1])?;
                Ok(format!("({a} % {b})"))
            }
            "atan" if call.args.len() == 2 => {
                let y = self.expr(&call.args[0])?;
                let x = self.expr(&call.args[1])?;
                Ok(format!("atan2({y}, {x})"))
            }
            "lessThan" | "lessThanEqual" | "greaterThan" | "greaterThanEqual" | "equal"
            | "notEqual" => {
                if call.args.len() != 2 {
                    return Err(self.err(format!("{name} takes two arguments")));
                }
                let op = match name {
                    "lessThan" => "<",
                    "lessThanEqual" => "<=",
                    "greaterThan" => ">",
                    "greaterThanEqual" => ">=",
                    "equal" => "==",
                    _ => "!=",
                };
                let a = self.expr(&call.args[0])?;
                let b = self.expr(&call.args[1])?;
                Ok(format!("({a} {op} {b})"))
            }
            "not" => {
                let a = self.expr(&call.args[0])?;
                Ok(format!("(!{a})"))
            }
            _ => {
                if let Some(renamed) = rename_builtin(name) {
                    let args = self.args(&call.args)?;
                    return Ok(format!("{renamed}({args})"));
                }
                if PASSTHROUGH_BUILTINS.contains(&name) {
                    let args = self.args(&call.args)?;
                    return Ok(format!("{name}({args})"));
                }
                if let Some(sig) = self.data.fn_sigs.get(name) {
                    let directions = sig.directions.clone();
                    if directions.len() != call.args.len() {
                        return Err(self.err(format!(
                            "{name} takes {} arguments, found {}",
                            directions.len(),
                            call.args.len(),
                        )));
                    }
                    let mut args = Vec::with_capacity(call.args.len());
                    for (arg, direction) in call.args.iter().zip(directions) {
                        let lowered = self.expr(arg)?;
                        if direction.is_pointer() {
                            args.push(format!("&{lowered}"));
                        } else {
                            args.push(lowered);
                        }
                    }
                    return Ok(format!(
                        "{}{}({})",
                        self.data.stage.prefix(),
                        name,
                        args.join(", "),
                    ));
                }
                Err(self.err(format!("unknown function {name}")))
            }
        }
    }

    fn constructor(&mut self, ty: &GlslType, call: &CallExpr) -> Result<String, Error> {
        // `mat3(m4)` has no native constructor.
        if *ty == GlslType::Mat3
            && call.args.len() == 1
            && self.infer(&call.args[0]) == Some(GlslType::Mat4)
        {
            self.need_mat3_from_mat4 = true;
            let arg = self.expr(&call.args[0])?;
            return Ok(format!("_mat3_from_mat4({arg})"));
        }

        let spelled = match ty {
            GlslType::Bool => "bool".to_owned(),
            GlslType::Int => "i32".to_owned(),
            GlslType::Uint => "u32".to_owned(),
            GlslType::Float => "f32".to_owned(),
            GlslType::Sampler(_) | GlslType::Void => {
                return Err(self.err(format!("cannot construct a value of type {ty:?}")));
            }
            other => other.wgsl(),
        };
        let args = self.args(&call.args)?;
        Ok(format!("{spelled}({args})"))
    }

    fn texture_sample(&mut self, call: &CallExpr) -> Result<String, Error> {
        let Some(Expr::Ident(name)) = call.args.first() else {
            return Err(self.err("texture sampling requires a sampler uniform argument"));
        };
        let Some(info) = self.module.textures.iter().find(|t| &t.name == name) else {
            return Err(self.err(format!("{name} is not a sampler uniform")));
        };
        let texture = sanitize(name);
        let uv = self.expr(
            call.args
                .get(1)
                .ok_or_else(|| self.err("texture sampling requires coordinates"))?,
        )?;

        if info.sampler.is_unsigned() {
            // Integer textures cannot be sampled; load the texel instead.
            return Ok(format!(
                "textureLoad({texture}, vec2i({uv} * vec2f(textureDimensions({texture}))), 0)"
            ));
        }

        match call.args.get(2) {
            Some(bias) => {
                let bias = self.expr(bias)?;
                Ok(format!(
                    "textureSampleBias({texture}, {texture}_sampler, {uv}, {bias})"
                ))
            }
            None => Ok(format!("textureSample({texture}, {texture}_sampler, {uv})")),
        }
    }

    /// Lowers an expression into a scalar bool for `if`/ternary tests,
    /// reducing vector results with `all(...)`.
    fn scalar_bool(&mut self, expr: &Expr) -> Result<String, Error> {
        let ty = self.infer(expr);
        let lowered = self.expr(expr)?;
        Ok(match ty {
            Some(GlslType::Bool) => lowered,
            Some(GlslType::BVec2 | GlslType::BVec3 | GlslType::BVec4) => {
                format!("all({lowered})")
            }
            Some(GlslType::Int | GlslType::Uint | GlslType::Float) => {
                format!("bool({lowered})")
            }
            _ => lowered,
        })
    }

    // Best-effort type inference over the lowered subset; used to pick
    // between scalar and vector forms.

    fn infer(&self, expr: &Expr) -> Option<GlslType> {
        match expr {
            Expr::Int(_) => Some(GlslType::Int),
            Expr::Uint(_) => Some(GlslType::Uint),
            Expr::Float(_) => Some(GlslType::Float),
            Expr::Bool(_) => Some(GlslType::Bool),
            Expr::Ident(name) => {
                if let Some(define) = self.data.preprocessor.define(name) {
                    if define.params.is_none() {
                        if let Some(body) = &define.body {
                            if !matches!(body, Expr::Ident(inner) if inner == name) {
                                return self.infer(body);
                            }
                        }
                    }
                }
                self.lookup(name).map(|b| b.ty.clone())
            }
            Expr::Call(call) => self.infer_call(call),
            Expr::ArrayCtor { ty, len, args } => {
                let elem = self
                    .data
                    .resolve_type(ty, None, &self.data.preprocessor)
                    .ok()?;
                let len = match len {
                    Some(len) => self.data.preprocessor.eval(len, 0) as u32,
                    None => args.len() as u32,
                };
                Some(GlslType::Array(Box::new(elem), len))
            }
            Expr::Assign { target, .. } => self.infer(target),
            Expr::Binary { op, left, right } => {
                let l = self.infer(left);
                let r = self.infer(right);
                if op.is_comparison() {
                    let operand = l.as_ref().or(r.as_ref())?;
                    return if operand.is_vector() {
                        GlslType::Bool.vector_of(operand.components())
                    } else {
                        Some(GlslType::Bool)
                    };
                }
                match (l, r) {
                    (Some(l), Some(r)) if l.is_matrix() && r.is_vector() => Some(r),
                    (Some(l), Some(r)) if l.is_vector() && r.is_matrix() => Some(l),
                    (Some(l), Some(r)) if r.is_vector() && !l.is_vector() => Some(r),
                    (Some(l), _) => Some(l),
                    (None, r) => r,
                }
            }
            Expr::Unary { expr, .. } | Expr::Update { expr, .. } => self.infer(expr),
            Expr::Ternary { then, .. } => self.infer(then),
            Expr::Logical { .. } => Some(GlslType::Bool),
            Expr::Member { base, member } => {
                let base = self.infer(base)?;
                match base {
                    GlslType::Struct(def) => def.field(member).map(|f| f.ty.clone()),
                    ty if ty.is_vector() => {
                        let len = member.len() as u32;
                        if len == 1 {
                            ty.element()
                        } else {
                            ty.vector_of(len)
                        }
                    }
                    _ => None,
                }
            }
            Expr::Index { base, .. } => self.infer(base)?.element(),
        }
    }

    fn infer_call(&self, call: &CallExpr) -> Option<GlslType> {
        let name = call.callee.as_str();

        if let Some(expanded) = self.data.preprocessor.expand_call(name, &call.args) {
            return self.infer(&expanded);
        }
        if let Some(ty) = GlslType::from_glsl_name(name) {
            return Some(ty);
        }
        if let Some(def) = self.data.structs.get(name) {
            return Some(GlslType::Struct(def.clone()));
        }

        match name {
            "texture2D" | "texture" | "textureCube" => {
                let Some(Expr::Ident(tex)) = call.args.first() else {
                    return Some(GlslType::Vec4);
                };
                match self.module.textures.iter().find(|t| &t.name == tex) {
                    Some(info) if info.sampler.is_unsigned() => Some(GlslType::UVec4),
                    _ => Some(GlslType::Vec4),
                }
            }
            "dot" | "length" | "distance" => Some(GlslType::Float),
            "cross" => Some(GlslType::Vec3),
            "all" | "any" => Some(GlslType::Bool),
            "lessThan" | "lessThanEqual" | "greaterThan" | "greaterThanEqual" | "equal"
            | "notEqual" => {
                let operand = self.infer(call.args.first()?)?;
                GlslType::Bool.vector_of(operand.components())
            }
            "not" => self.infer(call.args.first()?),
            "step" => self.infer(call.args.get(1)?),
            "smoothstep" => self.infer(call.args.get(2)?),
            "modf" | "mod" | "atan" | "mix" | "clamp" | "min" | "max" | "pow" | "normalize"
            | "abs" | "sign" | "floor" | "ceil" | "round" | "fract" | "sqrt" | "exp" | "exp2"
            | "log" | "log2" | "sin" | "cos" | "tan" | "asin" | "acos" | "reflect" | "refract"
            | "inversesqrt" | "dFdx" | "dFdy" | "fwidth" | "degrees" | "radians" => {
                self.infer(call.args.first()?)
            }
            "transpose" => self.infer(call.args.first()?),
            _ => self
                .data
                .fn_sigs
                .get(name)
                .map(|sig| sig.return_type.clone()),
        }
    }
}

/// GLSL builtins that exist in WGSL under a different name.
fn rename_builtin(name: &str) -> Option<&'static str> {
    Some(match name {
        "inversesqrt" => "inverseSqrt",
        "dFdx" => "dpdx",
        "dFdy" => "dpdy",
        "faceforward" => "faceForward",
        _ => return None,
    })
}

/// GLSL builtins whose WGSL counterpart has the same name and signature.
const PASSTHROUGH_BUILTINS: &[&str] = &[
    "abs",
    "acos",
    "all",
    "any",
    "asin",
    "atan",
    "ceil",
    "clamp",
    "cos",
    "cross",
    "degrees",
    "distance",
    "dot",
    "exp",
    "exp2",
    "floor",
    "fract",
    "fwidth",
    "length",
    "log",
    "log2",
    "max",
    "min",
    "mix",
    "normalize",
    "pow",
    "radians",
    "reflect",
    "refract",
    "round",
    "sign",
    "sin",
    "smoothstep",
    "sqrt",
    "step",
    "tan",
    "transpose",
];

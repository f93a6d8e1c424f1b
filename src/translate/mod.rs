//! The GLSL → WGSL translator.
//!
//! Two shader sources lower to a single WGSL module with one entry function
//! per stage, plus the metadata needed to bind resources at draw time: the
//! attribute table, the uniform tables and the layout of the unified uniform
//! buffer.

mod emit;
mod layout;

use std::sync::Arc;

use hashbrown::HashMap;

use crate::error::Error;
use crate::glsl::ast::{Declaration, Expr, FunctionDecl, Qualifier, Stmt, TypeSpec};
use crate::glsl::preprocessor::Preprocessor;
use crate::glsl::{self, ast};
use crate::types::{GlslType, SamplerType, StructField, StructType};

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    /// Prefix applied to stage-local module identifiers so the two stages
    /// can share one WGSL module.
    pub(crate) const fn prefix(&self) -> &'static str {
        match self {
            Self::Vertex => "_v_",
            Self::Fragment => "_f_",
        }
    }
}

#[derive(Clone, Debug)]
pub struct AttributeInfo {
    pub name: String,
    pub location: u32,
    pub ty: GlslType,
}

/// A non-sampler uniform: a member of the unified uniform struct.
#[derive(Clone, Debug)]
pub struct UniformInfo {
    pub name: String,
    pub ty: GlslType,
    /// Binding of the enclosing uniform buffer.
    pub binding: u32,
    /// Byte offset inside the uniform struct.
    pub offset: u32,
}

/// A sampler-typed uniform: a sampled-texture binding paired with a
/// companion sampler binding.
#[derive(Clone, Debug)]
pub struct TextureInfo {
    pub name: String,
    pub sampler: SamplerType,
    pub binding: u32,
    pub sampler_binding: u32,
}

#[derive(Clone, Debug)]
pub struct VaryingInfo {
    pub name: String,
    pub ty: GlslType,
    pub location: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct UniformBufferLayout {
    pub binding: u32,
    /// Total size, rounded up to 16 bytes.
    pub size: u32,
}

/// The product of a successful link: WGSL text plus every table needed to
/// bind resources and issue draws.
#[derive(Clone, Debug)]
pub struct CompiledProgram {
    pub wgsl: String,
    pub attributes: Vec<AttributeInfo>,
    pub uniforms: Vec<UniformInfo>,
    pub textures: Vec<TextureInfo>,
    pub varyings: Vec<VaryingInfo>,
    pub uniform_buffer: Option<UniformBufferLayout>,
}

/// A uniform access path resolved to its storage.
#[derive(Clone, Debug)]
pub struct ResolvedUniform {
    pub binding: u32,
    /// Byte offset inside the uniform struct; 0 for textures and samplers.
    pub offset: u32,
    pub ty: GlslType,
}

impl CompiledProgram {
    /// The sampler-to-texture relation: each companion sampler binding
    /// paired with its sampled-texture binding.
    pub fn sampler_map(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.textures.iter().map(|t| (t.sampler_binding, t.binding))
    }

    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.location)
    }

    pub fn active_uniform_count(&self) -> usize {
        self.uniforms.len() + self.textures.len()
    }

    /// Resolves a uniform access path (`u`, `u[2]`, `u.a[1].b`) to the
    /// binding, byte offset and type of the addressed storage.
    pub fn resolve_uniform(&self, path: &str) -> Option<ResolvedUniform> {
        let (root, rest) = split_path_root(path);

        if let Some(texture) = self.textures.iter().find(|t| t.name == root) {
            if !rest.is_empty() {
                return None;
            }
            return Some(ResolvedUniform {
                binding: texture.binding,
                offset: 0,
                ty: GlslType::Sampler(texture.sampler),
            });
        }

        let member = self.uniforms.iter().find(|u| u.name == root)?;
        let mut offset = member.offset;
        let mut ty = member.ty.clone();

        let mut segments = PathSegments { rest };
        while let Some(segment) = segments.next()? {
            match segment {
                PathSegment::Index(index) => {
                    let GlslType::Array(elem, len) = ty else {
                        return None;
                    };
                    if index >= len {
                        return None;
                    }
                    offset += index * elem.uniform_array_stride();
                    ty = *elem;
                }
                PathSegment::Field(name) => {
                    let GlslType::Struct(def) = &ty else {
                        return None;
                    };
                    offset += def.offset_of(&name)?;
                    ty = def.field(&name)?.ty.clone();
                }
            }
        }

        Some(ResolvedUniform {
            binding: member.binding,
            offset,
            ty,
        })
    }
}

fn split_path_root(path: &str) -> (&str, &str) {
    match path.find(['.', '[']) {
        Some(index) => path.split_at(index),
        None => (path, ""),
    }
}

enum PathSegment {
    Index(u32),
    Field(String),
}

struct PathSegments<'a> {
    rest: &'a str,
}

impl PathSegments<'_> {
    /// `Ok(None)`-style triple state via `Option<Option<_>>` collapsed:
    /// outer `None` means malformed path, inner `None` means exhausted.
    fn next(&mut self) -> Option<Option<PathSegment>> {
        if self.rest.is_empty() {
            return Some(None);
        }

        if let Some(rest) = self.rest.strip_prefix('[') {
            let end = rest.find(']')?;
            let index = rest[..end].trim().parse::<u32>().ok()?;
            self.rest = &rest[end + 1..];
            return Some(Some(PathSegment::Index(index)));
        }

        let rest = self.rest.strip_prefix('.')?;
        let end = rest.find(['.', '[']).unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        let field = rest[..end].to_owned();
        self.rest = &rest[end..];
        Some(Some(PathSegment::Field(field)))
    }
}

/// Translates a vertex and a fragment shader into one WGSL module.
pub fn translate(vertex_source: &str, fragment_source: &str) -> Result<CompiledProgram, Error> {
    let vertex_ast = glsl::parse_source(vertex_source)
        .map_err(|err| Error::parse(format!("vertex shader: {err}")))?;
    let fragment_ast = glsl::parse_source(fragment_source)
        .map_err(|err| Error::parse(format!("fragment shader: {err}")))?;

    let vertex = StageData::collect(Stage::Vertex, vertex_ast)?;
    let fragment = StageData::collect(Stage::Fragment, fragment_ast)?;

    let module = layout::link(vertex, fragment)?;
    let wgsl = emit::emit(&module)?;

    Ok(CompiledProgram {
        wgsl,
        attributes: module.attributes,
        uniforms: module.uniforms,
        textures: module.textures,
        varyings: module.varyings,
        uniform_buffer: module.uniform_buffer,
    })
}

/// Per-function signature recorded at declaration time and consulted at
/// every call site for parameter direction and return type.
#[derive(Clone, Debug)]
pub(crate) struct FnSig {
    pub directions: Vec<ast::ParamDirection>,
    pub return_type: GlslType,
}

/// Everything collected from one stage's statement list, directives already
/// interpreted and dead branches dropped.
#[derive(Debug)]
pub(crate) struct StageData {
    pub stage: Stage,
    pub structs: HashMap<String, Arc<StructType>>,
    /// Structs in declaration order, keyed by their source name.
    pub struct_order: Vec<(String, Arc<StructType>)>,
    /// Vertex inputs: name, type, explicit layout location.
    pub attributes: Vec<(String, GlslType, Option<u32>)>,
    pub varyings: Vec<(String, GlslType)>,
    /// All uniforms in source order, samplers included.
    pub uniforms: Vec<(String, GlslType)>,
    pub consts: Vec<Declaration>,
    pub privates: Vec<Declaration>,
    pub functions: Vec<FunctionDecl>,
    pub fn_sigs: HashMap<String, FnSig>,
    pub frag_outputs: Vec<(String, GlslType)>,
    pub preprocessor: Preprocessor,
    pub uses_frag_depth: bool,
}

impl StageData {
    fn collect(stage: Stage, stmts: Vec<Stmt>) -> Result<Self, Error> {
        let mut data = Self {
            stage,
            structs: HashMap::new(),
            struct_order: Vec::new(),
            attributes: Vec::new(),
            varyings: Vec::new(),
            uniforms: Vec::new(),
            consts: Vec::new(),
            privates: Vec::new(),
            functions: Vec::new(),
            fn_sigs: HashMap::new(),
            frag_outputs: Vec::new(),
            preprocessor: Preprocessor::new(),
            uses_frag_depth: false,
        };

        let mut preprocessor = Preprocessor::new();
        for stmt in stmts {
            data.top_level(stmt, &mut preprocessor)?;
        }
        data.preprocessor = preprocessor;

        data.uses_frag_depth = data
            .functions
            .iter()
            .filter_map(|f| f.body.as_deref())
            .any(stmts_mention_frag_depth);

        Ok(data)
    }

    fn top_level(&mut self, stmt: Stmt, pp: &mut Preprocessor) -> Result<(), Error> {
        match stmt {
            Stmt::Directive(directive) => {
                pp.directive(&directive)
                    .map_err(|err| Error::parse(err))?;
                Ok(())
            }
            _ if !pp.live() => Ok(()),
            Stmt::Precision | Stmt::Empty => Ok(()),
            Stmt::Block(stmts) => {
                // The parser wraps `struct S { ... } instance;` in a block.
                for stmt in stmts {
                    self.top_level(stmt, pp)?;
                }
                Ok(())
            }
            Stmt::Struct(decl) => {
                let mut fields = Vec::with_capacity(decl.fields.len());
                for field in &decl.fields {
                    let ty = self.resolve_type(&field.ty, field.array_len.as_ref(), pp)?;
                    fields.push(StructField {
                        name: field.name.clone(),
                        ty,
                    });
                }
                let def = Arc::new(StructType {
                    name: format!("{}{}", self.stage.prefix(), decl.name),
                    fields,
                });
                self.structs.insert(decl.name.clone(), def.clone());
                self.struct_order.push((decl.name, def));
                Ok(())
            }
            Stmt::Function(mut func) => {
                if let Some(body) = &mut func.body {
                    strip_directives(body, pp)?;
                }
                let mut directions = Vec::with_capacity(func.params.len());
                for param in &func.params {
                    directions.push(param.direction);
                }
                let return_type = self.resolve_type(&func.return_type, None, pp)?;
                self.fn_sigs.insert(
                    func.name.clone(),
                    FnSig {
                        directions,
                        return_type,
                    },
                );
                if func.body.is_some() {
                    self.functions.push(func);
                }
                Ok(())
            }
            Stmt::Declaration(decl) => self.declaration(decl, pp),
            other => Err(Error::translation(
                format!("unsupported top-level statement: {other:?}"),
                Vec::new(),
            )),
        }
    }

    /// Applies the qualifier interpretation of the stage to a top-level
    /// declaration.
    fn declaration(&mut self, decl: Declaration, pp: &Preprocessor) -> Result<(), Error> {
        enum Role {
            Attribute,
            Varying,
            Uniform,
            FragOutput,
            Const,
            Private,
        }

        let role = match (self.stage, decl.qualifier) {
            (Stage::Vertex, Some(Qualifier::Attribute | Qualifier::In)) => Role::Attribute,
            (Stage::Vertex, Some(Qualifier::Varying | Qualifier::Out)) => Role::Varying,
            (Stage::Fragment, Some(Qualifier::Varying | Qualifier::In)) => Role::Varying,
            (Stage::Fragment, Some(Qualifier::Out)) => Role::FragOutput,
            (_, Some(Qualifier::Uniform)) => Role::Uniform,
            (_, Some(Qualifier::Const)) => Role::Const,
            (_, None) => Role::Private,
            (Stage::Fragment, Some(Qualifier::Attribute)) => {
                return Err(Error::translation(
                    "attribute declarations are invalid in a fragment shader",
                    Vec::new(),
                ));
            }
        };

        for declarator in &decl.declarators {
            let ty = self.resolve_type(&decl.ty, declarator.array_len.as_ref(), pp)?;
            let name = declarator.name.clone();
            match role {
                Role::Attribute => {
                    self.attributes.push((name, ty, decl.layout_location));
                }
                Role::Varying => self.varyings.push((name, ty)),
                Role::Uniform => {
                    if let GlslType::Array(elem, _) = &ty {
                        if elem.is_sampler() {
                            return Err(Error::translation(
                                format!("sampler arrays are not supported: {name}"),
                                Vec::new(),
                            ));
                        }
                    }
                    self.uniforms.push((name, ty));
                }
                Role::Const => self.consts.push(decl.clone()),
                Role::FragOutput => self.frag_outputs.push((name, ty)),
                Role::Private => self.privates.push(decl.clone()),
            }
            // Const and private declarations keep their full declarator
            // lists; one push covers them all.
            if matches!(role, Role::Const | Role::Private) {
                break;
            }
        }
        Ok(())
    }

    pub(crate) fn resolve_type(
        &self,
        spec: &TypeSpec,
        declarator_array: Option<&Expr>,
        pp: &Preprocessor,
    ) -> Result<GlslType, Error> {
        let base = match GlslType::from_glsl_name(&spec.name) {
            Some(ty) => ty,
            None => match self.structs.get(&spec.name) {
                Some(def) => GlslType::Struct(def.clone()),
                None => {
                    return Err(Error::translation(
                        format!("unknown type {}", spec.name),
                        Vec::new(),
                    ));
                }
            },
        };

        let array_len = declarator_array.or(spec.array_len.as_deref());
        match array_len {
            Some(len) => {
                let len = pp.eval(len, 0);
                if len <= 0 {
                    return Err(Error::translation(
                        format!("array length must be a positive constant, got {len}"),
                        Vec::new(),
                    ));
                }
                Ok(GlslType::Array(Box::new(base), len as u32))
            }
            None => Ok(base),
        }
    }
}

/// Interprets and removes preprocessor directives nested inside a
/// statement tree, dropping statements in dead branches.
fn strip_directives(stmts: &mut Vec<Stmt>, pp: &mut Preprocessor) -> Result<(), Error> {
    let mut kept = Vec::with_capacity(stmts.len());
    for mut stmt in stmts.drain(..) {
        match &mut stmt {
            Stmt::Directive(directive) => {
                pp.directive(directive).map_err(|err| Error::parse(err))?;
                continue;
            }
            _ if !pp.live() => continue,
            Stmt::Block(inner) => strip_directives(inner, pp)?,
            Stmt::If(if_stmt) => {
                strip_directives(&mut if_stmt.then, pp)?;
                if let Some(otherwise) = &mut if_stmt.otherwise {
                    strip_directives(otherwise, pp)?;
                }
            }
            Stmt::For(for_stmt) => strip_directives(&mut for_stmt.body, pp)?,
            _ => {}
        }
        kept.push(stmt);
    }
    *stmts = kept;
    Ok(())
}

fn stmts_mention_frag_depth(stmts: &[Stmt]) -> bool {
    fn expr_mentions(expr: &Expr) -> bool {
        match expr {
            Expr::Ident(name) => name == "gl_FragDepth",
            Expr::Call(call) => call.args.iter().any(expr_mentions),
            Expr::ArrayCtor { len, args, .. } => {
                len.as_deref().is_some_and(expr_mentions) || args.iter().any(expr_mentions)
            }
            Expr::Assign { target, value, .. } => expr_mentions(target) || expr_mentions(value),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                expr_mentions(left) || expr_mentions(right)
            }
            Expr::Unary { expr, .. } | Expr::Update { expr, .. } => expr_mentions(expr),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => expr_mentions(cond) || expr_mentions(then) || expr_mentions(otherwise),
            Expr::Member { base, .. } => expr_mentions(base),
            Expr::Index { base, index } => expr_mentions(base) || expr_mentions(index),
            _ => false,
        }
    }

    stmts.iter().any(|stmt| match stmt {
        Stmt::Expr(expr) => expr_mentions(expr),
        Stmt::Return(Some(expr)) => expr_mentions(expr),
        Stmt::Block(inner) => stmts_mention_frag_depth(inner),
        Stmt::If(if_stmt) => {
            expr_mentions(&if_stmt.cond)
                || stmts_mention_frag_depth(&if_stmt.then)
                || if_stmt
                    .otherwise
                    .as_deref()
                    .is_some_and(stmts_mention_frag_depth)
        }
        Stmt::For(for_stmt) => {
            for_stmt
                .init
                .as_deref()
                .is_some_and(|init| stmts_mention_frag_depth(std::slice::from_ref(init)))
                || for_stmt.cond.as_ref().is_some_and(expr_mentions)
                || for_stmt.step.as_ref().is_some_and(expr_mentions)
                || stmts_mention_frag_depth(&for_stmt.body)
        }
        Stmt::Declaration(decl) => decl
            .declarators
            .iter()
            .any(|d| d.init.as_ref().is_some_and(expr_mentions)),
        _ => false,
    })
}

#[cfg(test)]
mod tests;

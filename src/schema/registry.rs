use super::types::{ArgType, Direction, LenExpr, Param, Signature};
use crate::error::SchemaError;
use crate::gl;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Ids below this are reserved for internal pseudo-ops
pub const FIRST_USER_ID: u16 = 4;
/// Pseudo-op: bytes the application wrote into mapped buffer memory
pub const MAPPED_BUFFER_WRITE_ID: u16 = 1;
/// Pseudo-op: free-form annotation
pub const MARKER_ID: u16 = 2;

pub const MAPPED_BUFFER_WRITE: &str = "__mappedBufferWrite";
pub const MARKER: &str = "__marker";

#[derive(Deserialize)]
struct SchemaFile {
    #[serde(default)]
    function: Vec<RawFunction>,
    #[serde(default)]
    synonym: Vec<RawSynonym>,
}

#[derive(Deserialize)]
struct RawFunction {
    id: u16,
    name: String,
    #[serde(default)]
    args: Vec<RawParam>,
    #[serde(default = "default_ret")]
    ret: String,
    #[serde(default = "default_true")]
    side_effects: bool,
    #[serde(default)]
    frame_boundary: bool,
    #[serde(default)]
    unsupported: bool,
    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Deserialize)]
struct RawParam {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    dir: Direction,
    len: Option<RawLen>,
    buffer: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLen {
    Count(u32),
    Expr(String),
}

#[derive(Deserialize)]
struct RawSynonym {
    name: String,
    canonical: String,
}

fn default_ret() -> String {
    "void".to_string()
}

fn default_true() -> bool {
    true
}

/// Table of traced entry points, indexed by id and by name
///
/// Ids are stable: a trace stores the name of every id it uses, so growing the
/// schema never invalidates existing files. Synonyms let an extension-suffixed
/// name and its core equivalent share one signature.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    by_id: Vec<Option<Signature>>,
    by_name: HashMap<String, u16>,
    synonyms: HashMap<String, String>,
    inverse_synonyms: HashMap<String, Vec<String>>,
}

impl SchemaRegistry {
    /// Load a schema from a TOML file
    ///
    /// # Example TOML
    /// ```toml
    /// [[function]]
    /// id = 12
    /// name = "glBindTexture"
    /// args = [
    ///     { name = "target", type = "enum:GLenum" },
    ///     { name = "texture", type = "handle:texture:bind" },
    /// ]
    /// ```
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read schema file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid schema: {}", path.as_ref().display()))
    }

    /// The embedded GLES schema
    pub fn default_gles() -> std::result::Result<Self, SchemaError> {
        const DEFAULT_TOML: &str = include_str!("../../gles-schema.toml");
        Self::from_toml_str(DEFAULT_TOML)
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, SchemaError> {
        let file: SchemaFile = toml::from_str(content)?;

        let mut registry = Self {
            by_id: Vec::new(),
            by_name: HashMap::new(),
            synonyms: HashMap::new(),
            inverse_synonyms: HashMap::new(),
        };
        for sig in pseudo_ops() {
            registry.insert(sig)?;
        }

        let mut aliases = Vec::new();
        for raw in file.function {
            if raw.id < FIRST_USER_ID {
                return Err(SchemaError::ReservedId { id: raw.id });
            }
            for alias in &raw.aliases {
                aliases.push((alias.clone(), raw.name.clone()));
            }
            let sig = build_signature(raw)?;
            registry.insert(sig)?;
        }
        aliases.extend(file.synonym.into_iter().map(|s| (s.name, s.canonical)));

        for (alias, canonical) in aliases {
            if registry.by_name.contains_key(&alias) {
                return Err(SchemaError::DuplicateName(alias));
            }
            registry.synonyms.insert(alias.clone(), canonical.clone());
            registry
                .inverse_synonyms
                .entry(canonical)
                .or_default()
                .push(alias);
        }
        registry.check_synonyms()?;

        Ok(registry)
    }

    fn insert(&mut self, sig: Signature) -> std::result::Result<(), SchemaError> {
        let id = sig.id as usize;
        if self.by_name.contains_key(&sig.name) {
            return Err(SchemaError::DuplicateName(sig.name));
        }
        if self.by_id.len() <= id {
            self.by_id.resize(id + 1, None);
        }
        if let Some(existing) = &self.by_id[id] {
            return Err(SchemaError::DuplicateId {
                id: sig.id,
                first: existing.name.clone(),
                second: sig.name,
            });
        }
        self.by_name.insert(sig.name.clone(), sig.id);
        self.by_id[id] = Some(sig);
        Ok(())
    }

    fn check_synonyms(&self) -> std::result::Result<(), SchemaError> {
        for alias in self.synonyms.keys() {
            let mut seen = HashSet::new();
            let mut current = alias.as_str();
            while let Some(next) = self.synonyms.get(current) {
                if !seen.insert(current) {
                    return Err(SchemaError::SynonymCycle(alias.clone()));
                }
                current = next.as_str();
            }
            if !self.by_name.contains_key(current) {
                return Err(SchemaError::UnknownCanonical {
                    alias: alias.clone(),
                    canonical: current.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Exact-name lookup
    pub fn lookup(&self, name: &str) -> Option<&Signature> {
        let id = *self.by_name.get(name)?;
        self.by_id(id)
    }

    /// Lookup that follows synonyms to the canonical signature
    pub fn resolve_name(&self, name: &str) -> Option<&Signature> {
        if let Some(sig) = self.lookup(name) {
            return Some(sig);
        }
        let mut current = name;
        for _ in 0..self.synonyms.len() {
            current = self.synonyms.get(current)?.as_str();
            if let Some(sig) = self.lookup(current) {
                return Some(sig);
            }
        }
        None
    }

    pub fn by_id(&self, id: u16) -> Option<&Signature> {
        self.by_id.get(id as usize)?.as_ref()
    }

    /// Alias → canonical name
    pub fn synonyms(&self) -> &HashMap<String, String> {
        &self.synonyms
    }

    /// Canonical name → aliases
    pub fn inverse_synonyms(&self) -> &HashMap<String, Vec<String>> {
        &self.inverse_synonyms
    }

    /// Every other name the same entry point is known by
    pub fn alternatives(&self, name: &str) -> Vec<&str> {
        let mut names = Vec::new();
        if let Some(canonical) = self.synonyms.get(name) {
            names.push(canonical.as_str());
        }
        let canonical = self.synonyms.get(name).map(String::as_str).unwrap_or(name);
        if let Some(aliases) = self.inverse_synonyms.get(canonical) {
            names.extend(aliases.iter().map(String::as_str).filter(|a| *a != name));
        }
        names
    }

    pub fn max_id(&self) -> u16 {
        self.by_id.len().saturating_sub(1) as u16
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signature> {
        self.by_id.iter().flatten()
    }
}

fn pseudo_ops() -> Vec<Signature> {
    let param = |name: &str, ty: ArgType| Param {
        name: name.to_string(),
        ty,
        dir: Direction::In,
        len: None,
        buffer_target: None,
    };
    vec![
        Signature {
            id: MAPPED_BUFFER_WRITE_ID,
            name: MAPPED_BUFFER_WRITE.to_string(),
            params: vec![
                param("target", ArgType::Enum("GLenum".into())),
                param("offset", ArgType::Scalar(super::ScalarType::U32)),
                param("data", ArgType::Blob),
            ],
            ret: ArgType::Void,
            side_effects: true,
            frame_boundary: false,
            unsupported: false,
        },
        Signature {
            id: MARKER_ID,
            name: MARKER.to_string(),
            params: vec![param("text", ArgType::String)],
            ret: ArgType::Void,
            side_effects: false,
            frame_boundary: false,
            unsupported: false,
        },
    ]
}

fn build_signature(raw: RawFunction) -> std::result::Result<Signature, SchemaError> {
    let bad_type = |ty: &str, reason: String| SchemaError::BadType {
        function: raw.name.clone(),
        ty: ty.to_string(),
        reason,
    };

    let names: Vec<&str> = raw.args.iter().map(|a| a.name.as_str()).collect();
    let mut params = Vec::with_capacity(raw.args.len());
    for arg in &raw.args {
        let ty = ArgType::parse(&arg.ty).map_err(|e| bad_type(&arg.ty, e))?;
        let len = match &arg.len {
            None => None,
            Some(RawLen::Count(n)) => Some(LenExpr::Fixed(*n)),
            Some(RawLen::Expr(expr)) => {
                Some(parse_len(expr, &names).ok_or_else(|| SchemaError::BadLength {
                    function: raw.name.clone(),
                    expr: expr.clone(),
                })?)
            }
        };
        let buffer_target = match &arg.buffer {
            None => None,
            Some(name) => Some(
                gl::buffer_target_from_name(name)
                    .ok_or_else(|| bad_type(&arg.ty, format!("unknown buffer target '{}'", name)))?,
            ),
        };
        params.push(Param {
            name: arg.name.clone(),
            ty,
            dir: arg.dir,
            len,
            buffer_target,
        });
    }
    let ret = ArgType::parse(&raw.ret).map_err(|e| bad_type(&raw.ret, e))?;

    Ok(Signature {
        id: raw.id,
        name: raw.name,
        params,
        ret,
        side_effects: raw.side_effects,
        frame_boundary: raw.frame_boundary,
        unsupported: raw.unsupported,
    })
}

/// `arg:<name>[*k]` or `image:<fmt>,<type>,<w>,<h>[,<d>]`
fn parse_len(expr: &str, names: &[&str]) -> Option<LenExpr> {
    let index = |name: &str| names.iter().position(|n| *n == name.trim());
    let (kind, rest) = expr.split_once(':')?;
    match kind {
        "arg" => {
            let (name, multiplier) = match rest.split_once('*') {
                Some((name, k)) => (name, k.trim().parse().ok()?),
                None => (rest, 1),
            };
            Some(LenExpr::Arg {
                index: index(name)?,
                multiplier,
            })
        }
        "image" => {
            let parts: Vec<&str> = rest.split(',').collect();
            if parts.len() != 4 && parts.len() != 5 {
                return None;
            }
            Some(LenExpr::Image {
                format: index(parts[0])?,
                ty: index(parts[1])?,
                width: index(parts[2])?,
                height: index(parts[3])?,
                depth: match parts.get(4) {
                    Some(d) => Some(index(d)?),
                    None => None,
                },
            })
        }
        _ => None,
    }
}

//! Compiled schema components and the loader that builds them from XSD
//! files, following `xs:import` and `xs:include` relative to each file.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;

use super::SchemaError;
use super::dom::{self, QName, XmlNode};
use super::simple::{Builtin, Facets, WhiteSpace, XS_NS};

/// Type of an element or attribute.
#[derive(Debug, Clone)]
pub enum TypeDef {
    Named(QName),
    Complex(Box<ComplexType>),
    Simple(Box<SimpleType>),
    /// `xs:anyType` or no type given: anything is accepted.
    AnyType,
}

#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub name: QName,
    pub ty: TypeDef,
}

#[derive(Debug, Clone)]
pub struct Particle {
    pub min: u32,
    /// `None` is unbounded.
    pub max: Option<u32>,
    pub term: Term,
}

#[derive(Debug, Clone)]
pub enum Term {
    Element(ElementDecl),
    ElementRef(QName),
    Sequence(Vec<Particle>),
    Choice(Vec<Particle>),
    All(Vec<Particle>),
    Any { skip: bool },
    Group(QName),
}

#[derive(Debug, Clone)]
pub enum AttributeUse {
    Decl {
        name: QName,
        ty: TypeDef,
        required: bool,
    },
    Ref {
        name: QName,
        required: bool,
    },
}

#[derive(Debug, Clone, Default)]
pub struct AttributeSet {
    pub uses: Vec<AttributeUse>,
    pub groups: Vec<QName>,
    pub any: bool,
}

#[derive(Debug, Clone)]
pub struct Derivation {
    pub base: QName,
    pub extension: bool,
}

#[derive(Debug, Clone)]
pub enum Content {
    Empty,
    Elements(Particle),
    Simple(SimpleType),
}

#[derive(Debug, Clone)]
pub struct ComplexType {
    pub derivation: Option<Derivation>,
    pub content: Content,
    pub attributes: AttributeSet,
    pub mixed: bool,
}

#[derive(Debug, Clone)]
pub enum Variety {
    Restriction(TypeDef),
    List(TypeDef),
    Union(Vec<TypeDef>),
}

#[derive(Debug, Clone)]
pub struct SimpleType {
    pub variety: Variety,
    pub facets: Facets,
}

/// All global components reachable from one root schema file.
#[derive(Debug, Default)]
pub struct CompiledSchema {
    pub(crate) elements: HashMap<QName, ElementDecl>,
    pub(crate) complex_types: HashMap<QName, ComplexType>,
    pub(crate) simple_types: HashMap<QName, SimpleType>,
    pub(crate) groups: HashMap<QName, Particle>,
    pub(crate) attribute_groups: HashMap<QName, AttributeSet>,
    pub(crate) attributes: HashMap<QName, TypeDef>,
    files: Vec<PathBuf>,
}

impl CompiledSchema {
    /// Load and compile the schema at `path` together with everything it
    /// imports or includes.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let mut loader = Loader::default();
        loader.load_file(path, None)?;
        let schema = loader.schema;
        References { schema: &schema }
            .check()
            .map_err(|reason| SchemaError::Unparsable {
                path: path.to_path_buf(),
                reason,
            })?;
        tracing::debug!(
            schema = %path.display(),
            files = schema.files.len(),
            elements = schema.elements.len(),
            types = schema.complex_types.len() + schema.simple_types.len(),
            "compiled XML schema"
        );
        Ok(schema)
    }

    /// Files that contributed components, root first.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn has_element(&self, ns: &str, local: &str) -> bool {
        self.elements.contains_key(&QName::new(ns, local))
    }
}

#[derive(Default)]
struct Loader {
    schema: CompiledSchema,
    seen: HashSet<PathBuf>,
}

impl Loader {
    fn load_file(&mut self, path: &Path, chameleon_ns: Option<&str>) -> Result<(), SchemaError> {
        let unavailable = |source| SchemaError::Unavailable {
            path: path.to_path_buf(),
            source,
        };
        let canonical = fs::canonicalize(path).map_err(unavailable)?;
        if !self.seen.insert(canonical.clone()) {
            return Ok(());
        }
        let bytes = fs::read(&canonical).map_err(unavailable)?;
        let unparsable = |reason: String| SchemaError::Unparsable {
            path: canonical.clone(),
            reason,
        };

        let root = dom::parse_document(&bytes).map_err(|e| unparsable(e.to_string()))?;
        if root.name != QName::new(XS_NS, "schema") {
            return Err(unparsable(format!("root element is '{}', not xs:schema", root.raw)));
        }
        self.schema.files.push(canonical.clone());

        let ctx = Ctx {
            target_ns: root
                .attr("targetNamespace")
                .or(chameleon_ns)
                .unwrap_or_default()
                .to_string(),
            qualified_elements: root.attr("elementFormDefault") == Some("qualified"),
            qualified_attributes: root.attr("attributeFormDefault") == Some("qualified"),
        };
        let dir = canonical.parent().map(Path::to_path_buf).unwrap_or_default();

        for child in xs_children(&root) {
            match child.name.local.as_str() {
                "import" | "include" => {
                    // A namespace-only import is fine as long as nothing
                    // refers into it; the reference check catches the rest.
                    let Some(location) = child.attr("schemaLocation") else {
                        if child.name.local == "include" {
                            return Err(unparsable("xs:include without schemaLocation".into()));
                        }
                        continue;
                    };
                    if location.contains("://") {
                        return Err(unparsable(format!(
                            "remote schema location '{location}' is not fetched"
                        )));
                    }
                    let chameleon = (child.name.local == "include").then_some(ctx.target_ns.as_str());
                    self.load_file(&dir.join(location), chameleon)?;
                }
                "element" => {
                    let decl = ctx.element(child, true).map_err(unparsable)?;
                    self.schema.elements.insert(decl.name.clone(), decl);
                }
                "complexType" => {
                    let name = ctx.global_name(child).map_err(unparsable)?;
                    let ct = ctx.complex_type(child).map_err(unparsable)?;
                    self.schema.complex_types.insert(name, ct);
                }
                "simpleType" => {
                    let name = ctx.global_name(child).map_err(unparsable)?;
                    let st = ctx.simple_type(child).map_err(unparsable)?;
                    self.schema.simple_types.insert(name, st);
                }
                "group" => {
                    let name = ctx.global_name(child).map_err(unparsable)?;
                    if let Some(p) = ctx.first_particle(child).map_err(unparsable)? {
                        self.schema.groups.insert(name, p);
                    }
                }
                "attributeGroup" => {
                    let name = ctx.global_name(child).map_err(unparsable)?;
                    let mut set = AttributeSet::default();
                    for a in xs_children(child) {
                        ctx.attribute_into(a, &mut set).map_err(unparsable)?;
                    }
                    self.schema.attribute_groups.insert(name, set);
                }
                "attribute" => {
                    let name = ctx.global_name(child).map_err(unparsable)?;
                    Ctx::reject_fixed(child).map_err(unparsable)?;
                    let ty = ctx.simple_type_of(child).map_err(unparsable)?;
                    self.schema.attributes.insert(name, ty);
                }
                other => return Err(unparsable(unsupported(other))),
            }
        }
        Ok(())
    }
}

fn xs_children(node: &XmlNode) -> impl Iterator<Item = &XmlNode> {
    node.children
        .iter()
        .filter(|c| c.name.ns == XS_NS && c.name.local != "annotation")
}

fn unsupported(local: &str) -> String {
    format!("xs:{local} is not supported")
}

const FACETS: [&str; 13] = [
    "pattern",
    "enumeration",
    "length",
    "minLength",
    "maxLength",
    "totalDigits",
    "fractionDigits",
    "minInclusive",
    "maxInclusive",
    "minExclusive",
    "maxExclusive",
    "whiteSpace",
    "assertion",
];

struct Ctx {
    target_ns: String,
    qualified_elements: bool,
    qualified_attributes: bool,
}

impl Ctx {
    fn global_name(&self, node: &XmlNode) -> Result<QName, String> {
        node.attr("name")
            .map(|n| QName::new(self.target_ns.as_str(), n))
            .ok_or_else(|| format!("global xs:{} without a name", node.name.local))
    }

    fn qname_attr(&self, node: &XmlNode, attr: &str) -> Result<Option<QName>, String> {
        match node.attr(attr) {
            None => Ok(None),
            Some(value) => node
                .resolve_qname(value)
                .map(Some)
                .ok_or_else(|| format!("cannot resolve prefix in {attr}=\"{value}\"")),
        }
    }

    fn named_type(&self, name: QName) -> TypeDef {
        if name == QName::new(XS_NS, "anyType") {
            TypeDef::AnyType
        } else {
            TypeDef::Named(name)
        }
    }

    /// Value constraints the validator does not enforce.
    fn reject_fixed(node: &XmlNode) -> Result<(), String> {
        match node.attr("fixed") {
            Some(_) => Err(format!("fixed value on xs:{} is not supported", node.name.local)),
            None => Ok(()),
        }
    }

    fn element(&self, node: &XmlNode, global: bool) -> Result<ElementDecl, String> {
        let local = node.attr("name").ok_or("xs:element without name or ref")?;
        if node.attr("substitutionGroup").is_some() {
            return Err(format!("substitution group on element '{local}' is not supported"));
        }
        if node.attr("abstract") == Some("true") {
            return Err(format!("abstract element '{local}' is not supported"));
        }
        Self::reject_fixed(node)?;
        for child in xs_children(node) {
            match child.name.local.as_str() {
                "complexType" | "simpleType" => {}
                c @ ("key" | "keyref" | "unique") => {
                    return Err(format!(
                        "identity constraint xs:{c} on element '{local}' is not supported"
                    ));
                }
                other => return Err(unsupported(other)),
            }
        }
        let qualified = global
            || match node.attr("form") {
                Some(form) => form == "qualified",
                None => self.qualified_elements,
            };
        let ns = if qualified { self.target_ns.as_str() } else { "" };
        Ok(ElementDecl {
            name: QName::new(ns, local),
            ty: self.type_of(node)?,
        })
    }

    fn type_of(&self, node: &XmlNode) -> Result<TypeDef, String> {
        if let Some(name) = self.qname_attr(node, "type")? {
            return Ok(self.named_type(name));
        }
        for child in xs_children(node) {
            match child.name.local.as_str() {
                "complexType" => return Ok(TypeDef::Complex(Box::new(self.complex_type(child)?))),
                "simpleType" => return Ok(TypeDef::Simple(Box::new(self.simple_type(child)?))),
                _ => {}
            }
        }
        Ok(TypeDef::AnyType)
    }

    fn simple_type_of(&self, node: &XmlNode) -> Result<TypeDef, String> {
        if let Some(name) = self.qname_attr(node, "type")? {
            return Ok(self.named_type(name));
        }
        match xs_children(node).find(|c| c.name.local == "simpleType") {
            Some(st) => Ok(TypeDef::Simple(Box::new(self.simple_type(st)?))),
            None => Ok(TypeDef::AnyType),
        }
    }

    fn occurs(node: &XmlNode) -> Result<(u32, Option<u32>), String> {
        let min = match node.attr("minOccurs") {
            Some(v) => v.trim().parse().map_err(|_| format!("bad minOccurs '{v}'"))?,
            None => 1,
        };
        let max = match node.attr("maxOccurs").map(str::trim) {
            Some("unbounded") => None,
            Some(v) => Some(v.parse().map_err(|_| format!("bad maxOccurs '{v}'"))?),
            None => Some(1),
        };
        Ok((min, max))
    }

    fn particle(&self, node: &XmlNode) -> Result<Option<Particle>, String> {
        let term = match node.name.local.as_str() {
            "element" => match self.qname_attr(node, "ref")? {
                Some(r) => Term::ElementRef(r),
                None => Term::Element(self.element(node, false)?),
            },
            "sequence" => Term::Sequence(self.particles(node)?),
            "choice" => Term::Choice(self.particles(node)?),
            "all" => Term::All(self.particles(node)?),
            "any" => Term::Any {
                skip: node.attr("processContents") == Some("skip"),
            },
            "group" => match self.qname_attr(node, "ref")? {
                Some(r) => Term::Group(r),
                None => return Err("local xs:group without ref".into()),
            },
            _ => return Ok(None),
        };
        let (min, max) = Self::occurs(node)?;
        Ok(Some(Particle { min, max, term }))
    }

    fn particles(&self, node: &XmlNode) -> Result<Vec<Particle>, String> {
        xs_children(node)
            .map(|child| self.particle(child)?.ok_or_else(|| unsupported(&child.name.local)))
            .collect()
    }

    /// The single model group of a global `xs:group`.
    fn first_particle(&self, node: &XmlNode) -> Result<Option<Particle>, String> {
        let mut found = None;
        for child in xs_children(node) {
            match self.particle(child)? {
                Some(p) if found.is_none() => found = Some(p),
                Some(_) => return Err("xs:group with more than one model group".into()),
                None => return Err(unsupported(&child.name.local)),
            }
        }
        Ok(found)
    }

    fn attribute_into(&self, node: &XmlNode, set: &mut AttributeSet) -> Result<(), String> {
        match node.name.local.as_str() {
            "attribute" => {
                let required = node.attr("use") == Some("required");
                if node.attr("use") == Some("prohibited") {
                    return Ok(());
                }
                Self::reject_fixed(node)?;
                if let Some(name) = self.qname_attr(node, "ref")? {
                    set.uses.push(AttributeUse::Ref { name, required });
                    return Ok(());
                }
                let local = node.attr("name").ok_or("xs:attribute without name or ref")?;
                let qualified = match node.attr("form") {
                    Some(form) => form == "qualified",
                    None => self.qualified_attributes,
                };
                let ns = if qualified { self.target_ns.as_str() } else { "" };
                set.uses.push(AttributeUse::Decl {
                    name: QName::new(ns, local),
                    ty: self.simple_type_of(node)?,
                    required,
                });
            }
            "attributeGroup" => {
                let name = self
                    .qname_attr(node, "ref")?
                    .ok_or("local xs:attributeGroup without ref")?;
                set.groups.push(name);
            }
            "anyAttribute" => set.any = true,
            other => return Err(unsupported(other)),
        }
        Ok(())
    }

    fn complex_type(&self, node: &XmlNode) -> Result<ComplexType, String> {
        let mut ct = ComplexType {
            derivation: None,
            content: Content::Empty,
            attributes: AttributeSet::default(),
            mixed: node.attr("mixed") == Some("true"),
        };

        for child in xs_children(node) {
            match child.name.local.as_str() {
                "simpleContent" => {
                    let d = derivation_of(child)?;
                    let base = self
                        .qname_attr(d, "base")?
                        .ok_or("simpleContent derivation without base")?;
                    let mut facets = Facets::default();
                    for item in xs_children(d) {
                        if FACETS.contains(&item.name.local.as_str()) {
                            if d.name.local == "extension" {
                                return Err(format!("facet xs:{} inside an extension", item.name.local));
                            }
                            self.facet_into(item, &mut facets)?;
                        } else {
                            self.attribute_into(item, &mut ct.attributes)?;
                        }
                    }
                    ct.derivation = Some(Derivation {
                        base: base.clone(),
                        extension: d.name.local == "extension",
                    });
                    ct.content = Content::Simple(SimpleType {
                        variety: Variety::Restriction(self.named_type(base)),
                        facets,
                    });
                }
                "complexContent" => {
                    ct.mixed |= child.attr("mixed") == Some("true");
                    let d = derivation_of(child)?;
                    let base = self
                        .qname_attr(d, "base")?
                        .ok_or("complexContent derivation without base")?;
                    for item in xs_children(d) {
                        if let Some(p) = self.particle(item)? {
                            ct.content = Content::Elements(p);
                        } else {
                            self.attribute_into(item, &mut ct.attributes)?;
                        }
                    }
                    ct.derivation = Some(Derivation {
                        base,
                        extension: d.name.local == "extension",
                    });
                }
                "sequence" | "choice" | "all" | "group" => {
                    if let Some(p) = self.particle(child)? {
                        ct.content = Content::Elements(p);
                    }
                }
                _ => self.attribute_into(child, &mut ct.attributes)?,
            }
        }
        Ok(ct)
    }

    fn simple_type(&self, node: &XmlNode) -> Result<SimpleType, String> {
        let mut st = SimpleType {
            variety: Variety::Restriction(TypeDef::AnyType),
            facets: Facets::default(),
        };
        let d = xs_children(node)
            .next()
            .ok_or("xs:simpleType without restriction, list or union")?;
        match d.name.local.as_str() {
            "restriction" => {
                let base = match self.qname_attr(d, "base")? {
                    Some(b) => self.named_type(b),
                    None => self.simple_type_of(d)?,
                };
                st.variety = Variety::Restriction(base);
                for item in xs_children(d).filter(|c| c.name.local != "simpleType") {
                    self.facet_into(item, &mut st.facets)?;
                }
            }
            "list" => {
                let item = match self.qname_attr(d, "itemType")? {
                    Some(t) => self.named_type(t),
                    None => self.simple_type_of(d)?,
                };
                st.variety = Variety::List(item);
            }
            "union" => {
                let mut members = Vec::new();
                for value in d.attr("memberTypes").unwrap_or_default().split_whitespace() {
                    let name = d
                        .resolve_qname(value)
                        .ok_or_else(|| format!("cannot resolve union member '{value}'"))?;
                    members.push(self.named_type(name));
                }
                for inline in xs_children(d).filter(|c| c.name.local == "simpleType") {
                    members.push(TypeDef::Simple(Box::new(self.simple_type(inline)?)));
                }
                if members.is_empty() {
                    return Err("xs:union without member types".into());
                }
                st.variety = Variety::Union(members);
            }
            other => return Err(unsupported(other)),
        }
        Ok(st)
    }

    fn facet_into(&self, node: &XmlNode, facets: &mut Facets) -> Result<(), String> {
        let local = node.name.local.as_str();
        let value = node
            .attr("value")
            .ok_or_else(|| format!("facet xs:{local} without a value"))?;
        let bad = || format!("bad {local} value '{value}'");
        let count = || value.trim().parse::<usize>().map_err(|_| bad());
        let digits = || value.trim().parse::<u32>().map_err(|_| bad());
        let bound = || value.trim().parse::<Decimal>().map_err(|_| bad());
        match local {
            "pattern" => facets.add_pattern(value)?,
            "enumeration" => facets.enumeration.push(value.to_string()),
            "length" => facets.length = Some(count()?),
            "minLength" => facets.min_length = Some(count()?),
            "maxLength" => facets.max_length = Some(count()?),
            "totalDigits" => facets.total_digits = Some(digits()?),
            "fractionDigits" => facets.fraction_digits = Some(digits()?),
            "minInclusive" => facets.min_inclusive = Some(bound()?),
            "maxInclusive" => facets.max_inclusive = Some(bound()?),
            "minExclusive" => facets.min_exclusive = Some(bound()?),
            "maxExclusive" => facets.max_exclusive = Some(bound()?),
            "whiteSpace" => facets.white_space = Some(WhiteSpace::parse(value).ok_or_else(bad)?),
            other => return Err(format!("facet xs:{other} is not supported")),
        }
        Ok(())
    }
}

fn derivation_of(content: &XmlNode) -> Result<&XmlNode, String> {
    match xs_children(content).next() {
        Some(d) if matches!(d.name.local.as_str(), "restriction" | "extension") => Ok(d),
        Some(d) => Err(unsupported(&d.name.local)),
        None => Err(format!("xs:{} without a derivation", content.name.local)),
    }
}

/// Every named reference resolves to a built-in or a loaded component.
struct References<'a> {
    schema: &'a CompiledSchema,
}

impl References<'_> {
    fn check(&self) -> Result<(), String> {
        let s = self.schema;
        s.elements.values().try_for_each(|e| self.type_def(&e.ty))?;
        s.complex_types.values().try_for_each(|ct| self.complex(ct))?;
        s.simple_types.values().try_for_each(|st| self.simple(st))?;
        s.groups.values().try_for_each(|p| self.particle(p))?;
        s.attribute_groups.values().try_for_each(|a| self.attributes(a))?;
        s.attributes.values().try_for_each(|t| self.type_def(t))
    }

    fn type_name(&self, name: &QName) -> Result<(), String> {
        let s = self.schema;
        if Builtin::from_qname(name).is_some()
            || *name == QName::new(XS_NS, "anyType")
            || s.simple_types.contains_key(name)
            || s.complex_types.contains_key(name)
        {
            Ok(())
        } else {
            Err(format!("type '{name}' is not declared"))
        }
    }

    fn type_def(&self, ty: &TypeDef) -> Result<(), String> {
        match ty {
            TypeDef::AnyType => Ok(()),
            TypeDef::Named(name) => self.type_name(name),
            TypeDef::Complex(ct) => self.complex(ct),
            TypeDef::Simple(st) => self.simple(st),
        }
    }

    fn complex(&self, ct: &ComplexType) -> Result<(), String> {
        if let Some(d) = &ct.derivation {
            self.type_name(&d.base)?;
        }
        match &ct.content {
            Content::Empty => {}
            Content::Elements(p) => self.particle(p)?,
            Content::Simple(st) => self.simple(st)?,
        }
        self.attributes(&ct.attributes)
    }

    fn simple(&self, st: &SimpleType) -> Result<(), String> {
        match &st.variety {
            Variety::Restriction(t) | Variety::List(t) => self.type_def(t),
            Variety::Union(members) => members.iter().try_for_each(|m| self.type_def(m)),
        }
    }

    fn particle(&self, p: &Particle) -> Result<(), String> {
        match &p.term {
            Term::Element(decl) => self.type_def(&decl.ty),
            Term::ElementRef(name) if self.schema.elements.contains_key(name) => Ok(()),
            Term::ElementRef(name) => Err(format!("element '{name}' is not declared")),
            Term::Sequence(items) | Term::Choice(items) | Term::All(items) => {
                items.iter().try_for_each(|i| self.particle(i))
            }
            Term::Any { .. } => Ok(()),
            Term::Group(name) if self.schema.groups.contains_key(name) => Ok(()),
            Term::Group(name) => Err(format!("group '{name}' is not declared")),
        }
    }

    fn attributes(&self, set: &AttributeSet) -> Result<(), String> {
        for attr in &set.uses {
            match attr {
                AttributeUse::Decl { ty, .. } => self.type_def(ty)?,
                AttributeUse::Ref { name, .. } if !self.schema.attributes.contains_key(name) => {
                    return Err(format!("attribute '{name}' is not declared"));
                }
                AttributeUse::Ref { .. } => {}
            }
        }
        match set
            .groups
            .iter()
            .find(|g| !self.schema.attribute_groups.contains_key(*g))
        {
            Some(g) => Err(format!("attribute group '{g}' is not declared")),
            None => Ok(()),
        }
    }
}

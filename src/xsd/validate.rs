//! Instance validation against a [`CompiledSchema`].
//!
//! Content models are matched greedily with one element of lookahead, which
//! is exact for schemas obeying the unique particle attribution rule.

use std::collections::{BTreeSet, HashMap};

use super::SchemaViolation;
use super::dom::{QName, XmlNode};
use super::model::*;
use super::simple::{Builtin, collapse};

const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const MAX_DEPTH: usize = 64;

/// Validate a parsed document. Returns every violation found.
pub fn validate_document(schema: &CompiledSchema, root: &XmlNode) -> Vec<SchemaViolation> {
    let mut v = Validator {
        schema,
        violations: Vec::new(),
    };
    let path = format!("/{}", root.raw);
    match schema.elements.get(&root.name) {
        Some(decl) => v.element(root, decl, &path),
        None => v.report(&path, format!("no global declaration for root element {}", root.name)),
    }
    v.violations
}

#[derive(Clone, Copy)]
enum Match<'s> {
    Decl(&'s ElementDecl),
    Wildcard { skip: bool },
}

struct MatchState<'s> {
    assigned: Vec<Option<Match<'s>>>,
    furthest: usize,
    expected: BTreeSet<String>,
}

impl MatchState<'_> {
    fn expect(&mut self, pos: usize, what: String) {
        if pos > self.furthest {
            self.furthest = pos;
            self.expected.clear();
        }
        if pos == self.furthest {
            self.expected.insert(what);
        }
    }
}

#[derive(Default)]
struct Effective<'s> {
    particles: Vec<&'s Particle>,
    simple: Option<&'s SimpleType>,
    attrs: Vec<(&'s QName, Option<&'s TypeDef>, bool)>,
    any_attribute: bool,
    mixed: bool,
}

struct Validator<'s> {
    schema: &'s CompiledSchema,
    violations: Vec<SchemaViolation>,
}

impl<'s> Validator<'s> {
    fn report(&mut self, path: &str, reason: String) {
        self.violations.push(SchemaViolation {
            path: path.to_string(),
            reason,
        });
    }

    fn element(&mut self, node: &XmlNode, decl: &'s ElementDecl, path: &str) {
        let nil = node
            .attrs
            .iter()
            .any(|a| a.name == QName::new(XSI_NS, "nil") && a.value.trim() == "true");
        if nil {
            return;
        }
        self.typed(node, &decl.ty, path);
    }

    fn typed(&mut self, node: &XmlNode, ty: &'s TypeDef, path: &str) {
        match ty {
            TypeDef::AnyType => {}
            TypeDef::Complex(ct) => self.complex(node, ct, path),
            TypeDef::Simple(_) => self.simple_element(node, ty, path),
            TypeDef::Named(name) => {
                if Builtin::from_qname(name).is_some() || self.schema.simple_types.contains_key(name) {
                    self.simple_element(node, ty, path);
                } else if let Some(ct) = self.schema.complex_types.get(name) {
                    self.complex(node, ct, path);
                } else {
                    self.report(path, format!("type '{name}' is not declared"));
                }
            }
        }
    }

    fn simple_element(&mut self, node: &XmlNode, ty: &'s TypeDef, path: &str) {
        if !node.children.is_empty() {
            self.report(path, "element must not contain child elements".into());
        }
        for attr in node.attrs.iter().filter(|a| a.name.ns != XSI_NS) {
            self.report(path, format!("attribute '{}' is not allowed", attr.raw));
        }
        if let Err(reason) = self.check_simple(ty, &node.text, 0) {
            self.report(path, reason);
        }
    }

    fn check_simple(&self, ty: &TypeDef, value: &str, depth: usize) -> Result<(), String> {
        if depth > MAX_DEPTH {
            return Ok(());
        }
        match ty {
            TypeDef::AnyType => Ok(()),
            TypeDef::Simple(st) => self.check_simple_type(st, value, depth),
            TypeDef::Complex(ct) => match &ct.content {
                Content::Simple(st) => self.check_simple_type(st, value, depth),
                _ => Ok(()),
            },
            TypeDef::Named(name) => {
                if let Some(builtin) = Builtin::from_qname(name) {
                    if builtin.collapses() {
                        builtin.check(&collapse(value))
                    } else {
                        builtin.check(value)
                    }
                } else if let Some(st) = self.schema.simple_types.get(name) {
                    self.check_simple_type(st, value, depth)
                } else if let Some(Content::Simple(st)) =
                    self.schema.complex_types.get(name).map(|ct| &ct.content)
                {
                    self.check_simple_type(st, value, depth)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn check_simple_type(&self, st: &SimpleType, value: &str, depth: usize) -> Result<(), String> {
        match &st.variety {
            Variety::Restriction(base) => {
                self.check_simple(base, value, depth + 1)?;
                if st.facets.is_empty() {
                    return Ok(());
                }
                if let Some(normalized) = st.facets.normalize(value) {
                    st.facets.check(&normalized)
                } else if self.collapses(base, depth + 1) {
                    st.facets.check(&collapse(value))
                } else {
                    st.facets.check(value)
                }
            }
            Variety::List(item) => {
                for token in value.split_whitespace() {
                    self.check_simple(item, token, depth + 1)?;
                }
                Ok(())
            }
            Variety::Union(members) => {
                if members.is_empty()
                    || members
                        .iter()
                        .any(|m| self.check_simple(m, value, depth + 1).is_ok())
                {
                    Ok(())
                } else {
                    Err(format!("'{value}' matches no member type of the union"))
                }
            }
        }
    }

    fn collapses(&self, ty: &TypeDef, depth: usize) -> bool {
        if depth > MAX_DEPTH {
            return false;
        }
        let st = match ty {
            TypeDef::AnyType => return false,
            TypeDef::Simple(st) => st.as_ref(),
            TypeDef::Complex(ct) => match &ct.content {
                Content::Simple(st) => st,
                _ => return false,
            },
            TypeDef::Named(name) => {
                if let Some(builtin) = Builtin::from_qname(name) {
                    return builtin.collapses();
                }
                match (
                    self.schema.simple_types.get(name),
                    self.schema.complex_types.get(name).map(|ct| &ct.content),
                ) {
                    (Some(st), _) | (None, Some(Content::Simple(st))) => st,
                    _ => return false,
                }
            }
        };
        match &st.variety {
            Variety::Restriction(base) => self.collapses(base, depth + 1),
            Variety::List(_) | Variety::Union(_) => true,
        }
    }

    fn effective(&self, ct: &'s ComplexType, depth: usize) -> Effective<'s> {
        let mut eff = match &ct.derivation {
            Some(d) if depth < MAX_DEPTH => match self.schema.complex_types.get(&d.base) {
                Some(base) => {
                    let mut e = self.effective(base, depth + 1);
                    if !d.extension {
                        e.particles.clear();
                    }
                    e
                }
                None => Effective::default(),
            },
            _ => Effective::default(),
        };
        match &ct.content {
            Content::Empty => {}
            Content::Elements(p) => eff.particles.push(p),
            Content::Simple(st) => eff.simple = Some(st),
        }
        eff.mixed |= ct.mixed;
        self.collect_attributes(&ct.attributes, &mut eff, depth);
        eff
    }

    fn collect_attributes(&self, set: &'s AttributeSet, eff: &mut Effective<'s>, depth: usize) {
        if depth > MAX_DEPTH {
            return;
        }
        for attr in &set.uses {
            match attr {
                AttributeUse::Decl { name, ty, required } => eff.attrs.push((name, Some(ty), *required)),
                AttributeUse::Ref { name, required } => {
                    eff.attrs
                        .push((name, self.schema.attributes.get(name), *required))
                }
            }
        }
        for group in &set.groups {
            if let Some(g) = self.schema.attribute_groups.get(group) {
                self.collect_attributes(g, eff, depth + 1);
            }
        }
        eff.any_attribute |= set.any;
    }

    fn complex(&mut self, node: &XmlNode, ct: &'s ComplexType, path: &str) {
        let eff = self.effective(ct, 0);
        self.attributes(node, &eff, path);

        if let Some(st) = eff.simple {
            if !node.children.is_empty() {
                self.report(path, "element must not contain child elements".into());
            }
            if let Err(reason) = self.check_simple_type(st, &node.text, 0) {
                self.report(path, reason);
            }
            return;
        }

        if !eff.mixed && node.has_text() {
            self.report(path, "character content is not allowed here".into());
        }
        self.content(node, &eff.particles, path);
    }

    fn attributes(&mut self, node: &XmlNode, eff: &Effective<'s>, path: &str) {
        for attr in node.attrs.iter().filter(|a| a.name.ns != XSI_NS) {
            let attr_path = format!("{path}/@{}", attr.raw);
            match eff.attrs.iter().rev().find(|(name, _, _)| **name == attr.name) {
                Some((_, Some(ty), _)) => {
                    if let Err(reason) = self.check_simple(ty, &attr.value, 0) {
                        self.report(&attr_path, reason);
                    }
                }
                Some((_, None, _)) => {}
                None if eff.any_attribute => {}
                None => self.report(&attr_path, format!("attribute '{}' is not allowed", attr.raw)),
            }
        }

        let mut seen = BTreeSet::new();
        for (name, _, required) in eff.attrs.iter().rev() {
            if !seen.insert(*name) || !*required {
                continue;
            }
            if !node.attrs.iter().any(|a| a.name == **name) {
                self.report(path, format!("missing required attribute '{}'", name.local));
            }
        }
    }

    fn content(&mut self, node: &XmlNode, particles: &[&'s Particle], path: &str) {
        let kids: Vec<&XmlNode> = node.children.iter().collect();
        let mut state = MatchState {
            assigned: vec![None; kids.len()],
            furthest: 0,
            expected: BTreeSet::new(),
        };

        let mut pos = Some(0);
        for p in particles {
            pos = pos.and_then(|at| self.consume(p, &kids, at, &mut state, 0));
        }
        let failed_at = match pos {
            Some(end) if end == kids.len() => None,
            Some(end) => Some(end),
            None => Some(state.furthest),
        };
        if let Some(at) = failed_at {
            let expected = if state.furthest == at && !state.expected.is_empty() {
                state.expected.iter().cloned().collect::<Vec<_>>().join(", ")
            } else {
                "no further elements".to_string()
            };
            let reason = match kids.get(at) {
                Some(kid) => format!("unexpected element '{}'; expected {expected}", kid.raw),
                None => format!("missing child element; expected {expected}"),
            };
            self.report(path, reason);
        }

        let child_paths = child_paths(path, &kids);
        for (i, kid) in kids.iter().enumerate() {
            let m = match state.assigned[i] {
                Some(m) => m,
                None => match self.schema.elements.get(&kid.name) {
                    Some(decl) => Match::Decl(decl),
                    None => continue,
                },
            };
            match m {
                Match::Decl(decl) => self.element(kid, decl, &child_paths[i]),
                Match::Wildcard { skip: false } => {
                    if let Some(decl) = self.schema.elements.get(&kid.name) {
                        self.element(kid, decl, &child_paths[i]);
                    }
                }
                Match::Wildcard { skip: true } => {}
            }
        }
    }

    /// Match `p` with its occurrence bounds starting at `pos`.
    fn consume(
        &self,
        p: &'s Particle,
        kids: &[&XmlNode],
        mut pos: usize,
        state: &mut MatchState<'s>,
        depth: usize,
    ) -> Option<usize> {
        if depth > MAX_DEPTH {
            return None;
        }
        let mut count = 0;
        loop {
            if p.max.is_some_and(|max| count >= max) {
                break;
            }
            match self.consume_once(&p.term, kids, pos, state, depth) {
                Some(next) if next > pos => {
                    pos = next;
                    count += 1;
                }
                Some(_) => {
                    count = count.max(p.min);
                    break;
                }
                None => break,
            }
        }
        (count >= p.min).then_some(pos)
    }

    fn consume_once(
        &self,
        term: &'s Term,
        kids: &[&XmlNode],
        pos: usize,
        state: &mut MatchState<'s>,
        depth: usize,
    ) -> Option<usize> {
        match term {
            Term::Element(decl) => {
                match_element(&decl.name, Match::Decl(decl), kids, pos, state)
            }
            Term::ElementRef(name) => {
                let decl = self.schema.elements.get(name)?;
                match_element(name, Match::Decl(decl), kids, pos, state)
            }
            Term::Sequence(items) => {
                let mut at = pos;
                for item in items {
                    at = self.consume(item, kids, at, state, depth + 1)?;
                }
                Some(at)
            }
            Term::Choice(items) => {
                let mut empty_ok = false;
                for item in items {
                    match self.consume(item, kids, pos, state, depth + 1) {
                        Some(next) if next > pos => return Some(next),
                        Some(_) => empty_ok = true,
                        None => {}
                    }
                }
                empty_ok.then_some(pos)
            }
            Term::All(items) => {
                let mut used = vec![false; items.len()];
                let mut at = pos;
                'outer: loop {
                    for (i, item) in items.iter().enumerate() {
                        if used[i] {
                            continue;
                        }
                        if let Some(next) = self.consume(item, kids, at, state, depth + 1) {
                            if next > at {
                                used[i] = true;
                                at = next;
                                continue 'outer;
                            }
                        }
                    }
                    break;
                }
                for (i, item) in items.iter().enumerate() {
                    if !used[i] && item.min > 0 {
                        self.consume(item, kids, at, state, depth + 1)?;
                    }
                }
                Some(at)
            }
            Term::Any { skip } => {
                if pos < kids.len() {
                    state.assigned[pos] = Some(Match::Wildcard { skip: *skip });
                    Some(pos + 1)
                } else {
                    state.expect(pos, "any element".into());
                    None
                }
            }
            Term::Group(name) => {
                let group = self.schema.groups.get(name)?;
                self.consume(group, kids, pos, state, depth + 1)
            }
        }
    }
}

fn match_element<'s>(
    name: &QName,
    m: Match<'s>,
    kids: &[&XmlNode],
    pos: usize,
    state: &mut MatchState<'s>,
) -> Option<usize> {
    match kids.get(pos) {
        Some(kid) if kid.name == *name => {
            state.assigned[pos] = Some(m);
            Some(pos + 1)
        }
        _ => {
            state.expect(pos, name.local.clone());
            None
        }
    }
}

/// `parent/name`, with a 1-based index when siblings share the name.
fn child_paths(parent: &str, kids: &[&XmlNode]) -> Vec<String> {
    let mut totals: HashMap<&str, usize> = HashMap::new();
    for kid in kids {
        *totals.entry(kid.raw.as_str()).or_default() += 1;
    }
    let mut seen: HashMap<&str, usize> = HashMap::new();
    kids.iter()
        .map(|kid| {
            let n = seen.entry(kid.raw.as_str()).or_default();
            *n += 1;
            if totals[kid.raw.as_str()] > 1 {
                format!("{parent}/{}[{n}]", kid.raw)
            } else {
                format!("{parent}/{}", kid.raw)
            }
        })
        .collect()
}

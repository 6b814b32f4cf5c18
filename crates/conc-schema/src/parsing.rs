// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

//! Parser for the compact spec grammar, eg `hdf5@1.12: +mpi %gcc ^openmpi@4`.

use std::collections::BTreeMap;

use crate::foundation::arch::Arch;
use crate::foundation::compiler::CompilerSpec;
use crate::foundation::name::{PkgNameBuf, VariantNameBuf, is_legal_id_char, is_legal_id_start};
use crate::foundation::variant::VariantRequest;
use crate::foundation::version::GIT_PREFIX;
use crate::foundation::version_range::{VersionList, parse_version_list};
use crate::{AbstractSpec, ConflictError, Constraints, Error, ParseError, Result};

#[cfg(test)]
#[path = "./parsing_test.rs"]
mod parsing_test;

const ARCH_KEYS: &[&str] = &["platform", "os", "target"];

fn is_name_char(c: char) -> bool {
    is_legal_id_char(c) || c == '.'
}

fn is_version_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn is_value_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.text.len() - trimmed.len();
    }

    fn take_while<F: Fn(char) -> bool>(&mut self, pred: F) -> &'a str {
        let start = self.pos;
        let len = self
            .rest()
            .find(|c: char| !pred(c))
            .unwrap_or(self.rest().len());
        self.pos += len;
        &self.text[start..self.pos]
    }

    /// True if the next token, after any whitespace, is an `=`
    fn followed_by_assignment(&self) -> bool {
        self.rest().trim_start().starts_with('=')
    }

    fn error<M: Into<String>>(&self, position: usize, message: M) -> ParseError {
        ParseError::new(self.text, position, message)
    }

    /// A version, which may be a revision with an equivalent release.
    fn version_word(&mut self) -> &'a str {
        let start = self.pos;
        let word = self.take_while(is_version_char);
        if word.starts_with(GIT_PREFIX) && self.peek() == Some('=') {
            self.bump();
            self.take_while(is_version_char);
        }
        &self.text[start..self.pos]
    }

    /// Scan a version list, allowing whitespace around its separators,
    /// and return its compacted text.
    fn version_list(&mut self) -> std::result::Result<String, ParseError> {
        let mut out = String::new();
        loop {
            self.skip_ws();
            let start = self.pos;
            match self.peek() {
                Some('=') => {
                    self.bump();
                    self.skip_ws();
                    let word = self.version_word();
                    if word.is_empty() {
                        return Err(self.error(self.pos, "expected a version after '='"));
                    }
                    out.push('=');
                    out.push_str(word);
                }
                Some(':') => {
                    self.bump();
                    out.push(':');
                    self.optional_upper_bound(&mut out);
                }
                _ => {
                    let word = self.version_word();
                    if word.is_empty() {
                        return Err(self.error(start, "expected a version"));
                    }
                    out.push_str(word);
                    let save = self.pos;
                    self.skip_ws();
                    if self.peek() == Some(':') {
                        self.bump();
                        out.push(':');
                        self.optional_upper_bound(&mut out);
                    } else {
                        self.pos = save;
                    }
                }
            }
            let save = self.pos;
            self.skip_ws();
            if self.peek() == Some(',') {
                self.bump();
                out.push(',');
                continue;
            }
            self.pos = save;
            return Ok(out);
        }
    }

    fn optional_upper_bound(&mut self, out: &mut String) {
        let save = self.pos;
        self.skip_ws();
        let word = self.version_word();
        // a word followed by '=' is the next variant assignment
        if word.is_empty() || self.followed_by_assignment() {
            self.pos = save;
            return;
        }
        out.push_str(word);
    }

    fn versions(&mut self, sigil_pos: usize) -> std::result::Result<VersionList, ParseError> {
        let text = self.version_list()?;
        parse_version_list(&text)
            .map_err(|err| self.error(sigil_pos, format!("invalid version list '{text}': {err}")))
    }
}

/// The constraints seen so far in one node, with the position
/// of each so that duplicates can be reported.
#[derive(Default)]
struct NodeBuilder {
    constraints: Constraints,
    versions_at: Option<usize>,
    compiler_at: Option<usize>,
    hash_at: Option<usize>,
    arch_at: BTreeMap<&'static str, usize>,
}

impl NodeBuilder {
    fn set_arch_part(
        &mut self,
        sc: &Scanner<'_>,
        key: &'static str,
        value: &str,
        pos: usize,
    ) -> std::result::Result<(), ParseError> {
        if self.arch_at.insert(key, pos).is_some() {
            return Err(sc.error(pos, format!("duplicate {key} constraint")));
        }
        let slot = match key {
            "platform" => &mut self.constraints.arch.platform,
            "os" => &mut self.constraints.arch.os,
            _ => &mut self.constraints.arch.target,
        };
        *slot = Some(value.to_owned());
        Ok(())
    }

    fn set_variant(
        &mut self,
        sc: &Scanner<'_>,
        name: VariantNameBuf,
        request: VariantRequest,
        pos: usize,
    ) -> Result<()> {
        if let Some(existing) = self.constraints.variants.get(&name) {
            if let (VariantRequest::Bool(a), VariantRequest::Bool(b)) = (existing, &request) {
                if a != b {
                    return Err(ConflictError::new(
                        existing.format_for(&name),
                        request.format_for(&name),
                    )
                    .with_reason(format!("variant {name} cannot be both enabled and disabled"))
                    .into());
                }
            }
            return Err(sc.error(pos, format!("duplicate variant {name}")).into());
        }
        self.constraints.variants.insert(name, request);
        Ok(())
    }
}

fn parse_node(sc: &mut Scanner<'_>, allow_anonymous: bool) -> Result<AbstractSpec> {
    sc.skip_ws();
    let start = sc.pos;
    let mut name = None;
    if sc.peek().is_some_and(is_legal_id_start) {
        let word = sc.take_while(is_name_char);
        if sc.followed_by_assignment() {
            sc.pos = start;
        } else {
            name = Some(
                word.parse::<PkgNameBuf>()
                    .map_err(|err| sc.error(start, err.to_string()))?,
            );
        }
    }
    if name.is_none() && !allow_anonymous {
        return Err(sc.error(start, "expected a package name").into());
    }

    let mut node = NodeBuilder::default();
    loop {
        sc.skip_ws();
        let pos = sc.pos;
        let Some(c) = sc.peek() else {
            break;
        };
        match c {
            '^' => break,
            '@' => {
                sc.bump();
                if node.versions_at.replace(pos).is_some() {
                    return Err(sc.error(pos, "duplicate version constraint").into());
                }
                node.constraints.versions = sc.versions(pos)?;
            }
            '%' => {
                sc.bump();
                if node.compiler_at.replace(pos).is_some() {
                    return Err(sc.error(pos, "duplicate compiler constraint").into());
                }
                sc.skip_ws();
                let name_pos = sc.pos;
                let compiler = sc.take_while(is_name_char);
                if compiler.is_empty() {
                    return Err(sc.error(name_pos, "expected a compiler name after '%'").into());
                }
                let compiler = compiler
                    .parse::<PkgNameBuf>()
                    .map_err(|err| sc.error(name_pos, err.to_string()))?;
                let save = sc.pos;
                sc.skip_ws();
                let versions = if sc.peek() == Some('@') {
                    let at = sc.pos;
                    sc.bump();
                    sc.versions(at)?
                } else {
                    sc.pos = save;
                    VersionList::any()
                };
                node.constraints.compiler = Some(CompilerSpec::new(compiler, versions));
            }
            '+' | '~' | '-' => {
                sc.bump();
                sc.skip_ws();
                let name_pos = sc.pos;
                let variant = sc.take_while(is_legal_id_char);
                if variant.is_empty() {
                    let message = format!("expected a variant name after '{c}'");
                    return Err(sc.error(name_pos, message).into());
                }
                let variant = variant
                    .parse::<VariantNameBuf>()
                    .map_err(|err| sc.error(name_pos, err.to_string()))?;
                node.set_variant(sc, variant, VariantRequest::Bool(c == '+'), pos)?;
            }
            '/' => {
                sc.bump();
                if node.hash_at.replace(pos).is_some() {
                    return Err(sc.error(pos, "duplicate hash constraint").into());
                }
                sc.skip_ws();
                let hash = sc.take_while(|c| c.is_ascii_alphanumeric());
                if hash.is_empty() {
                    return Err(sc.error(pos, "expected a hash after '/'").into());
                }
                node.constraints.hash = Some(hash.to_ascii_lowercase());
            }
            c if is_legal_id_start(c) => {
                let key = sc.take_while(is_legal_id_char);
                if !sc.followed_by_assignment() {
                    return Err(sc.error(pos, format!("unexpected token '{key}'")).into());
                }
                sc.skip_ws();
                sc.bump();
                let mut values = Vec::new();
                loop {
                    sc.skip_ws();
                    let value_pos = sc.pos;
                    let value = sc.take_while(is_value_char);
                    if value.is_empty() {
                        let message = format!("expected a value for {key}");
                        return Err(sc.error(value_pos, message).into());
                    }
                    values.push(value);
                    let save = sc.pos;
                    sc.skip_ws();
                    if sc.peek() == Some(',') {
                        sc.bump();
                        continue;
                    }
                    sc.pos = save;
                    break;
                }
                parse_assignment(sc, &mut node, key, values, pos)?;
            }
            other => {
                return Err(sc.error(pos, format!("unexpected character '{other}'")).into());
            }
        }
    }

    Ok(AbstractSpec {
        name,
        constraints: node.constraints,
        dependencies: Vec::new(),
    })
}

fn parse_assignment(
    sc: &Scanner<'_>,
    node: &mut NodeBuilder,
    key: &str,
    values: Vec<&str>,
    pos: usize,
) -> Result<()> {
    let single = || match values.as_slice() {
        [value] => Ok(*value),
        _ => Err(sc.error(pos, format!("{key} takes a single value"))),
    };
    if let Some(key) = ARCH_KEYS.iter().find(|k| **k == key) {
        node.set_arch_part(sc, *key, single()?, pos)?;
        return Ok(());
    }
    if key == "arch" {
        let arch: Arch = single()?
            .parse()
            .map_err(|err: crate::foundation::arch::InvalidArchError| {
                sc.error(pos, err.to_string())
            })?;
        node.set_arch_part(sc, "platform", &arch.platform, pos)?;
        node.set_arch_part(sc, "os", &arch.os, pos)?;
        node.set_arch_part(sc, "target", &arch.target, pos)?;
        return Ok(());
    }
    let name = key
        .parse::<VariantNameBuf>()
        .map_err(|err| sc.error(pos, err.to_string()))?;
    node.set_variant(sc, name, VariantRequest::from_values(values), pos)
}

/// Parse spec text into an abstract spec.
///
/// When `allow_anonymous` is false the root must be named. Dependency
/// specs introduced with `^` must always be named.
pub fn parse_spec(text: &str, allow_anonymous: bool) -> Result<AbstractSpec> {
    let mut sc = Scanner::new(text);
    let mut root = parse_node(&mut sc, allow_anonymous)?;
    loop {
        sc.skip_ws();
        let caret = sc.pos;
        match sc.bump() {
            None => break,
            Some('^') => {}
            Some(other) => {
                return Err(Error::from(sc.error(caret, format!("unexpected character '{other}'"))));
            }
        }
        sc.skip_ws();
        if matches!(sc.peek(), None | Some('^')) {
            return Err(sc.error(caret, "'^' must be followed by a dependency spec").into());
        }
        let dep_start = sc.pos;
        let dep = parse_node(&mut sc, false)?;
        if root.dependencies.iter().any(|d| d.name == dep.name) {
            let name = dep.name.as_ref().map(ToString::to_string).unwrap_or_default();
            return Err(sc.error(dep_start, format!("duplicate dependency {name}")).into());
        }
        root.dependencies.push(dep);
    }
    Ok(root)
}

//! The field space: a resolvable namespace of field definitions.
//!
//! Each explore owns one `FieldSpace`. Joined explores are registered as
//! sub-namespaces under their join alias and are never merged into the
//! parent namespace. Every transformation (`rename`, `restrict`) builds a
//! new namespace value over shared `Arc` field definitions; nothing is
//! mutated in place.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::explore::Explore;
use crate::model::field::FieldDef;

use super::error::{SemanticErrorKind, SemanticResult};

/// An ordered, resolvable namespace mapping names to field definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FieldSpace {
    /// Fields in insertion order. Order is significant for field-list
    /// expansion and default index fields.
    entries: Vec<(String, Arc<FieldDef>)>,
    /// Join sub-namespaces: alias -> joined explore.
    joins: BTreeMap<String, Arc<Explore>>,
    /// An optional accept/except view over the entries.
    restriction: Option<Restriction>,
}

/// Restriction mode for namespace views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictMode {
    /// Keep only the listed names.
    Accept,
    /// Drop the listed names.
    Except,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Restriction {
    mode: RestrictMode,
    names: Vec<String>,
}

impl Restriction {
    fn admits(&self, name: &str) -> bool {
        let listed = self.names.iter().any(|n| n == name);
        match self.mode {
            RestrictMode::Accept => listed,
            RestrictMode::Except => !listed,
        }
    }
}

impl FieldSpace {
    /// Create an empty field space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a field in this namespace.
    ///
    /// Fails with `DuplicateName` if the name already exists in the
    /// explore's own namespace. Joined-in names do not count as duplicates;
    /// they live in a sub-namespace behind their alias.
    pub fn define(&mut self, field: FieldDef) -> SemanticResult<()> {
        let name = field.name().to_string();
        if self.entry(&name).is_some() || self.joins.contains_key(&name) {
            return Err(SemanticErrorKind::DuplicateName { name }.into());
        }
        self.entries.push((name, Arc::new(field)));
        Ok(())
    }

    /// Register a join sub-namespace under its alias.
    ///
    /// The alias competes with field names for the first path segment, so
    /// it must be unique in the explore's own namespace too.
    pub fn add_join(&mut self, alias: impl Into<String>, target: Arc<Explore>) -> SemanticResult<()> {
        let alias = alias.into();
        if self.entry(&alias).is_some() || self.joins.contains_key(&alias) {
            return Err(SemanticErrorKind::DuplicateName { name: alias }.into());
        }
        self.joins.insert(alias, target);
        Ok(())
    }

    /// Resolve a dotted path to a field definition.
    ///
    /// The first segment resolves in the local namespace; join aliases
    /// recurse into the target explore's field space. Fails with
    /// `UnknownField` naming the exact segment that did not resolve.
    pub fn resolve(&self, path: &[String]) -> SemanticResult<Arc<FieldDef>> {
        self.resolve_inner(path, &path.join("."))
    }

    fn resolve_inner(&self, path: &[String], full_path: &str) -> SemanticResult<Arc<FieldDef>> {
        let (first, rest) = match path.split_first() {
            Some(split) => split,
            None => {
                return Err(SemanticErrorKind::UnknownField {
                    segment: String::new(),
                    path: full_path.to_string(),
                }
                .into())
            }
        };

        if rest.is_empty() {
            if let Some(field) = self.lookup(first) {
                return Ok(field);
            }
            return Err(SemanticErrorKind::UnknownField {
                segment: first.clone(),
                path: full_path.to_string(),
            }
            .into());
        }

        match self.joins.get(first) {
            Some(target) => target.space.resolve_inner(rest, full_path),
            None => Err(SemanticErrorKind::UnknownField {
                segment: first.clone(),
                path: full_path.to_string(),
            }
            .into()),
        }
    }

    /// Look up a single name in the local namespace, honoring any
    /// restriction view.
    pub fn lookup(&self, name: &str) -> Option<Arc<FieldDef>> {
        if let Some(r) = &self.restriction {
            if !r.admits(name) {
                return None;
            }
        }
        self.entry(name).map(|(_, f)| Arc::clone(f))
    }

    /// Look up a join sub-namespace by alias.
    pub fn join_target(&self, alias: &str) -> Option<&Arc<Explore>> {
        self.joins.get(alias)
    }

    /// Produce a new namespace where `old` is replaced by a renamed view.
    ///
    /// The new field delegates its definition to the original but reports
    /// `new_name`; the original definition is never mutated. Fails with
    /// `UnknownField` if `old` does not exist, `DuplicateName` if
    /// `new_name` already exists.
    pub fn rename(&self, old: &str, new_name: &str) -> SemanticResult<FieldSpace> {
        if self.lookup(new_name).is_some() || self.joins.contains_key(new_name) {
            return Err(SemanticErrorKind::DuplicateName {
                name: new_name.to_string(),
            }
            .into());
        }
        let original = self.lookup(old).ok_or_else(|| {
            SemanticErrorKind::UnknownField {
                segment: old.to_string(),
                path: old.to_string(),
            }
        })?;

        let mut renamed = self.clone();
        for (name, field) in renamed.entries.iter_mut() {
            if name == old {
                *field = Arc::new(original.renamed(new_name));
                *name = new_name.to_string();
                break;
            }
        }
        // The restriction list keeps referring to the old name; rewrite it
        // so views stay consistent across renames.
        if let Some(r) = &mut renamed.restriction {
            for n in r.names.iter_mut() {
                if n == old {
                    *n = new_name.to_string();
                }
            }
        }
        Ok(renamed)
    }

    /// Produce a namespace view that keeps only (accept) or drops (except)
    /// the listed names.
    pub fn restrict(&self, mode: RestrictMode, names: Vec<String>) -> FieldSpace {
        let mut restricted = self.clone();
        restricted.restriction = Some(Restriction { mode, names });
        restricted
    }

    /// Apply the accept/except blocks of a single restriction operation.
    ///
    /// The two modes are mutually exclusive; supplying both fails with
    /// `ConflictingRestriction`.
    pub fn restricted(
        &self,
        accept: Option<Vec<String>>,
        except: Option<Vec<String>>,
    ) -> SemanticResult<FieldSpace> {
        match (accept, except) {
            (Some(_), Some(_)) => Err(SemanticErrorKind::ConflictingRestriction.into()),
            (Some(names), None) => Ok(self.restrict(RestrictMode::Accept, names)),
            (None, Some(names)) => Ok(self.restrict(RestrictMode::Except, names)),
            (None, None) => Ok(self.clone()),
        }
    }

    /// Visible fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Arc<FieldDef>)> {
        self.entries
            .iter()
            .filter(move |(name, _)| match &self.restriction {
                Some(r) => r.admits(name),
                None => true,
            })
            .map(|(name, field)| (name.as_str(), field))
    }

    /// Join aliases in a stable order.
    pub fn join_aliases(&self) -> impl Iterator<Item = &str> {
        self.joins.keys().map(|k| k.as_str())
    }

    fn entry(&self, name: &str) -> Option<&(String, Arc<FieldDef>)> {
        self.entries.iter().find(|(n, _)| n == name)
    }
}

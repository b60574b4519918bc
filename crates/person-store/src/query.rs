//! Query-string matching for the in-memory index
//!
//! A small subset of the Lucene query-string syntax that Elasticsearch
//! accepts, enough for the in-memory index to answer the same queries:
//!
//! - `*` or an empty query matches everything
//! - bare terms are OR-ed, `+term` is required, `-term` is excluded
//! - `field:term` restricts a term to `id`, `firstName`, `lastName` or `telephone`
//! - a trailing `*` turns a term into a prefix match
//!
//! Matching is case-insensitive against whole tokens, where a token is a run
//! of alphanumeric characters.

use person_sync_core::Person;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occur {
    Should,
    Must,
    MustNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    FirstName,
    LastName,
    Telephone,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "id" => Some(Self::Id),
            "firstName" | "first_name" => Some(Self::FirstName),
            "lastName" | "last_name" => Some(Self::LastName),
            "telephone" => Some(Self::Telephone),
            _ => None,
        }
    }

    const ALL: [Field; 4] = [Self::Id, Self::FirstName, Self::LastName, Self::Telephone];

    fn value(&self, person: &Person) -> String {
        match self {
            Self::Id => person.id.clone().unwrap_or_default(),
            Self::FirstName => person.first_name.clone(),
            Self::LastName => person.last_name.clone(),
            Self::Telephone => person.telephone.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Any,
    Exact(String),
    Prefix(String),
}

impl Pattern {
    fn parse(term: &str) -> Self {
        let term = term.to_lowercase();
        if term == "*" {
            Self::Any
        } else if let Some(prefix) = term.strip_suffix('*') {
            Self::Prefix(prefix.to_string())
        } else {
            Self::Exact(term)
        }
    }

    fn matches_token(&self, token: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(t) => token == t,
            Self::Prefix(p) => token.starts_with(p.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
struct Clause {
    occur: Occur,
    field: Option<Field>,
    pattern: Pattern,
}

impl Clause {
    fn parse(raw: &str) -> Option<Self> {
        let (occur, rest) = match raw.as_bytes().first() {
            Some(b'+') => (Occur::Must, &raw[1..]),
            Some(b'-') => (Occur::MustNot, &raw[1..]),
            _ => (Occur::Should, raw),
        };
        if rest.is_empty() {
            return None;
        }

        let (field, term) = match rest.split_once(':') {
            Some((name, term)) if Field::parse(name).is_some() && !term.is_empty() => {
                (Field::parse(name), term)
            }
            _ => (None, rest),
        };

        Some(Self {
            occur,
            field,
            pattern: Pattern::parse(term),
        })
    }

    fn matches(&self, person: &Person) -> bool {
        let fields: &[Field] = match self.field {
            Some(ref f) => std::slice::from_ref(f),
            None => &Field::ALL,
        };
        fields.iter().any(|f| {
            let value = f.value(person).to_lowercase();
            let matched = tokens(&value).any(|t| self.pattern.matches_token(t));
            matched
        })
    }
}

fn tokens(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|t| !t.is_empty())
}

/// Parsed query string
#[derive(Debug, Clone)]
pub struct QueryMatcher {
    clauses: Vec<Clause>,
}

impl QueryMatcher {
    pub fn parse(query: &str) -> Self {
        let clauses = query.split_whitespace().filter_map(Clause::parse).collect();
        Self { clauses }
    }

    /// Whether the query matches every document
    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty()
            || self
                .clauses
                .iter()
                .all(|c| c.occur != Occur::MustNot && c.field.is_none() && c.pattern == Pattern::Any)
    }

    pub fn matches(&self, person: &Person) -> bool {
        if self.is_match_all() {
            return true;
        }

        let mut has_must = false;
        let mut any_should = false;
        let mut has_should = false;

        for clause in &self.clauses {
            let hit = clause.matches(person);
            match clause.occur {
                Occur::MustNot if hit => return false,
                Occur::MustNot => {}
                Occur::Must if !hit => return false,
                Occur::Must => has_must = true,
                Occur::Should => {
                    has_should = true;
                    any_should |= hit;
                }
            }
        }

        // Optional clauses only decide the match when nothing is required
        has_must || !has_should || any_should
    }
}

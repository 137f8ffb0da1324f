//! Stack descriptions and assembly from them.
//!
//! # Grammar
//! ```text
//! stack := affix*
//! affix := "(" name ("," args)? ")"
//! name  := [A-Za-z0-9_]+
//! args  := any text with balanced parentheses
//! ```
//! Whitespace between affixes is ignored. This is the same form an
//! advertisement takes, so a peer's advertisement can be rebuilt locally.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::affix::error::{AffixError, AffixResult};
use crate::affix::middleware::Affix;
use crate::affix::node::{AffixNode, Link};
use crate::affix::stack::AffixStack;
use crate::affixes::{NoopAffix, StatsAffix, TraceAffix};
use crate::net::NetworkApi;

/// Builds an affix from its optional argument string.
pub type AffixBuilder = fn(Option<&str>) -> AffixResult<Box<dyn Affix>>;

/// One parsed `(name,args)` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffixSpec {
    pub name: String,
    pub args: Option<String>,
}

impl fmt::Display for AffixSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.args {
            Some(args) => write!(f, "({},{})", self.name, args),
            None => write!(f, "({})", self.name),
        }
    }
}

fn malformed(position: usize, reason: impl Into<String>) -> AffixError {
    AffixError::MalformedStack {
        position,
        reason: reason.into(),
    }
}

/// Parse a stack description into its elements, top first.
pub fn parse_stack(description: &str) -> AffixResult<Vec<AffixSpec>> {
    let bytes = description.as_bytes();
    let mut specs = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos].is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        if bytes[pos] != b'(' {
            return Err(malformed(pos, "expected '('"));
        }

        let start = pos + 1;
        let mut depth = 1;
        let mut end = start;
        while end < bytes.len() {
            match bytes[end] {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            end += 1;
        }
        if depth != 0 {
            return Err(malformed(pos, "unterminated affix"));
        }

        let body = &description[start..end];
        let (name, args) = match body.split_once(',') {
            Some((name, args)) => (name.trim(), Some(args.to_string())),
            None => (body.trim(), None),
        };
        if name.is_empty() {
            return Err(malformed(start, "empty affix name"));
        }
        if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(malformed(start, format!("invalid affix name '{name}'")));
        }

        specs.push(AffixSpec {
            name: name.to_string(),
            args,
        });
        pos = end + 1;
    }

    Ok(specs)
}

/// Known affixes by name.
#[derive(Debug, Clone, Default)]
pub struct AffixRegistry {
    builders: HashMap<String, AffixBuilder>,
}

impl AffixRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every affix bundled with this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(NoopAffix::NAME, NoopAffix::build);
        registry.register(StatsAffix::NAME, StatsAffix::build);
        registry.register(TraceAffix::NAME, TraceAffix::build);
        registry
    }

    /// Register `builder` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, builder: AffixBuilder) {
        self.builders.insert(name.into(), builder);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build a single affix.
    pub fn build_affix(&self, spec: &AffixSpec) -> AffixResult<Box<dyn Affix>> {
        let builder = self
            .builders
            .get(&spec.name)
            .ok_or_else(|| AffixError::UnknownAffix(spec.name.clone()))?;
        builder(spec.args.as_deref())
    }

    /// Check that every element of `description` parses and is known.
    pub fn check(&self, description: &str) -> AffixResult<()> {
        for spec in parse_stack(description)? {
            if !self.contains(&spec.name) {
                return Err(AffixError::UnknownAffix(spec.name));
            }
        }
        Ok(())
    }

    /// Assemble the stack described by `description` over `network`.
    ///
    /// Affixes are built bottom-up so each one is constructed around the
    /// layer it will sit on.
    pub fn build(&self, description: &str, network: Arc<dyn NetworkApi>) -> AffixResult<AffixStack> {
        let specs = parse_stack(description)?;
        let mut link = Link::Network(network);
        for spec in specs.iter().rev() {
            let affix = self.build_affix(spec)?;
            link = Link::Affix(AffixNode::from_boxed(affix, link));
        }

        let stack = AffixStack::from_link(link);
        tracing::debug!(stack = %stack, depth = stack.depth(), "Affix stack assembled");
        Ok(stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::NullNetwork;

    #[test]
    fn parses_names_and_args() {
        let specs = parse_stack("(NoopAffix) (TraceAffix,edge)(StatsAffix,a(b)c)").unwrap();
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0], AffixSpec { name: "NoopAffix".into(), args: None });
        assert_eq!(specs[1].args.as_deref(), Some("edge"));
        assert_eq!(specs[2].args.as_deref(), Some("a(b)c"));
        assert_eq!(specs[2].to_string(), "(StatsAffix,a(b)c)");
    }

    #[test]
    fn empty_description_is_empty_stack() {
        assert!(parse_stack("").unwrap().is_empty());
        assert!(parse_stack("   ").unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(
            parse_stack("NoopAffix"),
            Err(AffixError::MalformedStack { position: 0, .. })
        ));
        assert!(matches!(
            parse_stack("(NoopAffix"),
            Err(AffixError::MalformedStack { .. })
        ));
        assert!(matches!(parse_stack("()"), Err(AffixError::MalformedStack { .. })));
        assert!(matches!(
            parse_stack("(Bad Name)"),
            Err(AffixError::MalformedStack { .. })
        ));
    }

    #[test]
    fn builds_in_order() {
        let registry = AffixRegistry::with_builtin();
        let stack = registry
            .build("(NoopAffix)(StatsAffix)", Arc::new(NullNetwork))
            .unwrap();

        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.to_string(), "(NoopAffix)(StatsAffix)NullNetwork");
        assert_eq!(stack.advertisement(), "(NoopAffix)(StatsAffix)");
    }

    #[test]
    fn advertisement_rebuilds_the_same_stack() {
        let registry = AffixRegistry::with_builtin();
        let original = registry
            .build("(NoopAffix)(TraceAffix,edge)(StatsAffix)", Arc::new(NullNetwork))
            .unwrap();

        // Hidden layers are not advertised, so the peer sees only the rest.
        let advertised = original.advertisement();
        assert_eq!(advertised, "(NoopAffix)(StatsAffix)");

        let rebuilt = registry.build(&advertised, Arc::new(NullNetwork)).unwrap();
        assert_eq!(rebuilt.advertisement(), advertised);
        assert_eq!(rebuilt.depth(), 2);
    }

    #[test]
    fn unknown_affix_is_reported() {
        let registry = AffixRegistry::with_builtin();
        let err = registry
            .build("(NoopAffix)(NatPunchAffix)", Arc::new(NullNetwork))
            .unwrap_err();
        assert!(matches!(err, AffixError::UnknownAffix(ref name) if name == "NatPunchAffix"));
        assert!(registry.check("(NatPunchAffix)").is_err());
        assert!(registry.check("(NoopAffix)").is_ok());
    }

    #[test]
    fn builtin_names() {
        let registry = AffixRegistry::with_builtin();
        assert_eq!(registry.names(), vec!["NoopAffix", "StatsAffix", "TraceAffix"]);
    }
}

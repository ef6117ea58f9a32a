//! Filtering discovered protocols against user criteria.

use regex::Regex;

use crate::protocol::Protocol;

/// Which protocols to run. Default selects everything; selecting zero is
/// valid and reported distinctly from "all passed".
#[derive(Debug, Clone, Default)]
pub enum Selection {
    #[default]
    All,
    /// Keep protocols whose name starts with the prefix.
    Prefix(String),
    /// Keep protocols whose name matches the pattern.
    Pattern(Regex),
    /// Keep exactly the named protocols.
    Explicit(Vec<String>),
}

impl Selection {
    pub fn matches(&self, protocol: &Protocol) -> bool {
        match self {
            Selection::All => true,
            Selection::Prefix(prefix) => protocol.name.starts_with(prefix.as_str()),
            Selection::Pattern(pattern) => pattern.is_match(&protocol.name),
            Selection::Explicit(names) => names.iter().any(|name| name == &protocol.name),
        }
    }
}

/// Filter `protocols`, preserving discovery order.
pub fn select(protocols: Vec<Protocol>, selection: &Selection) -> Vec<Protocol> {
    protocols
        .into_iter()
        .filter(|protocol| selection.matches(protocol))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn protocol(name: &str) -> Protocol {
        let root = PathBuf::from("/suite").join(name);
        Protocol {
            script: root.join("protocol.sh"),
            log_dir: root.join("LOGS"),
            success_code_path: root.join("LOGS/SUCCESS_CODE"),
            name: name.to_string(),
            root,
        }
    }

    fn names(protocols: &[Protocol]) -> Vec<&str> {
        protocols.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn all_keeps_everything_in_order() {
        let input = vec![protocol("b"), protocol("a")];
        let selected = select(input, &Selection::All);
        assert_eq!(names(&selected), vec!["b", "a"]);
    }

    #[test]
    fn prefix_filters_by_name() {
        let input = vec![
            protocol("lipids/dppc"),
            protocol("lipids/pope"),
            protocol("proteins/ubq"),
        ];
        let selected = select(input, &Selection::Prefix("lipids/".to_string()));
        assert_eq!(names(&selected), vec!["lipids/dppc", "lipids/pope"]);
    }

    #[test]
    fn pattern_filters_by_regex() {
        let input = vec![protocol("dppc-small"), protocol("dppc-large"), protocol("ubq")];
        let pattern = Regex::new("^dppc-").expect("regex");
        let selected = select(input, &Selection::Pattern(pattern));
        assert_eq!(names(&selected), vec!["dppc-small", "dppc-large"]);
    }

    #[test]
    fn explicit_keeps_exact_names_and_may_select_zero() {
        let input = vec![protocol("a"), protocol("b")];
        let selected = select(input.clone(), &Selection::Explicit(vec!["b".to_string()]));
        assert_eq!(names(&selected), vec!["b"]);

        let none = select(input, &Selection::Explicit(vec!["missing".to_string()]));
        assert!(none.is_empty());
    }
}

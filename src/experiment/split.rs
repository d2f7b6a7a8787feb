//! Split labels: hyphen-joined sub-condition tags such as
//! `deformation_1-illumination-viewpoint`.

use std::fmt;
use std::str::FromStr;

/// Separator between split components.
const SEPARATOR: char = '-';

/// Malformed split label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    #[error("split label is empty")]
    Empty,

    #[error("split label {0:?} has an empty component")]
    EmptyComponent(String),
}

/// A parsed split label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Split {
    components: Vec<String>,
}

impl Split {
    /// The sub-condition tags in label order.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Components sorted, so equivalent labels group together.
    pub fn normalized(&self) -> Split {
        let mut components = self.components.clone();
        components.sort();
        Split { components }
    }

    pub fn is_normalized(&self) -> bool {
        self.components.windows(2).all(|w| w[0] <= w[1])
    }
}

impl FromStr for Split {
    type Err = SplitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(SplitError::Empty);
        }

        let components: Vec<String> = trimmed
            .split(SEPARATOR)
            .map(|c| c.trim().to_string())
            .collect();

        if components.iter().any(|c| c.is_empty()) {
            return Err(SplitError::EmptyComponent(s.to_string()));
        }

        Ok(Split { components })
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for component in &self.components {
            if !first {
                write!(f, "{SEPARATOR}")?;
            }
            f.write_str(component)?;
            first = false;
        }
        Ok(())
    }
}

/// Parse and normalize a label in one step.
pub fn normalize_label(label: &str) -> Result<String, SplitError> {
    Ok(label.parse::<Split>()?.normalized().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_components_in_order() {
        let split: Split = "viewpoint-deformation_1-illumination".parse().unwrap();
        assert_eq!(
            split.components(),
            &["viewpoint", "deformation_1", "illumination"]
        );
        assert!(!split.is_normalized());
        assert_eq!(split.to_string(), "viewpoint-deformation_1-illumination");
    }

    #[test]
    fn normalization_sorts() {
        assert_eq!(
            normalize_label("viewpoint-deformation_1-illumination").unwrap(),
            "deformation_1-illumination-viewpoint"
        );
    }

    #[test]
    fn normalizing_a_sorted_label_is_a_no_op() {
        let label = "deformation_2-illumination-scale-viewpoint";
        let once = normalize_label(label).unwrap();
        assert_eq!(once, label);
        assert_eq!(normalize_label(&once).unwrap(), once);
        assert!(label.parse::<Split>().unwrap().is_normalized());
    }

    #[test]
    fn single_component() {
        let split: Split = "scale".parse().unwrap();
        assert!(split.is_normalized());
        assert_eq!(split.normalized().to_string(), "scale");
    }

    #[test]
    fn rejects_malformed_labels() {
        assert_eq!("".parse::<Split>(), Err(SplitError::Empty));
        assert_eq!("   ".parse::<Split>(), Err(SplitError::Empty));
        assert!(matches!(
            "deformation_1--viewpoint".parse::<Split>(),
            Err(SplitError::EmptyComponent(_))
        ));
        assert!(matches!(
            "-viewpoint".parse::<Split>(),
            Err(SplitError::EmptyComponent(_))
        ));
    }
}

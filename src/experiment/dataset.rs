//! Dataset groups and their on-disk directory names.

use std::fmt;
use std::str::FromStr;

/// A benchmark dataset group an experiment is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    SingleObject,
    MultipleObject,
    Scale,
}

impl Dataset {
    pub const ALL: [Dataset; 3] = [Self::SingleObject, Self::MultipleObject, Self::Scale];

    /// The label stored on experiments.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SingleObject => "Single Object",
            Self::MultipleObject => "Multiple Object",
            Self::Scale => "Scale",
        }
    }

    /// Directory under the dataset root holding this group's test data.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::SingleObject => "test_single_obj",
            Self::MultipleObject => "test_multiple_obj",
            Self::Scale => "test_scale",
        }
    }

    /// Look up a stored label. Matching is exact.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.label() == label)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A dataset label with no directory mapping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dataset {0:?}")]
pub struct UnknownDataset(pub String);

impl FromStr for Dataset {
    type Err = UnknownDataset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| UnknownDataset(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_table() {
        assert_eq!(Dataset::from_label("Single Object"), Some(Dataset::SingleObject));
        assert_eq!(Dataset::from_label("Multiple Object"), Some(Dataset::MultipleObject));
        assert_eq!(Dataset::from_label("Scale"), Some(Dataset::Scale));
        assert_eq!(Dataset::SingleObject.dir_name(), "test_single_obj");
        assert_eq!(Dataset::MultipleObject.dir_name(), "test_multiple_obj");
        assert_eq!(Dataset::Scale.dir_name(), "test_scale");
    }

    #[test]
    fn unmapped_labels_rejected() {
        // The submission form once offered "Multi Object"; it has no directory.
        assert!(Dataset::from_label("Multi Object").is_none());
        assert!(Dataset::from_label("scale").is_none());
        let err = "".parse::<Dataset>().unwrap_err();
        assert_eq!(err, UnknownDataset(String::new()));
    }

    #[test]
    fn labels_round_trip() {
        for dataset in Dataset::ALL {
            assert_eq!(dataset.label().parse::<Dataset>(), Ok(dataset));
        }
    }
}

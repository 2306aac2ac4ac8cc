use semaphore_policy_k8s_api::ObjectMeta;
use std::{fmt, str::FromStr};

/// Names the pod metadata entry whose value selects a pod's network set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupingKey {
    name: String,
    source: Source,
}

/// Where a [`GroupingKey`] is read from.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Source {
    #[default]
    Annotation,
    Label,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("invalid grouping key source '{0}': expected 'annotation' or 'label'")]
pub struct InvalidSource(String);

// === impl GroupingKey ===

impl GroupingKey {
    pub fn new(name: impl Into<String>, source: Source) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    /// Returns the network set name of the pod, if it has one.
    pub fn group_of<'m>(&self, meta: &'m ObjectMeta) -> Option<&'m str> {
        let values = match self.source {
            Source::Annotation => meta.annotations.as_ref(),
            Source::Label => meta.labels.as_ref(),
        }?;
        values
            .get(&self.name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

impl fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.source, self.name)
    }
}

// === impl Source ===

impl FromStr for Source {
    type Err = InvalidSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "annotation" => Ok(Self::Annotation),
            "label" => Ok(Self::Label),
            s => Err(InvalidSource(s.to_string())),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Annotation => "annotation".fmt(f),
            Self::Label => "label".fmt(f),
        }
    }
}

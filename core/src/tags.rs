//! Cache tags linking query results to the mutations that invalidate them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKind {
    Courses,
    Users,
    UserCourseProgress,
}

impl TagKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TagKind::Courses => "Courses",
            TagKind::Users => "Users",
            TagKind::UserCourseProgress => "UserCourseProgress",
        }
    }
}

/// A tag, optionally scoped to a single entity id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    pub kind: TagKind,
    pub id: Option<String>,
}

impl Tag {
    /// Tag covering every entity of `kind`.
    pub fn all(kind: TagKind) -> Self {
        Self { kind, id: None }
    }

    /// Tag scoped to one entity.
    pub fn with_id(kind: TagKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: Some(id.into()),
        }
    }

    /// Whether invalidating `self` invalidates an entry that provides `provided`.
    ///
    /// An unscoped tag matches every provided tag of its kind. A scoped tag
    /// only matches a provided tag with the same id.
    pub fn matches(&self, provided: &Tag) -> bool {
        if self.kind != provided.kind {
            return false;
        }
        match &self.id {
            None => true,
            Some(id) => provided.id.as_deref() == Some(id.as_str()),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}:{id}", self.kind.as_str()),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

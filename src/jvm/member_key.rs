use derive_more::Display;

/// Identifies a field or a method by its owner, name and descriptor.
///
/// Two keys are equal if and only if all three components are equal. Keys are used both as the
/// lookup side and as the target side of the replacement maps.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Display)]
#[display("{owner}.{name}{descriptor}")]
pub struct ClassMemberKey {
    owner: String,
    name: String,
    descriptor: String,
}

impl ClassMemberKey {
    /// Creates a key from the internal name of the owner, the member name and its descriptor.
    pub fn create(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// The internal binary name of the type declaring the member.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The member name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field or method descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }
}

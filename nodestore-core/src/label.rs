//! Tag projection onto the single `label` column.
//!
//! The store keeps one text column per node. Which tag feeds it is decided
//! here and nowhere else.

/// Selects the tag whose value becomes a node's label.
///
/// The default projects nothing, so every label is `None`.
///
/// # Examples
///
/// ```
/// use nodestore_core::LabelProjection;
///
/// let projection = LabelProjection::from_key("name");
/// let tags = [("amenity", "cafe"), ("name", "Kaffeehaus")];
/// assert_eq!(projection.project(tags), Some("Kaffeehaus".to_owned()));
/// assert_eq!(LabelProjection::none().project(tags), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelProjection {
    key: Option<String>,
}

impl LabelProjection {
    /// Project no tag.
    #[must_use]
    pub const fn none() -> Self {
        Self { key: None }
    }

    /// Project the value of `key`.
    #[must_use]
    pub fn from_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
        }
    }

    /// The projected key, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Extract the label from a borrowed tag iterator.
    ///
    /// The first matching key wins. The iterator is not consumed when no key
    /// is projected.
    pub fn project<'a, T>(&self, tags: T) -> Option<String>
    where
        T: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let wanted = self.key.as_deref()?;
        tags.into_iter()
            .find(|(key, _)| *key == wanted)
            .map(|(_, value)| value.to_owned())
    }
}

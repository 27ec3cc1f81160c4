//! Resource descriptor - identity, location and media type of an import input

/// The input being imported. Fields are private so a resource cannot change
/// once a task owns it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resource {
    id: String,
    location: String,
    media_type: String,
}

impl Resource {
    pub fn new(id: impl Into<String>, location: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
            media_type: media_type.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Media type without parameters, lower-cased (`Text/CSV; charset=utf-8` -> `text/csv`)
    pub fn essence(&self) -> String {
        self.media_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_essence_strips_parameters() {
        let resource = Resource::new("1", "data.csv", "Text/CSV; charset=utf-8");
        assert_eq!(resource.essence(), "text/csv");
        assert_eq!(resource.id(), "1");
        assert_eq!(resource.location(), "data.csv");
    }
}

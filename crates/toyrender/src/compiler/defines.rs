use std::fmt::Write;

/// Ordered set of preprocessor definitions.
///
/// Definitions serialize in the order they were first inserted; setting an
/// existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreprocessorDefines {
    definitions: Vec<(String, Option<String>)>,
}

impl PreprocessorDefines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines `name` to `value`, overwriting a previous definition.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.set(name.into(), Some(value.into()))
    }

    /// Defines `name` without a value.
    pub fn define_flag(&mut self, name: impl Into<String>) -> &mut Self {
        self.set(name.into(), None)
    }

    pub fn set(&mut self, name: String, value: Option<String>) -> &mut Self {
        match self.definitions.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.definitions.push((name, value)),
        }
        self
    }

    pub fn erase(&mut self, name: &str) -> bool {
        let before = self.definitions.len();
        self.definitions.retain(|(existing, _)| existing != name);
        self.definitions.len() != before
    }

    /// `None` when undefined, `Some(None)` for a flag.
    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.definitions
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_deref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.definitions
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    /// Appends every definition of `other`, overwriting shared names.
    pub fn extend_from(&mut self, other: &PreprocessorDefines) {
        for (name, value) in &other.definitions {
            self.set(name.clone(), value.clone());
        }
    }

    pub fn to_source(&self) -> String {
        let mut source = String::new();
        for (name, value) in &self.definitions {
            let _ = match value {
                Some(value) => writeln!(source, "#define {name} {value}"),
                None => writeln!(source, "#define {name}"),
            };
        }
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_keeps_first_position() {
        let mut defines = PreprocessorDefines::new();
        defines.define("A", "1").define("B", "2").define("A", "3");
        assert_eq!(defines.len(), 2);
        assert_eq!(defines.get("A"), Some(Some("3")));
        assert_eq!(defines.to_source(), "#define A 3\n#define B 2\n");
    }

    #[test]
    fn flags_serialize_without_value() {
        let mut defines = PreprocessorDefines::new();
        defines.define_flag("HAS_FEEDBACK");
        assert_eq!(defines.to_source(), "#define HAS_FEEDBACK\n");
        assert!(defines.erase("HAS_FEEDBACK"));
        assert!(defines.is_empty());
    }
}

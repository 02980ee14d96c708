//! Declaration registry.
//!
//! Holds every declared type in registration order. The registry is plain
//! data; the mapper context swaps whole registries on redeclaration so that
//! in-flight resolutions keep reading a consistent snapshot.

use std::path::Path;

use indexmap::IndexMap;

use common::{MapperError, MapperResult};

use super::declaration::{TypeDeclaration, TypeKey};

/// Ordered collection of type declarations keyed by type.
#[derive(Debug, Clone, Default)]
pub struct DeclarationRegistry {
    declarations: IndexMap<TypeKey, TypeDeclaration>,
}

impl DeclarationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry, rejecting duplicate type keys
    pub fn from_declarations(
        declarations: impl IntoIterator<Item = TypeDeclaration>,
    ) -> MapperResult<Self> {
        let mut registry = Self::new();
        for declaration in declarations {
            registry.register(declaration)?;
        }
        Ok(registry)
    }

    /// Parse a JSON array of declarations
    pub fn from_json(json: &str) -> MapperResult<Self> {
        let declarations: Vec<TypeDeclaration> = serde_json::from_str(json)
            .map_err(|e| MapperError::configuration("<document>", e.to_string()))?;
        Self::from_declarations(declarations)
    }

    /// Load a JSON file holding an array of declarations
    pub fn from_json_file(path: impl AsRef<Path>) -> MapperResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            MapperError::configuration(
                "<document>",
                format!("Cannot read {}: {}", path.display(), e),
            )
        })?;
        Self::from_json(&json)
    }

    /// Add a declaration; a type may only be declared once
    pub fn register(&mut self, declaration: TypeDeclaration) -> MapperResult<()> {
        if self.declarations.contains_key(&declaration.type_key) {
            return Err(MapperError::configuration(
                declaration.type_key.as_str(),
                "type is declared more than once",
            ));
        }
        self.upsert(declaration);
        Ok(())
    }

    /// Add or replace a declaration, keeping its original position
    pub fn upsert(&mut self, declaration: TypeDeclaration) {
        self.declarations
            .insert(declaration.type_key.clone(), declaration);
    }

    pub fn get(&self, key: &TypeKey) -> Option<&TypeDeclaration> {
        self.declarations.get(key)
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.declarations.contains_key(key)
    }

    /// Declarations in registration order
    pub fn iter(&self) -> impl Iterator<Item = &TypeDeclaration> {
        self.declarations.values()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Whether `key` is `ancestor` or declares it somewhere up its base chain.
    ///
    /// Broken chains (unknown bases, cycles) simply answer `false`; the
    /// resolver pipeline reports them properly.
    pub fn descends_from(&self, key: &TypeKey, ancestor: &TypeKey) -> bool {
        let mut current = Some(key);
        let mut hops = 0;
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            if hops > self.declarations.len() {
                return false;
            }
            hops += 1;
            current = self.declarations.get(k).and_then(|d| d.base_type.as_ref());
        }
        false
    }

    /// Every declared type that descends from `key`, excluding `key` itself
    pub fn descendants(&self, key: &TypeKey) -> Vec<TypeKey> {
        self.declarations
            .keys()
            .filter(|candidate| *candidate != key && self.descends_from(candidate, key))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DeclarationRegistry {
        DeclarationRegistry::from_declarations(vec![
            TypeDeclaration::new("Page"),
            TypeDeclaration::new("Article").extends("Page"),
            TypeDeclaration::new("NewsArticle").extends("Article"),
            TypeDeclaration::new("Person"),
        ])
        .unwrap()
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = registry();
        let err = registry.register(TypeDeclaration::new("Page")).unwrap_err();
        assert!(matches!(err, MapperError::Configuration { .. }));
    }

    #[test]
    fn test_descends_from_walks_chain() {
        let registry = registry();
        let news = TypeKey::new("NewsArticle");
        assert!(registry.descends_from(&news, &TypeKey::new("Page")));
        assert!(registry.descends_from(&news, &news));
        assert!(!registry.descends_from(&news, &TypeKey::new("Person")));
    }

    #[test]
    fn test_descends_from_survives_cycles() {
        let registry = DeclarationRegistry::from_declarations(vec![
            TypeDeclaration::new("A").extends("B"),
            TypeDeclaration::new("B").extends("A"),
        ])
        .unwrap();
        assert!(!registry.descends_from(&TypeKey::new("A"), &TypeKey::new("C")));
    }

    #[test]
    fn test_descendants_in_registration_order() {
        let registry = registry();
        assert_eq!(
            registry.descendants(&TypeKey::new("Page")),
            vec![TypeKey::new("Article"), TypeKey::new("NewsArticle")]
        );
    }

    #[test]
    fn test_iter_follows_registration_order() {
        let mut registry = registry();
        registry.upsert(TypeDeclaration::new("Folder"));
        registry.upsert(TypeDeclaration::new("Article").template_id("y"));

        let keys: Vec<&str> = registry.iter().map(|d| d.type_key.as_str()).collect();
        assert_eq!(keys, vec!["Page", "Article", "NewsArticle", "Person", "Folder"]);
        assert_eq!(registry.len(), 5);
        assert_eq!(
            registry.get(&TypeKey::new("Article")).unwrap().template_id.as_deref(),
            Some("y")
        );
    }

    #[test]
    fn test_upsert_keeps_position() {
        let mut registry = registry();
        registry.upsert(TypeDeclaration::new("Page").template_id("x"));
        let first = registry.iter().next().unwrap();
        assert_eq!(first.type_key, TypeKey::new("Page"));
        assert_eq!(first.template_id.as_deref(), Some("x"));
    }
}

//! Registry of per-category sliding windows plus the global ceiling.
//!
//! The set of categories is fixed at construction; only the windows inside mutate. Unknown
//! categories resolve to [`GENERAL`], so the registry refuses to build without it.

use super::window::SlidingWindowLimit;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub const POSTS: &str = "posts";
pub const FOLLOWS: &str = "follows";
pub const LIKES: &str = "likes";
pub const REPOSTS: &str = "reposts";
pub const MEDIA: &str = "media";
pub const GENERAL: &str = "general";
/// Reserved name reported when the global ceiling denies a call.
pub const GLOBAL: &str = "global";

const MINUTE: Duration = Duration::from_secs(60);

/// Capacity and window for a single limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitSpec {
    pub requests: u32,
    pub window: Duration,
}

impl LimitSpec {
    pub fn new(requests: u32, window: Duration) -> Self {
        Self { requests, window }
    }

    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests, MINUTE)
    }
}

/// Errors produced while building a registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Every registry needs the fallback category.
    #[error("registry must define the '{}' category", GENERAL)]
    MissingGeneral,
    /// `global` is reserved for the ceiling.
    #[error("'{}' is reserved for the global limit", GLOBAL)]
    ReservedName,
    #[error("category '{category}' must allow at least one request")]
    ZeroCapacity { category: String },
    #[error("category '{category}' must have a non-zero window")]
    ZeroWindow { category: String },
}

/// Fixed mapping from category name to its window, plus the global window.
#[derive(Debug)]
pub struct CategoryRegistry {
    categories: BTreeMap<String, Mutex<SlidingWindowLimit>>,
    global: Mutex<SlidingWindowLimit>,
}

impl CategoryRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Resolve a category to its canonical name and window, falling back to [`GENERAL`].
    pub fn resolve(&self, category: &str) -> (&str, &Mutex<SlidingWindowLimit>) {
        match self.categories.get_key_value(category) {
            Some((name, limit)) => (name.as_str(), limit),
            None => {
                let (name, limit) = self
                    .categories
                    .get_key_value(GENERAL)
                    .expect("builder guarantees the general category");
                (name.as_str(), limit)
            }
        }
    }

    /// Whether `category` has its own window (as opposed to falling back).
    pub fn is_known(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    pub fn global(&self) -> &Mutex<SlidingWindowLimit> {
        &self.global
    }

    /// Known category names in sorted order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub(crate) fn lock(limit: &Mutex<SlidingWindowLimit>) -> MutexGuard<'_, SlidingWindowLimit> {
        limit.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CategoryRegistry {
    /// Conservative defaults for the Bluesky API.
    fn default() -> Self {
        Self {
            categories: [
                (POSTS, 30),
                (FOLLOWS, 60),
                (LIKES, 100),
                (REPOSTS, 60),
                (GENERAL, 120),
                (MEDIA, 20),
            ]
            .into_iter()
            .map(|(name, rpm)| (name.to_string(), Mutex::new(SlidingWindowLimit::new(rpm, MINUTE))))
            .collect(),
            global: Mutex::new(SlidingWindowLimit::new(300, MINUTE)),
        }
    }
}

/// Builder for [`CategoryRegistry`].
#[derive(Debug, Default, Clone)]
pub struct RegistryBuilder {
    categories: BTreeMap<String, LimitSpec>,
    global: Option<LimitSpec>,
}

impl RegistryBuilder {
    /// Add or replace a category limit.
    pub fn category(mut self, name: impl Into<String>, spec: LimitSpec) -> Self {
        self.categories.insert(name.into(), spec);
        self
    }

    /// Set the global ceiling. When omitted, the ceiling is the sum of all category capacities
    /// over the longest category window.
    pub fn global(mut self, spec: LimitSpec) -> Self {
        self.global = Some(spec);
        self
    }

    pub fn build(self) -> Result<CategoryRegistry, RegistryError> {
        if !self.categories.contains_key(GENERAL) {
            return Err(RegistryError::MissingGeneral);
        }
        if self.categories.contains_key(GLOBAL) {
            return Err(RegistryError::ReservedName);
        }
        for (name, spec) in &self.categories {
            validate(name, spec)?;
        }
        let global = match self.global {
            Some(spec) => spec,
            None => LimitSpec {
                requests: self.categories.values().map(|s| s.requests).fold(0u32, u32::saturating_add),
                window: self.categories.values().map(|s| s.window).max().unwrap_or(MINUTE),
            },
        };
        validate(GLOBAL, &global)?;

        Ok(CategoryRegistry {
            categories: self
                .categories
                .into_iter()
                .map(|(name, spec)| (name, Mutex::new(SlidingWindowLimit::new(spec.requests, spec.window))))
                .collect(),
            global: Mutex::new(SlidingWindowLimit::new(global.requests, global.window)),
        })
    }
}

fn validate(name: &str, spec: &LimitSpec) -> Result<(), RegistryError> {
    if spec.requests == 0 {
        return Err(RegistryError::ZeroCapacity { category: name.to_string() });
    }
    if spec.window.is_zero() {
        return Err(RegistryError::ZeroWindow { category: name.to_string() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_known_categories() {
        let registry = CategoryRegistry::default();
        let names: Vec<&str> = registry.categories().collect();
        assert_eq!(names, vec![FOLLOWS, GENERAL, LIKES, MEDIA, POSTS, REPOSTS]);
        assert_eq!(CategoryRegistry::lock(registry.global()).capacity(), 300);
        let (_, posts) = registry.resolve(POSTS);
        assert_eq!(CategoryRegistry::lock(posts).capacity(), 30);
    }

    #[test]
    fn unknown_category_falls_back_to_general() {
        let registry = CategoryRegistry::default();
        let (name, limit) = registry.resolve("bookmarks");
        assert_eq!(name, GENERAL);
        assert_eq!(CategoryRegistry::lock(limit).capacity(), 120);
        assert!(!registry.is_known("bookmarks"));
    }

    #[test]
    fn builder_requires_general() {
        let err = CategoryRegistry::builder().category(POSTS, LimitSpec::per_minute(5)).build();
        let err = err.unwrap_err();
        assert_eq!(err, RegistryError::MissingGeneral);
        assert_eq!(err.to_string(), "registry must define the 'general' category");
    }

    #[test]
    fn builder_rejects_reserved_and_empty_limits() {
        let reserved = CategoryRegistry::builder()
            .category(GENERAL, LimitSpec::per_minute(1))
            .category(GLOBAL, LimitSpec::per_minute(1))
            .build();
        assert_eq!(reserved.unwrap_err(), RegistryError::ReservedName);

        let zero = CategoryRegistry::builder().category(GENERAL, LimitSpec::per_minute(0)).build();
        let zero = zero.unwrap_err();
        assert!(matches!(zero, RegistryError::ZeroCapacity { .. }));
        assert_eq!(zero.to_string(), "category 'general' must allow at least one request");
        assert_eq!(RegistryError::ReservedName.to_string(), "'global' is reserved for the global limit");

        let no_window = CategoryRegistry::builder()
            .category(GENERAL, LimitSpec::new(1, Duration::ZERO))
            .build();
        assert!(matches!(no_window, Err(RegistryError::ZeroWindow { .. })));
    }

    #[test]
    fn global_defaults_to_sum_of_categories() {
        let registry = CategoryRegistry::builder()
            .category(GENERAL, LimitSpec::per_minute(10))
            .category(POSTS, LimitSpec::new(2, Duration::from_secs(120)))
            .build()
            .unwrap();
        let global = CategoryRegistry::lock(registry.global());
        assert_eq!(global.capacity(), 12);
        assert_eq!(global.window(), Duration::from_secs(120));
    }
}

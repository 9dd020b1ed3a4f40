//! Name-indexed set of effect instances

use super::{create, Effect, EffectInfo, EffectKind};

/// One instance of every catalog effect, created at startup
pub struct EffectRegistry {
    effects: Vec<Box<dyn Effect>>,
}

impl EffectRegistry {
    /// Instantiate the whole catalog; each effect gets its own seed
    pub fn new(seed: u64) -> Self {
        let effects = EffectKind::ALL
            .iter()
            .map(|kind| create(*kind, seed.wrapping_add(kind.index() as u64)))
            .collect();
        Self { effects }
    }

    pub fn get_mut(&mut self, kind: EffectKind) -> &mut dyn Effect {
        self.effects[kind.index()].as_mut()
    }

    /// Swap in a different implementation for its catalog slot
    pub fn insert(&mut self, effect: Box<dyn Effect>) {
        let index = effect.kind().index();
        self.effects[index] = effect;
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Catalog metadata in catalog order
    pub fn catalog() -> Vec<EffectInfo> {
        EffectKind::ALL.iter().map(|k| k.info()).collect()
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_holds_every_effect() {
        let mut registry = EffectRegistry::new(42);
        assert_eq!(registry.len(), EffectKind::ALL.len());
        for kind in EffectKind::ALL {
            assert_eq!(registry.get_mut(kind).kind(), kind);
        }
    }

    #[test]
    fn test_catalog_metadata() {
        let catalog = EffectRegistry::catalog();
        assert_eq!(catalog.len(), 17);
        assert_eq!(catalog[5].name, "fire");
        assert!(!catalog[5].description.is_empty());
    }
}

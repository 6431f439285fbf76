use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Interned string id for metric names, tag keys and tag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl From<u32> for KeyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<KeyId> for u32 {
    fn from(v: KeyId) -> Self {
        v.0
    }
}

#[derive(Default, Debug)]
struct InternerState {
    map: HashMap<Arc<str>, KeyId>,
    vec: Vec<Arc<str>>,
}

#[derive(Default, Debug)]
pub(crate) struct Interner {
    state: RwLock<InternerState>,
}

impl Interner {
    pub(crate) fn get_or_intern(&self, s: &str) -> KeyId {
        if let Some(&id) = self.state.read().map.get(s) {
            return id;
        }

        let mut state = self.state.write();

        // Another writer may have interned it between the two locks.
        if let Some(&id) = state.map.get(s) {
            return id;
        }

        let id = KeyId(state.vec.len() as u32);
        let s: Arc<str> = Arc::from(s);
        state.vec.push(s.clone());
        state.map.insert(s, id);
        id
    }

    pub(crate) fn get(&self, s: &str) -> Option<KeyId> {
        self.state.read().map.get(s).copied()
    }

    pub(crate) fn resolve(&self, id: KeyId) -> Option<Arc<str>> {
        self.state.read().vec.get(id.0 as usize).cloned()
    }

    pub(crate) fn resolve_string(&self, id: KeyId) -> String {
        self.resolve(id).map(|s| s.to_string()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable_and_resolvable() {
        let interner = Interner::default();
        let a = interner.get_or_intern("component");
        let b = interner.get_or_intern("profile");
        assert_ne!(a, b);
        assert_eq!(interner.get_or_intern("component"), a);
        assert_eq!(interner.resolve_string(b), "profile");
        assert_eq!(interner.resolve(KeyId::from(99)), None);
    }
}
